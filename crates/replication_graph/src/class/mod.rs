//! Class model: descriptor arena, routing policy and per-class replication info.
//!
//! All three tables are owned by one [`ReplicationRoutingGraph`](crate::ReplicationRoutingGraph)
//! and live exactly as long as it does.

mod info;
mod policy;
mod registry;

pub use info::{
    replication_period_for_frequency, ClassReplicationInfo, ClassReplicationInfoRegistry,
    FastSharedPath, FastSharedPathConstants,
};
pub use policy::{ClassPolicyTable, MulticastChannelPolicy, RoutingCategory};
pub use registry::{ClassDefaults, ClassDescriptor, ClassRegistry};
