//! # Replication Routing Graph
//!
//! Server-side interest management for a multiplayer simulation. The graph
//! decides, every replication tick, which networked entities are candidates
//! for replication to which client connection. Serialization, prioritization
//! and sending are left to the transport layer that consumes the gathered
//! lists.
//!
//! ## Core Features
//!
//! - **Class Routing**: Inheritance-aware routing policies with dedup-by-inheritance
//! - **Lazy Class Info**: Cull distance and update period derived on first reference
//! - **Spatial Grid**: 2D bucketed grid with static, dynamic and dormancy-aware membership
//! - **Always Relevant Lists**: Global, per-connection and streaming-region scoped
//! - **Frequency Limiting**: Large homogeneous sets rotated through per-tick buckets
//! - **Parallel Gather**: Connections gathered concurrently with rayon
//! - **Rewind History**: Time-indexed bounding volume history for hit validation
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use replication_graph::*;
//!
//! fn main() -> Result<(), RepGraphError> {
//!     let mut graph = ReplicationRoutingGraph::new(RepGraphConfig::default())?;
//!
//!     // Each entity-type module registers its classes at startup
//!     let actor = graph.classes_mut().register("Actor", None, Some(ClassDefaults::replicated()))?;
//!     let pawn = graph.classes_mut().register(
//!         "Pawn",
//!         Some(actor),
//!         Some(ClassDefaults::replicated().with_cull_distance(15_000.0)),
//!     )?;
//!     graph.init_global_class_settings()?;
//!
//!     graph.on_entity_networked(NetworkedEntity::new(EntityId(1), pawn).at(Vec3::new(0.0, 0.0, 0.0)))?;
//!
//!     graph.add_connection(ConnectionId(1))?;
//!     graph.set_viewpoints(ConnectionId(1), vec![Viewpoint::new(EntityId(100), Vec3::zero())])?;
//!
//!     for tick in 0..3 {
//!         let tick = TickInfo::new(tick);
//!         graph.prepare_for_replication(tick);
//!         for result in graph.gather_all(tick) {
//!             println!("{} -> {} candidates", result.connection, result.replicate.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core modules
pub mod class;
pub mod config;
pub mod debug;
pub mod entity;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod rep_list;
pub mod rewind;
pub mod types;

// Scenario tests
#[cfg(test)]
mod tests;

pub use class::{
    replication_period_for_frequency, ClassDefaults, ClassDescriptor, ClassPolicyTable,
    ClassRegistry, ClassReplicationInfo, ClassReplicationInfoRegistry, FastSharedPath,
    FastSharedPathConstants, MulticastChannelPolicy, RoutingCategory,
};
pub use config::{ClassSettings, RepGraphConfig};
pub use debug::{format_class_info_table, format_routing_table, ClassInfoRow, NodeDebugLog, RoutingRow};
pub use entity::{EntityRecord, NetworkedEntity};
pub use error::{ConfigValidationError, RepGraphError};
pub use graph::{
    ConnectionManager, DestructionNotice, GatherResult, ReplicationRoutingGraph,
    FAST_SHARED_REPLICATION,
};
pub use nodes::{
    CellCoord, ConnectionActorInfo, FrequencyLimiterNode, GridActor, GridStats, ReplicationNode,
    SpatialGridNode,
};
pub use rep_list::{ActorRepList, FrequencyBuckets};
pub use rewind::{FramePackage, RewindError, RewindHistory};
pub use types::*;
