//! Replication graph nodes.
//!
//! Global nodes are shared by every connection and implement
//! [`ReplicationNode`]. They are mutated only by entity add/remove
//! notifications and by [`ReplicationNode::prepare_for_replication`], which
//! runs once per tick before any gather. Gathers borrow them immutably, so
//! connections can be gathered in parallel.
//!
//! Per-connection nodes are owned by their connection and may mutate their
//! own state while gathering.

mod always_relevant;
mod connection;
mod frequency_limiter;
mod grid;

pub use always_relevant::{GlobalAlwaysRelevantNode, StreamingLevelActorLists};
pub use connection::{
    ConnectionActorInfo, ConnectionActorInfoMap, ConnectionAlwaysRelevantNode,
};
pub use frequency_limiter::FrequencyLimiterNode;
pub use grid::{CellCoord, GatherNear, GridActor, GridStats, SpatialGridNode};

use crate::class::ClassRegistry;
use crate::debug::NodeDebugLog;
use crate::entity::EntityTable;
use crate::types::{ConnectionId, EntityId, TickInfo, Viewpoint};

/// Read-only view of the world handed to `prepare_for_replication`.
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    pub tick: TickInfo,
    pub classes: &'a ClassRegistry,
    pub entities: &'a EntityTable,
}

/// Inputs of one connection's gather pass.
#[derive(Debug, Clone, Copy)]
pub struct GatherParams<'a> {
    pub connection: ConnectionId,
    /// Position of the connection in connect order
    pub order_index: u32,
    pub tick: TickInfo,
    pub viewpoints: &'a [Viewpoint],
}

/// Lists collected by one gather pass, borrowed from the nodes that own them.
#[derive(Debug, Default)]
pub struct GatheredLists<'a> {
    /// Candidates for a full update this tick
    pub replicate: Vec<&'a [EntityId]>,
    /// Candidates for a fast shared path update only
    pub fast_shared: Vec<&'a [EntityId]>,
}

impl<'a> GatheredLists<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_replication_list(&mut self, list: &'a [EntityId]) {
        if !list.is_empty() {
            self.replicate.push(list);
        }
    }

    pub fn add_fast_shared_list(&mut self, list: &'a [EntityId]) {
        if !list.is_empty() {
            self.fast_shared.push(list);
        }
    }

    /// Number of handles across all full-update lists, duplicates included.
    pub fn replicate_len(&self) -> usize {
        self.replicate.iter().map(|list| list.len()).sum()
    }

    pub fn replicate_iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.replicate.iter().flat_map(|list| list.iter().copied())
    }

    pub fn fast_shared_iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.fast_shared.iter().flat_map(|list| list.iter().copied())
    }
}

/// A node shared by every connection.
pub trait ReplicationNode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Tick-scoped mutation. Runs once per tick before any gather.
    fn prepare_for_replication(&mut self, _world: &WorldView<'_>) {}

    /// Appends this node's candidates for one connection.
    fn gather<'a>(&'a self, params: &GatherParams<'_>, out: &mut GatheredLists<'a>);

    fn log_node(&self, log: &mut NodeDebugLog);
}
