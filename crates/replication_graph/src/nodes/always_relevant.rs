//! Lists of entities relevant to every connection.

use super::{GatherParams, GatheredLists, ReplicationNode};
use crate::debug::NodeDebugLog;
use crate::rep_list::ActorRepList;
use crate::types::{EntityId, RegionName};
use std::collections::HashMap;
use tracing::warn;

/// Flat list gathered unconditionally for every connection.
#[derive(Debug, Default)]
pub struct GlobalAlwaysRelevantNode {
    list: ActorRepList,
}

impl GlobalAlwaysRelevantNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: EntityId) -> bool {
        self.list.conditional_add(entity)
    }

    pub fn remove(&mut self, entity: EntityId) -> bool {
        let removed = self.list.remove_fast(entity);
        if !removed {
            warn!("⚠️ {} was not found in the always relevant list", entity);
        }
        removed
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.list.contains(entity)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn reset(&mut self) {
        self.list.reset();
    }
}

impl ReplicationNode for GlobalAlwaysRelevantNode {
    fn name(&self) -> &'static str {
        "AlwaysRelevant"
    }

    fn gather<'a>(&'a self, _params: &GatherParams<'_>, out: &mut GatheredLists<'a>) {
        out.add_replication_list(self.list.as_slice());
    }

    fn log_node(&self, log: &mut NodeDebugLog) {
        log.log(self.name());
        log.push_indent();
        log.log_rep_list("List", &self.list);
        log.pop_indent();
    }
}

/// Always-relevant entities scoped to a streaming region.
///
/// A region's list is only gathered for connections that currently have the
/// region visible. Lists are created on first add and live until the world
/// state is reset.
#[derive(Debug, Default)]
pub struct StreamingLevelActorLists {
    lists: HashMap<RegionName, ActorRepList>,
}

impl StreamingLevelActorLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entity` to the list of `region`, creating the list if needed.
    pub fn add(&mut self, region: &RegionName, entity: EntityId) -> bool {
        self.lists
            .entry(region.clone())
            .or_default()
            .conditional_add(entity)
    }

    /// Removes `entity` from the list of `region`. Missing lists and missing
    /// members are logged and ignored.
    pub fn remove(&mut self, region: &RegionName, entity: EntityId) -> bool {
        let Some(list) = self.lists.get_mut(region) else {
            warn!(
                "⚠️ No always relevant list for streaming level {} while removing {}",
                region, entity
            );
            return false;
        };

        let removed = list.remove_fast(entity);
        if !removed {
            warn!(
                "⚠️ {} was not found in the always relevant list of streaming level {}",
                entity, region
            );
        }
        removed
    }

    pub fn get(&self, region: &str) -> Option<&ActorRepList> {
        self.lists.get(region)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionName, &ActorRepList)> + '_ {
        self.lists.iter()
    }

    /// Drops every list.
    pub fn clear(&mut self) {
        self.lists.clear();
    }
}
