//! Rolling subset of a large homogeneous entity set.
//!
//! Player states are the typical case: every connection wants every player
//! state, but not every tick. The buckets are rebuilt from scratch each tick
//! so departing players never leave holes behind.

use super::{GatherParams, GatheredLists, ReplicationNode, WorldView};
use crate::debug::NodeDebugLog;
use crate::rep_list::ActorRepList;
use crate::types::{ClassId, EntityId};
use tracing::trace;

#[derive(Debug)]
pub struct FrequencyLimiterNode {
    throttled_class: Option<ClassId>,
    target_actors_per_frame: usize,
    lists: Vec<ActorRepList>,
    force_net_update: ActorRepList,
}

impl FrequencyLimiterNode {
    pub fn new(throttled_class: Option<ClassId>, target_actors_per_frame: usize) -> Self {
        Self {
            throttled_class,
            target_actors_per_frame: target_actors_per_frame.max(1),
            lists: Vec::new(),
            force_net_update: ActorRepList::new(),
        }
    }

    pub fn throttled_class(&self) -> Option<ClassId> {
        self.throttled_class
    }

    pub fn set_throttled_class(&mut self, class: Option<ClassId>) {
        self.throttled_class = class;
    }

    pub fn target_actors_per_frame(&self) -> usize {
        self.target_actors_per_frame
    }

    /// Number of buckets built by the last prepare pass.
    pub fn bucket_count(&self) -> usize {
        self.lists.len()
    }

    pub fn buckets(&self) -> &[ActorRepList] {
        &self.lists
    }

    /// Gathers `entity` on every connection this tick regardless of its bucket.
    ///
    /// The list is emptied by the next prepare pass.
    pub fn force_net_update(&mut self, entity: EntityId) -> bool {
        self.force_net_update.conditional_add(entity)
    }

    pub fn forget(&mut self, entity: EntityId) {
        self.force_net_update.remove_fast(entity);
        for list in &mut self.lists {
            if list.remove_fast(entity) {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.lists.clear();
        self.force_net_update.reset();
    }
}

impl ReplicationNode for FrequencyLimiterNode {
    fn name(&self) -> &'static str {
        "FrequencyLimiter"
    }

    fn prepare_for_replication(&mut self, world: &WorldView<'_>) {
        self.lists.clear();
        self.force_net_update.reset();

        let Some(throttled) = self.throttled_class else {
            return;
        };

        for (entity, record) in world.entities.iter() {
            if !record.is_valid_for_gather() || !world.classes.is_child_of(record.class, throttled) {
                continue;
            }
            match self.lists.last_mut() {
                Some(current) if current.len() < self.target_actors_per_frame => {
                    current.conditional_add(entity);
                }
                _ => {
                    let mut list = ActorRepList::with_capacity(self.target_actors_per_frame);
                    list.conditional_add(entity);
                    self.lists.push(list);
                }
            }
        }

        trace!(
            "FrequencyLimiter prepared {} buckets for tick {}",
            self.lists.len(),
            world.tick.tick
        );
    }

    fn gather<'a>(&'a self, params: &GatherParams<'_>, out: &mut GatheredLists<'a>) {
        if !self.lists.is_empty() {
            let idx = (params.tick.tick % self.lists.len() as u64) as usize;
            out.add_replication_list(self.lists[idx].as_slice());
        }
        out.add_replication_list(self.force_net_update.as_slice());
    }

    fn log_node(&self, log: &mut NodeDebugLog) {
        log.log(self.name());
        log.push_indent();
        for (i, list) in self.lists.iter().enumerate() {
            log.log_rep_list(&format!("Bucket[{}]", i), list);
        }
        log.log_rep_list("ForceNetUpdate", &self.force_net_update);
        log.pop_indent();
    }
}
