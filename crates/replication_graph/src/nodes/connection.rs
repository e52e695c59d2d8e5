//! Per-connection always-relevant node.
//!
//! Produces what a single connection always needs: its viewers and view
//! targets, its own player state (every other tick), its pawn, the streaming
//! level lists of regions it has visible, and an optional debug observer
//! bound to its controller.

use super::always_relevant::StreamingLevelActorLists;
use super::{GatherParams, GatheredLists};
use crate::debug::NodeDebugLog;
use crate::rep_list::ActorRepList;
use crate::types::{EntityId, RegionName};
use smallvec::SmallVec;
use std::collections::HashMap;
use tracing::{info, warn};

/// Per-connection replication state of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectionActorInfo {
    pub dormant_on_connection: bool,
    /// Overrides the class replication period on this connection
    pub replication_period_frame: Option<u32>,
    /// Overrides the class cull distance on this connection
    pub cull_distance_squared: Option<f64>,
}

pub type ConnectionActorInfoMap = HashMap<EntityId, ConnectionActorInfo>;

/// Last pawn and view-target pawn seen for one viewer.
#[derive(Debug, Clone, Copy, Default)]
struct CachedRelevantActors {
    last_viewer: Option<EntityId>,
    last_view_target: Option<EntityId>,
}

#[derive(Debug, Default)]
pub struct ConnectionAlwaysRelevantNode {
    replication_list: ActorRepList,
    levels_needing_replication: SmallVec<[RegionName; 64]>,
    initialized_player_state: bool,
    past_relevant: HashMap<EntityId, CachedRelevantActors>,
    debug_observer: Option<EntityId>,
    display_client_level_streaming: bool,
}

impl ConnectionAlwaysRelevantNode {
    pub fn new(display_client_level_streaming: bool) -> Self {
        Self {
            display_client_level_streaming,
            ..Self::default()
        }
    }

    /// Gathers this connection's always-relevant candidates.
    ///
    /// `class_cull_distance_squared` is used to restore the cull distance of
    /// a pawn the connection no longer owns.
    pub fn gather<'a>(
        &'a mut self,
        params: &GatherParams<'_>,
        streaming_levels: &'a StreamingLevelActorLists,
        actor_info: &mut ConnectionActorInfoMap,
        class_cull_distance_squared: &dyn Fn(EntityId) -> f64,
        out: &mut GatheredLists<'a>,
    ) {
        let Self {
            replication_list,
            levels_needing_replication,
            initialized_player_state,
            past_relevant,
            debug_observer,
            display_client_level_streaming,
        } = self;

        replication_list.reset();

        for viewpoint in params.viewpoints {
            replication_list.conditional_add(viewpoint.viewer);
            replication_list.conditional_add(viewpoint.view_target);

            let Some(controller) = viewpoint.controller else {
                continue;
            };

            // Half rate for the connection's own player state; neighbouring
            // connections alternate ticks.
            let replicate_player_state = params.order_index % 2 == (params.tick.tick % 2) as u32;
            if replicate_player_state {
                if let Some(player_state) = controller.player_state {
                    if !*initialized_player_state {
                        *initialized_player_state = true;
                        actor_info.entry(player_state).or_default().replication_period_frame = Some(1);
                    }
                    replication_list.conditional_add(player_state);
                }
            }

            let cache = past_relevant.entry(viewpoint.viewer).or_default();

            if let Some(pawn) = controller.pawn {
                update_cached_relevant_actor(
                    actor_info,
                    pawn,
                    &mut cache.last_viewer,
                    class_cull_distance_squared,
                );
                if pawn != viewpoint.view_target {
                    replication_list.conditional_add(pawn);
                }
            }

            if let Some(view_target_pawn) = controller.view_target_pawn {
                update_cached_relevant_actor(
                    actor_info,
                    view_target_pawn,
                    &mut cache.last_view_target,
                    class_cull_distance_squared,
                );
            }
        }

        past_relevant.retain(|viewer, _| params.viewpoints.iter().any(|vp| vp.viewer == *viewer));

        if let Some(observer) = *debug_observer {
            replication_list.conditional_add(observer);
        }

        let replication_list: &'a ActorRepList = replication_list;
        out.add_replication_list(replication_list.as_slice());

        let mut idx = levels_needing_replication.len();
        while idx > 0 {
            idx -= 1;
            let level = &levels_needing_replication[idx];

            let Some(list) = streaming_levels.get(level) else {
                if *display_client_level_streaming {
                    info!(
                        "📡 CLIENTSTREAMING Removing {} from always relevant streaming levels for {}: no list",
                        level, params.connection
                    );
                }
                levels_needing_replication.swap_remove(idx);
                continue;
            };

            if list.is_empty() {
                warn!(
                    "⚠️ Empty always relevant list for streaming level {} on {}",
                    level, params.connection
                );
                continue;
            }

            let all_dormant = list.iter().all(|entity| {
                actor_info
                    .get(entity)
                    .is_some_and(|info| info.dormant_on_connection)
            });

            if all_dormant {
                if *display_client_level_streaming {
                    info!(
                        "📡 CLIENTSTREAMING All always relevant entities dormant on streaming level {} for {}. Removing list.",
                        level, params.connection
                    );
                }
                levels_needing_replication.swap_remove(idx);
            } else {
                out.add_replication_list(list.as_slice());
            }
        }
    }

    pub fn on_client_level_visibility_add(&mut self, level: RegionName) {
        if self.display_client_level_streaming {
            info!("📡 CLIENTSTREAMING Adding {} to always relevant streaming levels", level);
        }
        if !self.levels_needing_replication.contains(&level) {
            self.levels_needing_replication.push(level);
        }
    }

    pub fn on_client_level_visibility_remove(&mut self, level: &str) {
        if self.display_client_level_streaming {
            info!("📡 CLIENTSTREAMING Removing {} from always relevant streaming levels", level);
        }
        self.levels_needing_replication.retain(|l| l.as_str() != level);
    }

    /// Regions whose lists are still gathered for this connection.
    pub fn levels_needing_replication(&self) -> &[RegionName] {
        &self.levels_needing_replication
    }

    pub fn set_debug_observer(&mut self, observer: Option<EntityId>) {
        self.debug_observer = observer;
    }

    pub fn debug_observer(&self) -> Option<EntityId> {
        self.debug_observer
    }

    pub fn player_state_initialized(&self) -> bool {
        self.initialized_player_state
    }

    /// Drops gathered state and visible regions; the world they referred to is gone.
    pub fn reset_game_world_state(&mut self) {
        self.replication_list.reset();
        self.levels_needing_replication.clear();
        self.past_relevant.clear();
        self.debug_observer = None;
    }

    pub fn log_node(&self, log: &mut NodeDebugLog, streaming_levels: &StreamingLevelActorLists) {
        log.log("ConnectionAlwaysRelevant");
        log.push_indent();
        log.log_rep_list("List", &self.replication_list);
        for level in &self.levels_needing_replication {
            if let Some(list) = streaming_levels.get(level) {
                log.log_rep_list(&format!("AlwaysRelevant StreamingLevel List: {}", level), list);
            }
        }
        log.pop_indent();
    }
}

/// Gives a newly owned pawn an unlimited cull distance on this connection and
/// restores the previous one to its class value.
fn update_cached_relevant_actor(
    actor_info: &mut ConnectionActorInfoMap,
    new_actor: EntityId,
    last: &mut Option<EntityId>,
    class_cull_distance_squared: &dyn Fn(EntityId) -> f64,
) {
    if *last == Some(new_actor) {
        return;
    }
    actor_info.entry(new_actor).or_default().cull_distance_squared = Some(0.0);
    if let Some(previous) = *last {
        actor_info.entry(previous).or_default().cull_distance_squared =
            Some(class_cull_distance_squared(previous));
    }
    *last = Some(new_actor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionId, ControllerView, TickInfo, Vec3, Viewpoint};

    fn gather(
        node: &mut ConnectionAlwaysRelevantNode,
        levels: &StreamingLevelActorLists,
        info: &mut ConnectionActorInfoMap,
        viewpoints: &[Viewpoint],
        order_index: u32,
        tick: u64,
    ) -> Vec<EntityId> {
        let params = GatherParams {
            connection: ConnectionId(order_index),
            order_index,
            tick: TickInfo::new(tick),
            viewpoints,
        };
        let mut out = GatheredLists::new();
        node.gather(&params, levels, info, &|_| 100.0, &mut out);
        out.replicate_iter().collect()
    }

    fn controller_viewpoint() -> Viewpoint {
        Viewpoint::new(EntityId(1), Vec3::zero())
            .with_view_target(EntityId(2))
            .with_controller(ControllerView {
                player_state: Some(EntityId(3)),
                pawn: Some(EntityId(4)),
                view_target_pawn: None,
            })
    }

    #[test]
    fn player_state_is_throttled_to_every_other_tick() {
        let levels = StreamingLevelActorLists::new();
        let mut info = ConnectionActorInfoMap::new();
        let mut node = ConnectionAlwaysRelevantNode::new(false);
        let viewpoints = [controller_viewpoint()];

        let odd_conn: Vec<bool> = (0..4)
            .map(|tick| gather(&mut node, &levels, &mut info, &viewpoints, 1, tick).contains(&EntityId(3)))
            .collect();
        assert_eq!(odd_conn, vec![false, true, false, true]);
        assert!(node.player_state_initialized());
        assert_eq!(info[&EntityId(3)].replication_period_frame, Some(1));

        let ids = gather(&mut node, &levels, &mut info, &viewpoints, 1, 1);
        assert_eq!(ids, vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4)]);
    }

    #[test]
    fn pawn_swap_restores_previous_cull_distance() {
        let levels = StreamingLevelActorLists::new();
        let mut info = ConnectionActorInfoMap::new();
        let mut node = ConnectionAlwaysRelevantNode::new(false);

        gather(&mut node, &levels, &mut info, &[controller_viewpoint()], 0, 0);
        assert_eq!(info[&EntityId(4)].cull_distance_squared, Some(0.0));

        let mut swapped = controller_viewpoint();
        if let Some(controller) = swapped.controller.as_mut() {
            controller.pawn = Some(EntityId(5));
        }
        gather(&mut node, &levels, &mut info, &[swapped], 0, 0);
        assert_eq!(info[&EntityId(5)].cull_distance_squared, Some(0.0));
        assert_eq!(info[&EntityId(4)].cull_distance_squared, Some(100.0));
    }

    #[test]
    fn dormant_streaming_level_is_dropped_until_visible_again() {
        let mut levels = StreamingLevelActorLists::new();
        let harbor = RegionName::from("Harbor");
        levels.add(&harbor, EntityId(10));
        levels.add(&harbor, EntityId(11));

        let mut info = ConnectionActorInfoMap::new();
        let mut node = ConnectionAlwaysRelevantNode::new(true);
        node.on_client_level_visibility_add(harbor.clone());
        node.on_client_level_visibility_add(harbor.clone());
        assert_eq!(node.levels_needing_replication().len(), 1);

        assert!(gather(&mut node, &levels, &mut info, &[], 0, 0).contains(&EntityId(10)));

        info.entry(EntityId(10)).or_default().dormant_on_connection = true;
        assert!(gather(&mut node, &levels, &mut info, &[], 0, 1).contains(&EntityId(11)));

        info.entry(EntityId(11)).or_default().dormant_on_connection = true;
        assert!(gather(&mut node, &levels, &mut info, &[], 0, 2).is_empty());
        assert!(node.levels_needing_replication().is_empty());

        // Waking up is not enough; the region needs a new visibility notification.
        info.entry(EntityId(11)).or_default().dormant_on_connection = false;
        assert!(gather(&mut node, &levels, &mut info, &[], 0, 3).is_empty());
        node.on_client_level_visibility_add(harbor);
        assert!(gather(&mut node, &levels, &mut info, &[], 0, 4).contains(&EntityId(11)));
    }

    #[test]
    fn missing_levels_are_dropped_and_observer_is_included() {
        let levels = StreamingLevelActorLists::new();
        let mut info = ConnectionActorInfoMap::new();
        let mut node = ConnectionAlwaysRelevantNode::new(false);
        node.on_client_level_visibility_add(RegionName::from("Unloaded"));
        node.set_debug_observer(Some(EntityId(42)));

        let ids = gather(&mut node, &levels, &mut info, &[], 0, 0);
        assert_eq!(ids, vec![EntityId(42)]);
        assert!(node.levels_needing_replication().is_empty());

        node.on_client_level_visibility_add(RegionName::from("Docks"));
        node.on_client_level_visibility_remove("Docks");
        assert!(node.levels_needing_replication().is_empty());

        node.reset_game_world_state();
        assert!(gather(&mut node, &levels, &mut info, &[], 0, 1).is_empty());
    }
}
