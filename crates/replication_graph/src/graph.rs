//! # Replication Routing Graph
//!
//! Owns the class tables, the global nodes and one [`ConnectionManager`] per
//! client connection. Entity lifecycle notifications are routed here to the
//! node matching the entity's class policy; every tick the graph prepares
//! the tick-scoped nodes once and then gathers candidates per connection.
//!
//! All mutation happens on the caller's simulation thread between gathers.
//! [`ReplicationRoutingGraph::gather_all`] gathers connections in parallel with
//! the shared nodes borrowed immutably.

use crate::class::{
    ClassPolicyTable, ClassRegistry, ClassReplicationInfo, ClassReplicationInfoRegistry,
    FastSharedPath, FastSharedPathConstants, MulticastChannelPolicy, RoutingCategory,
};
use crate::config::RepGraphConfig;
use crate::debug::{ClassInfoRow, NodeDebugLog, RoutingRow};
use crate::entity::{EntityRecord, EntityTable, NetworkedEntity};
use crate::error::RepGraphError;
use crate::nodes::{
    ConnectionActorInfo, ConnectionActorInfoMap, ConnectionAlwaysRelevantNode,
    FrequencyLimiterNode, GatherParams, GatheredLists, GlobalAlwaysRelevantNode, GridActor,
    GridStats, ReplicationNode, SpatialGridNode, StreamingLevelActorLists, WorldView,
};
use crate::types::{ClassId, ConnectionId, EntityId, RegionName, TickInfo, Vec2, Vec3, Viewpoint};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Name of the fast shared path installed on the base pawn class.
pub const FAST_SHARED_REPLICATION: &str = "FastSharedReplication";

/// Despawn announcement queued for a connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestructionNotice {
    pub entity: EntityId,
    pub location: Vec3,
    pub streaming_region: Option<RegionName>,
    /// Announced regardless of the connection's distance to the entity
    pub ignore_distance_culling: bool,
}

/// Candidates gathered for one connection on one tick.
///
/// Handles may repeat across lists; the transport performs the final
/// de-duplication and prioritization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatherResult {
    pub connection: ConnectionId,
    pub tick: u64,
    /// Candidates for a full update
    pub replicate: Vec<EntityId>,
    /// Candidates for a fast shared path update only
    pub fast_shared: Vec<EntityId>,
}

/// Per-connection graph state.
#[derive(Debug)]
pub struct ConnectionManager {
    id: ConnectionId,
    order_index: u32,
    controller: Option<EntityId>,
    viewpoints: Vec<Viewpoint>,
    actor_info: ConnectionActorInfoMap,
    always_relevant: ConnectionAlwaysRelevantNode,
    destruction_notices: Vec<DestructionNotice>,
}

impl ConnectionManager {
    fn new(id: ConnectionId, order_index: u32, display_client_level_streaming: bool) -> Self {
        Self {
            id,
            order_index,
            controller: None,
            viewpoints: Vec::new(),
            actor_info: ConnectionActorInfoMap::new(),
            always_relevant: ConnectionAlwaysRelevantNode::new(display_client_level_streaming),
            destruction_notices: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn order_index(&self) -> u32 {
        self.order_index
    }

    pub fn controller(&self) -> Option<EntityId> {
        self.controller
    }

    pub fn viewpoints(&self) -> &[Viewpoint] {
        &self.viewpoints
    }

    pub fn actor_info(&self, entity: EntityId) -> Option<&ConnectionActorInfo> {
        self.actor_info.get(&entity)
    }

    pub fn always_relevant_node(&self) -> &ConnectionAlwaysRelevantNode {
        &self.always_relevant
    }

    fn reset_game_world_state(&mut self) {
        self.always_relevant.reset_game_world_state();
        self.actor_info.clear();
        self.viewpoints.clear();
        self.destruction_notices.clear();
    }

    fn within_distance(&self, location: Vec3, max_distance_squared: f64) -> bool {
        self.viewpoints
            .iter()
            .any(|vp| vp.location.distance_squared(location) <= max_distance_squared)
    }
}

/// Shared, read-only state borrowed by every connection's gather.
struct SharedNodes<'a> {
    classes: &'a ClassRegistry,
    infos: &'a ClassReplicationInfoRegistry,
    entities: &'a EntityTable,
    grid: &'a SpatialGridNode,
    always_relevant: &'a GlobalAlwaysRelevantNode,
    player_states: &'a FrequencyLimiterNode,
    streaming_levels: &'a StreamingLevelActorLists,
}

impl SharedNodes<'_> {
    fn class_cull_distance_squared(&self, entity: EntityId) -> f64 {
        self.entities
            .get(entity)
            .and_then(|record| self.infos.info(self.classes, record.class))
            .map(|info| info.cull_distance_squared)
            .unwrap_or(0.0)
    }

    fn global_nodes(&self) -> [&dyn ReplicationNode; 3] {
        [self.grid, self.always_relevant, self.player_states]
    }

    fn gather(&self, connection: &mut ConnectionManager, tick: TickInfo) -> GatherResult {
        let ConnectionManager {
            id,
            order_index,
            viewpoints,
            actor_info,
            always_relevant,
            ..
        } = connection;

        let params = GatherParams {
            connection: *id,
            order_index: *order_index,
            tick,
            viewpoints: viewpoints.as_slice(),
        };

        let mut lists = GatheredLists::new();
        let class_cull = |entity: EntityId| self.class_cull_distance_squared(entity);
        always_relevant.gather(&params, self.streaming_levels, actor_info, &class_cull, &mut lists);
        for node in self.global_nodes() {
            node.gather(&params, &mut lists);
        }

        GatherResult {
            connection: *id,
            tick: tick.tick,
            replicate: lists.replicate_iter().collect(),
            fast_shared: lists.fast_shared_iter().collect(),
        }
    }
}

/// Interest-management routing graph.
#[derive(Debug)]
pub struct ReplicationRoutingGraph {
    config: RepGraphConfig,
    classes: ClassRegistry,
    policies: ClassPolicyTable,
    infos: ClassReplicationInfoRegistry,
    multicast: MulticastChannelPolicy,
    fast_shared_path_constants: FastSharedPathConstants,
    fast_shared_replication: Option<FastSharedPath>,
    entities: EntityTable,
    grid: SpatialGridNode,
    always_relevant: GlobalAlwaysRelevantNode,
    streaming_levels: StreamingLevelActorLists,
    player_states: FrequencyLimiterNode,
    connections: BTreeMap<ConnectionId, ConnectionManager>,
    next_order_index: u32,
    destruction_info_max_dist_squared: f64,
}

impl ReplicationRoutingGraph {
    /// Creates an empty graph. Register classes through [`classes_mut`](Self::classes_mut)
    /// and then call [`init_global_class_settings`](Self::init_global_class_settings).
    pub fn new(config: RepGraphConfig) -> Result<Self, RepGraphError> {
        config.validate()?;

        let grid = SpatialGridNode::new(
            config.spatial_grid_cell_size,
            Vec2::new(config.spatial_bias_x, config.spatial_bias_y),
        )
        .with_dynamic_buckets(config.dynamic_actor_frequency_buckets)
        .with_fast_shared_path(config.enable_fast_shared_path);

        let infos = ClassReplicationInfoRegistry::new(config.net_server_max_tick_rate)
            .with_lazy_init_logging(config.log_lazy_init_classes);

        Ok(Self {
            fast_shared_path_constants: FastSharedPathConstants::new(
                config.target_kbytes_sec_fast_shared_path,
                config.net_server_max_tick_rate,
                config.fast_shared_path_cull_dist_pct,
            ),
            destruction_info_max_dist_squared: config.destruction_info_max_dist_squared(),
            player_states: FrequencyLimiterNode::new(None, config.player_state_target_actors_per_frame),
            classes: ClassRegistry::new(),
            policies: ClassPolicyTable::new(),
            infos,
            multicast: MulticastChannelPolicy::new(),
            fast_shared_replication: None,
            entities: EntityTable::new(),
            grid,
            always_relevant: GlobalAlwaysRelevantNode::new(),
            streaming_levels: StreamingLevelActorLists::new(),
            connections: BTreeMap::new(),
            next_order_index: 0,
            config,
        })
    }

    pub fn config(&self) -> &RepGraphConfig {
        &self.config
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Class registration entry point for entity-type modules.
    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    /// Installs the fast shared path given to the base pawn class during bootstrap.
    pub fn set_fast_shared_replication(&mut self, func: fn(EntityId) -> bool) {
        self.fast_shared_replication = Some(FastSharedPath::new(FAST_SHARED_REPLICATION, func));
    }

    // ------------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------------

    /// Builds the routing and class info tables from the registered classes
    /// and the configuration. Safe to call again after registering more classes.
    pub fn init_global_class_settings(&mut self) -> Result<(), RepGraphError> {
        self.policies.clear();
        self.infos.reset();
        self.multicast.clear();

        for setting in &self.config.class_settings {
            let Some(mapping) = setting.mapping else {
                continue;
            };
            match self.classes.find(&setting.class) {
                Some(class) => {
                    debug!("Class settings: {} -> {}", setting.class, mapping);
                    self.policies.register(&self.classes, class, mapping);
                }
                None => warn!("⚠️ Class settings reference unknown class {}", setting.class),
            }
        }

        let replicated: Vec<ClassId> = self
            .classes
            .iter()
            .filter(|(_, desc)| desc.defaults.is_some_and(|d| d.replicated))
            .map(|(id, _)| id)
            .collect();

        for class in &replicated {
            self.policies.register_derived(&self.classes, *class);
        }

        if let Some(name) = &self.config.base_pawn_class {
            let pawn = self.classes.require(name)?;
            let cull_distance_squared = self
                .classes
                .defaults(pawn)
                .map(|d| d.net_cull_distance_squared)
                .unwrap_or(0.0);
            let mut pawn_info = ClassReplicationInfo::default();
            pawn_info.set_cull_distance_squared(cull_distance_squared);
            pawn_info.fast_shared_path = self.fast_shared_replication;
            self.infos.set_explicit(pawn, pawn_info);
        }

        self.fast_shared_path_constants = FastSharedPathConstants::new(
            self.config.target_kbytes_sec_fast_shared_path,
            self.config.net_server_max_tick_rate,
            self.config.fast_shared_path_cull_dist_pct,
        );
        self.grid
            .set_dynamic_bucket_count(self.config.dynamic_actor_frequency_buckets);
        self.grid
            .set_fast_shared_path(self.config.enable_fast_shared_path);

        for class in &replicated {
            self.infos.register_derived(&self.classes, &self.policies, *class);
        }

        self.destruction_info_max_dist_squared = self.config.destruction_info_max_dist_squared();

        let roots: Vec<ClassId> = self
            .classes
            .iter()
            .filter(|(_, desc)| desc.parent.is_none())
            .map(|(id, _)| id)
            .collect();

        if self.config.disable_spatial_rebuilds {
            for root in &roots {
                self.grid.add_to_class_rebuild_deny_list(*root);
            }
        }
        for name in &self.config.spatial_rebuild_deny_list {
            match self.classes.find(name) {
                Some(class) => self.grid.add_to_class_rebuild_deny_list(class),
                None => warn!("⚠️ Spatial rebuild deny list references unknown class {}", name),
            }
        }

        // Multicast never opens channels on controllers: a channel opened by a
        // non-owner breaks controller replication.
        for root in &roots {
            self.multicast.set(*root, true);
        }
        if let Some(controller) = self.classes.find("Controller") {
            self.multicast.set(controller, false);
        }
        for setting in &self.config.class_settings {
            let Some(open) = setting.rpc_multicast_open_channel else {
                continue;
            };
            if let Some(class) = self.classes.find(&setting.class) {
                self.multicast.set(class, open);
            }
        }

        let throttled = self.classes.find(&self.config.player_state_class);
        if throttled.is_none() {
            warn!(
                "⚠️ Player state class {} is not registered; frequency limiter disabled",
                self.config.player_state_class
            );
        }
        self.player_states.set_throttled_class(throttled);

        info!(
            "🧭 Replication graph initialized: {} classes, {} routing entries, {} class infos",
            self.classes.len(),
            self.policies.len(),
            self.infos.len()
        );
        for row in self.dump_routing() {
            debug!(
                "  {} ({}) -> {}",
                row.class,
                row.parent.as_deref().unwrap_or("None"),
                row.category
            );
        }
        for row in self.dump_class_info() {
            debug!(
                "  {} ({}) -> {}",
                row.class,
                row.parent.as_deref().unwrap_or("None"),
                row.delta
            );
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Class lookups
    // ------------------------------------------------------------------------

    pub fn routing_category(&self, class: ClassId) -> RoutingCategory {
        self.policies.resolve(&self.classes, class)
    }

    /// Explicitly routes `class`, overriding the derived policy.
    pub fn set_routing_category(&mut self, class: ClassId, category: RoutingCategory) {
        self.policies.register(&self.classes, class, category);
    }

    pub fn policies(&self) -> &ClassPolicyTable {
        &self.policies
    }

    /// Per-class info for the transport layer, derived on first reference.
    pub fn class_replication_info(&mut self, class: ClassId) -> ClassReplicationInfo {
        self.infos.get_or_init(&self.classes, &self.policies, class)
    }

    /// Administrative override of a class' replication info.
    pub fn set_class_replication_info(&mut self, class: ClassId, info: ClassReplicationInfo) {
        self.infos.set_explicit(class, info);
    }

    pub fn fast_shared_path_constants(&self) -> FastSharedPathConstants {
        self.fast_shared_path_constants
    }

    pub fn multicast_open_channel(&self, class: ClassId) -> bool {
        self.multicast.open_channel(&self.classes, class)
    }

    // ------------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------------

    /// Routes a newly networked entity to its node.
    pub fn on_entity_networked(
        &mut self,
        entity: NetworkedEntity,
    ) -> Result<RoutingCategory, RepGraphError> {
        if self.entities.contains(entity.id) {
            return Err(RepGraphError::DuplicateEntity(entity.id));
        }
        if self.classes.get(entity.class).is_none() {
            return Err(RepGraphError::UnknownClass(entity.class));
        }

        let category = self.policies.resolve(&self.classes, entity.class);
        let class_info = self.infos.get_or_init(&self.classes, &self.policies, entity.class);

        let grid_actor = GridActor {
            entity: entity.id,
            class: entity.class,
            location: entity.location,
            cull_distance: class_info.cull_distance(),
        };

        match category {
            RoutingCategory::NotRouted => {}
            RoutingCategory::RelevantAllConnections => match &entity.streaming_region {
                Some(region) => {
                    self.streaming_levels.add(region, entity.id);
                }
                None => {
                    self.always_relevant.add(entity.id);
                }
            },
            RoutingCategory::SpatializeStatic => self.grid.add_static(&self.classes, grid_actor),
            RoutingCategory::SpatializeDynamic => self.grid.add_dynamic(&self.classes, grid_actor),
            RoutingCategory::SpatializeDormancy => {
                self.grid.add_dormant(&self.classes, grid_actor, entity.dormant)
            }
        }

        debug!(
            "{} ({}) networked -> {}",
            entity.id,
            self.classes.name(entity.class),
            category
        );

        self.entities.insert(
            entity.id,
            EntityRecord {
                class: entity.class,
                category,
                location: entity.location,
                streaming_region: entity.streaming_region,
                dormant: entity.dormant,
                torn_off: false,
            },
        );
        Ok(category)
    }

    /// Removes an entity from its node and queues destruction notices.
    ///
    /// Always-relevant entities are announced to every connection regardless
    /// of distance. Spatialized entities are only announced to connections
    /// with a viewpoint within `destruction_info_max_dist`.
    pub fn on_entity_removed(&mut self, entity: EntityId) -> Option<DestructionNotice> {
        let Some(record) = self.entities.remove(entity) else {
            warn!("⚠️ Removal of {} which is not networked", entity);
            return None;
        };

        match record.category {
            RoutingCategory::NotRouted => {}
            RoutingCategory::RelevantAllConnections => match &record.streaming_region {
                Some(region) => {
                    self.streaming_levels.remove(region, entity);
                }
                None => {
                    self.always_relevant.remove(entity);
                }
            },
            RoutingCategory::SpatializeStatic => {
                self.grid.remove_static(entity);
            }
            RoutingCategory::SpatializeDynamic => {
                self.grid.remove_dynamic(entity);
            }
            RoutingCategory::SpatializeDormancy => {
                self.grid.remove_dormant(entity);
            }
        }
        self.player_states.forget(entity);

        let notice = DestructionNotice {
            entity,
            location: record.location,
            streaming_region: record.streaming_region,
            ignore_distance_culling: record.category == RoutingCategory::RelevantAllConnections,
        };

        let max_distance_squared = self.destruction_info_max_dist_squared;
        let spatialized = record.category.is_spatialized();
        let mut announced = 0usize;
        for connection in self.connections.values_mut() {
            connection.actor_info.remove(&entity);
            if connection.always_relevant.debug_observer() == Some(entity) {
                connection.always_relevant.set_debug_observer(None);
            }

            if spatialized && !connection.within_distance(notice.location, max_distance_squared) {
                continue;
            }
            connection.destruction_notices.push(notice.clone());
            announced += 1;
        }

        debug!(
            "{} removed ({}); destruction notice queued for {} connections",
            entity, record.category, announced
        );
        Some(notice)
    }

    pub fn entity(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.entities.get(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Movement notification for a networked entity.
    pub fn notify_entity_moved(&mut self, entity: EntityId, location: Vec3) {
        let Some(record) = self.entities.get_mut(entity) else {
            warn!("⚠️ Movement of {} which is not networked", entity);
            return;
        };
        record.location = location;
        if record.category.is_spatialized() {
            self.grid.notify_entity_moved(entity, location);
        }
    }

    /// Re-evaluates the grid cells of a static or dormant entity at its current location.
    pub fn reevaluate_static(&mut self, entity: EntityId) {
        let Some(record) = self.entities.get(entity) else {
            warn!("⚠️ Re-evaluation of {} which is not networked", entity);
            return;
        };
        if record.category.is_spatialized() {
            self.grid.reevaluate_static(entity, record.location);
        }
    }

    pub fn notify_dormancy_changed(&mut self, entity: EntityId, dormant: bool) {
        let Some(record) = self.entities.get_mut(entity) else {
            warn!("⚠️ Dormancy change of {} which is not networked", entity);
            return;
        };
        record.dormant = dormant;
        if record.category == RoutingCategory::SpatializeDormancy {
            let location = record.location;
            self.grid.set_dormant(entity, dormant);
            // Moves while asleep were not applied to the grid.
            if !dormant {
                self.grid.reevaluate_static(entity, location);
            }
        }
    }

    /// Marks `entity` dormant (or awake) on one connection.
    pub fn set_dormant_on_connection(
        &mut self,
        connection: ConnectionId,
        entity: EntityId,
        dormant: bool,
    ) -> Result<(), RepGraphError> {
        if !self.entities.contains(entity) {
            return Err(RepGraphError::UnknownEntity(entity));
        }
        let manager = self.connection_mut(connection)?;
        manager.actor_info.entry(entity).or_default().dormant_on_connection = dormant;
        Ok(())
    }

    /// A torn-off entity stays networked but is skipped by the frequency limiter.
    pub fn set_torn_off(&mut self, entity: EntityId) {
        match self.entities.get_mut(entity) {
            Some(record) => record.torn_off = true,
            None => warn!("⚠️ Tear-off of {} which is not networked", entity),
        }
    }

    /// Forces a throttled entity into this tick's gather. Call after
    /// [`prepare_for_replication`](Self::prepare_for_replication).
    pub fn force_net_update(&mut self, entity: EntityId) {
        let Some(record) = self.entities.get(entity) else {
            warn!("⚠️ Force net update of {} which is not networked", entity);
            return;
        };
        let throttled = self
            .player_states
            .throttled_class()
            .is_some_and(|class| self.classes.is_child_of(record.class, class));
        if throttled {
            self.player_states.force_net_update(entity);
        }
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    pub fn add_connection(&mut self, connection: ConnectionId) -> Result<(), RepGraphError> {
        if self.connections.contains_key(&connection) {
            return Err(RepGraphError::DuplicateConnection(connection));
        }
        let order_index = self.next_order_index;
        self.next_order_index += 1;
        self.connections.insert(
            connection,
            ConnectionManager::new(
                connection,
                order_index,
                self.config.display_client_level_streaming,
            ),
        );
        info!("🔌 Connection {} added (order {})", connection, order_index);
        Ok(())
    }

    pub fn remove_connection(&mut self, connection: ConnectionId) -> Result<(), RepGraphError> {
        self.connections
            .remove(&connection)
            .ok_or(RepGraphError::UnknownConnection(connection))?;
        info!("🔌 Connection {} removed", connection);
        Ok(())
    }

    pub fn connection(&self, connection: ConnectionId) -> Option<&ConnectionManager> {
        self.connections.get(&connection)
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn connection_mut(
        &mut self,
        connection: ConnectionId,
    ) -> Result<&mut ConnectionManager, RepGraphError> {
        self.connections
            .get_mut(&connection)
            .ok_or(RepGraphError::UnknownConnection(connection))
    }

    pub fn set_viewpoints(
        &mut self,
        connection: ConnectionId,
        viewpoints: Vec<Viewpoint>,
    ) -> Result<(), RepGraphError> {
        self.connection_mut(connection)?.viewpoints = viewpoints;
        Ok(())
    }

    /// Binds the connection's owning controller, used to route debug observers.
    pub fn set_connection_controller(
        &mut self,
        connection: ConnectionId,
        controller: Option<EntityId>,
    ) -> Result<(), RepGraphError> {
        self.connection_mut(connection)?.controller = controller;
        Ok(())
    }

    pub fn on_client_level_visibility_add(
        &mut self,
        connection: ConnectionId,
        region: impl Into<RegionName>,
    ) -> Result<(), RepGraphError> {
        self.connection_mut(connection)?
            .always_relevant
            .on_client_level_visibility_add(region.into());
        Ok(())
    }

    pub fn on_client_level_visibility_remove(
        &mut self,
        connection: ConnectionId,
        region: &str,
    ) -> Result<(), RepGraphError> {
        self.connection_mut(connection)?
            .always_relevant
            .on_client_level_visibility_remove(region);
        Ok(())
    }

    /// Moves a debug observer from the connection of `old_owner` to the
    /// connection of `new_owner`.
    pub fn on_debug_observer_owner_change(
        &mut self,
        observer: EntityId,
        old_owner: Option<EntityId>,
        new_owner: Option<EntityId>,
    ) {
        for connection in self.connections.values_mut() {
            if old_owner.is_some() && connection.controller == old_owner {
                connection.always_relevant.set_debug_observer(None);
            }
        }
        for connection in self.connections.values_mut() {
            if new_owner.is_some() && connection.controller == new_owner {
                debug!("Debug observer {} bound to {}", observer, connection.id);
                connection.always_relevant.set_debug_observer(Some(observer));
            }
        }
    }

    /// Drains the destruction notices queued for `connection`.
    pub fn take_destruction_notices(
        &mut self,
        connection: ConnectionId,
    ) -> Result<Vec<DestructionNotice>, RepGraphError> {
        Ok(std::mem::take(
            &mut self.connection_mut(connection)?.destruction_notices,
        ))
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Tick-scoped preparation. Must run before any gather of the tick.
    pub fn prepare_for_replication(&mut self, tick: TickInfo) {
        let world = WorldView {
            tick,
            classes: &self.classes,
            entities: &self.entities,
        };
        self.grid.prepare_for_replication(&world);
        self.always_relevant.prepare_for_replication(&world);
        self.player_states.prepare_for_replication(&world);
    }

    fn split_shared(&mut self) -> (SharedNodes<'_>, &mut BTreeMap<ConnectionId, ConnectionManager>) {
        (
            SharedNodes {
                classes: &self.classes,
                infos: &self.infos,
                entities: &self.entities,
                grid: &self.grid,
                always_relevant: &self.always_relevant,
                player_states: &self.player_states,
                streaming_levels: &self.streaming_levels,
            },
            &mut self.connections,
        )
    }

    pub fn gather_for_connection(
        &mut self,
        connection: ConnectionId,
        tick: TickInfo,
    ) -> Result<GatherResult, RepGraphError> {
        let (shared, connections) = self.split_shared();
        let manager = connections
            .get_mut(&connection)
            .ok_or(RepGraphError::UnknownConnection(connection))?;
        Ok(shared.gather(manager, tick))
    }

    /// Gathers every connection in parallel, ordered by connection id.
    pub fn gather_all(&mut self, tick: TickInfo) -> Vec<GatherResult> {
        let (shared, connections) = self.split_shared();
        connections
            .par_iter_mut()
            .map(|(_, manager)| shared.gather(manager, tick))
            .collect()
    }

    /// Clears all global and per-connection node state, for example on a
    /// level transition. Classes, configuration and connections survive.
    pub fn reset_game_world_state(&mut self) {
        self.streaming_levels.clear();
        self.always_relevant.reset();
        self.grid.reset();
        self.player_states.reset();
        self.entities.clear();
        for connection in self.connections.values_mut() {
            connection.reset_game_world_state();
        }
        info!("🧹 Game world state reset");
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    fn parent_name(&self, class: ClassId) -> Option<String> {
        self.classes
            .parent(class)
            .map(|parent| self.classes.name(parent).to_string())
    }

    /// Stored routing entries.
    pub fn dump_routing(&self) -> Vec<RoutingRow> {
        self.policies
            .entries()
            .into_iter()
            .map(|(class, category)| RoutingRow {
                class: self.classes.name(class).to_string(),
                parent: self.parent_name(class),
                category,
            })
            .collect()
    }

    /// Stored class infos.
    pub fn dump_class_info(&self) -> Vec<ClassInfoRow> {
        self.infos
            .entries()
            .into_iter()
            .map(|(class, info)| {
                ClassInfoRow::new(
                    self.classes.name(class).to_string(),
                    self.parent_name(class),
                    self.infos.is_explicit(class),
                    &info,
                )
            })
            .collect()
    }

    /// Runtime change of the dynamic bucket count of every grid cell.
    pub fn set_dynamic_frequency_buckets(&mut self, buckets: usize) -> Result<(), RepGraphError> {
        if buckets == 0 {
            return Err(RepGraphError::InvalidBucketCount(buckets));
        }
        info!("🪣 Setting frequency buckets to {}", buckets);
        self.config.dynamic_actor_frequency_buckets = buckets;
        self.grid.set_dynamic_bucket_count(buckets);
        Ok(())
    }

    pub fn grid(&self) -> &SpatialGridNode {
        &self.grid
    }

    pub fn grid_stats(&self) -> GridStats {
        self.grid.stats()
    }

    pub fn player_state_node(&self) -> &FrequencyLimiterNode {
        &self.player_states
    }

    /// Textual dump of every node.
    pub fn log_graph(&self) -> String {
        let mut log = NodeDebugLog::new();
        log.log("ReplicationRoutingGraph");
        log.push_indent();
        self.grid.log_node(&mut log);
        self.always_relevant.log_node(&mut log);
        self.player_states.log_node(&mut log);
        for connection in self.connections.values() {
            log.log(format!("{} (order {})", connection.id, connection.order_index));
            log.push_indent();
            connection
                .always_relevant
                .log_node(&mut log, &self.streaming_levels);
            log.pop_indent();
        }
        log.pop_indent();
        log.into_string()
    }
}
