//! Simulated world that drives the routing graph.
//!
//! Spawns a small deterministic scene (props, doors, orbiting projectiles, one
//! pawn per connection) and feeds movement, dormancy and churn into the graph
//! every tick the way a game server would.

use crate::config::SimulationSettings;
use replication_graph::{
    Aabb, ClassDefaults, ClassId, ClassRegistry, ClassSettings, ConnectionId, ControllerView,
    EntityId, NetworkedEntity, RepGraphError, ReplicationRoutingGraph, RewindHistory,
    RoutingCategory, TickInfo, Vec3, Viewpoint,
};
use tracing::{debug, info};

/// Streaming region shown to even-numbered connections.
pub const HARBOR_REGION: &str = "Harbor";

const HARBOR_INFOS: u64 = 3;
const CHURN_INTERVAL_TICKS: u64 = 60;
const PAWN_HALF_EXTENT: f64 = 50.0;

/// Class ids of the demo hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct DemoClasses {
    pub actor: ClassId,
    pub pawn: ClassId,
    pub character: ClassId,
    pub projectile: ClassId,
    pub info: ClassId,
    pub player_state: ClassId,
    pub game_state: ClassId,
    pub static_prop: ClassId,
    pub door: ClassId,
    pub controller: ClassId,
}

/// Registers the demo class hierarchy and installs the pawn fast path.
/// Call before [`ReplicationRoutingGraph::init_global_class_settings`].
pub fn install_demo_classes(graph: &mut ReplicationRoutingGraph) -> Result<DemoClasses, RepGraphError> {
    graph.set_fast_shared_replication(fast_shared_movement);
    register_demo_classes(graph.classes_mut())
}

fn register_demo_classes(registry: &mut ClassRegistry) -> Result<DemoClasses, RepGraphError> {
    let replicated = ClassDefaults::replicated().with_cull_distance(0.0);
    let mobile = replicated.with_cull_distance(15_000.0);

    let actor = registry.register("Actor", None, Some(replicated))?;
    let pawn = registry.register("Pawn", Some(actor), Some(mobile))?;
    let character = registry.register("Character", Some(pawn), Some(mobile))?;
    let projectile = registry.register(
        "Projectile",
        Some(actor),
        Some(replicated.with_cull_distance(12_000.0).with_update_frequency(60.0)),
    )?;
    let info = registry.register("Info", Some(actor), Some(replicated.always_relevant()))?;
    let player_state = registry.register(
        "PlayerState",
        Some(info),
        Some(replicated.always_relevant().with_update_frequency(1.0)),
    )?;
    let game_state = registry.register("GameState", Some(info), Some(replicated.always_relevant()))?;
    let static_prop = registry.register("StaticProp", Some(actor), Some(replicated))?;
    let door = registry.register("Door", Some(actor), Some(replicated))?;
    let controller = registry.register("Controller", Some(actor), Some(replicated.owner_only()))?;

    Ok(DemoClasses {
        actor,
        pawn,
        character,
        projectile,
        info,
        player_state,
        game_state,
        static_prop,
        door,
        controller,
    })
}

/// Class overrides matching [`install_demo_classes`].
pub fn demo_class_settings() -> Vec<ClassSettings> {
    vec![
        ClassSettings::routed("PlayerState", RoutingCategory::NotRouted),
        ClassSettings::routed("StaticProp", RoutingCategory::SpatializeStatic),
        ClassSettings::routed("Door", RoutingCategory::SpatializeDormancy),
        ClassSettings {
            class: "GameState".to_string(),
            mapping: None,
            rpc_multicast_open_channel: Some(false),
        },
    ]
}

/// Pawns share their movement state through the fast path.
fn fast_shared_movement(_entity: EntityId) -> bool {
    true
}

/// Circular path around a fixed center.
#[derive(Debug, Clone, Copy)]
struct Orbit {
    center: Vec3,
    radius: f64,
    phase: f64,
    /// Radians per tick
    speed: f64,
}

impl Orbit {
    fn location(&self, tick: u64) -> Vec3 {
        let angle = self.phase + self.speed * tick as f64;
        Vec3::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y + self.radius * angle.sin(),
            self.center.z,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Projectile {
    entity: EntityId,
    orbit: Orbit,
}

/// Entities owned by one simulated client.
#[derive(Debug)]
struct SimConnection {
    id: ConnectionId,
    controller: EntityId,
    player_state: EntityId,
    pawn: EntityId,
    orbit: Orbit,
    history: RewindHistory,
}

/// Totals of one replication tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub connections: usize,
    pub replicate: usize,
    pub fast_shared: usize,
    pub destruction_notices: usize,
}

pub struct SimulationWorld {
    settings: SimulationSettings,
    classes: DemoClasses,
    projectiles: Vec<Projectile>,
    doors: Vec<EntityId>,
    doors_dormant: bool,
    connections: Vec<SimConnection>,
    next_id: u64,
}

impl SimulationWorld {
    /// Spawns the scene and its connections into `graph`. The graph's class
    /// settings must already be initialized.
    pub fn spawn(
        graph: &mut ReplicationRoutingGraph,
        classes: DemoClasses,
        settings: SimulationSettings,
    ) -> Result<Self, RepGraphError> {
        let mut world = Self {
            settings,
            classes,
            projectiles: Vec::new(),
            doors: Vec::new(),
            doors_dormant: true,
            connections: Vec::new(),
            next_id: 1,
        };

        let game_state = world.allocate();
        graph.on_entity_networked(NetworkedEntity::new(game_state, classes.game_state))?;

        for _ in 0..HARBOR_INFOS {
            let entity = world.allocate();
            graph.on_entity_networked(
                NetworkedEntity::new(entity, classes.info).in_region(HARBOR_REGION),
            )?;
        }

        let extent = world.settings.world_extent;

        // Props on a spiral out to the world extent.
        let props = world.settings.static_props;
        for i in 0..props {
            let t = (i + 1) as f64 / props.max(1) as f64;
            let angle = t * std::f64::consts::TAU * 3.0;
            let location = Vec3::new(extent * t * angle.cos(), extent * t * angle.sin(), 0.0);
            let entity = world.allocate();
            graph.on_entity_networked(NetworkedEntity::new(entity, classes.static_prop).at(location))?;
        }

        for i in 0..world.settings.doors {
            let offset = (i as f64 + 0.5) / world.settings.doors.max(1) as f64;
            let location = Vec3::new(extent * (offset * 2.0 - 1.0), 0.0, 0.0);
            let entity = world.allocate();
            graph.on_entity_networked(
                NetworkedEntity::new(entity, classes.door).at(location).dormant(),
            )?;
            world.doors.push(entity);
        }

        for i in 0..world.settings.projectiles {
            world.spawn_projectile(graph, i)?;
        }

        for i in 0..world.settings.connections {
            world.spawn_connection(graph, i)?;
        }

        info!(
            "🌍 Spawned {} entities for {} connections",
            graph.entity_count(),
            world.connections.len()
        );
        Ok(world)
    }

    fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn spawn_projectile(
        &mut self,
        graph: &mut ReplicationRoutingGraph,
        index: usize,
    ) -> Result<EntityId, RepGraphError> {
        let extent = self.settings.world_extent;
        let count = self.settings.projectiles.max(1) as f64;
        let t = index as f64 / count;
        let orbit = Orbit {
            center: Vec3::new(extent * 0.5 * (t * 7.0).cos(), extent * 0.5 * (t * 5.0).sin(), 0.0),
            radius: 2_000.0 + 500.0 * (index % 7) as f64,
            phase: t * std::f64::consts::TAU,
            speed: 0.02 + 0.005 * (index % 3) as f64,
        };
        let entity = self.allocate();
        graph.on_entity_networked(
            NetworkedEntity::new(entity, self.classes.projectile).at(orbit.location(0)),
        )?;
        self.projectiles.push(Projectile { entity, orbit });
        Ok(entity)
    }

    fn spawn_connection(
        &mut self,
        graph: &mut ReplicationRoutingGraph,
        index: usize,
    ) -> Result<(), RepGraphError> {
        let id = ConnectionId(index as u32 + 1);
        let extent = self.settings.world_extent;
        let count = self.settings.connections.max(1) as f64;
        let orbit = Orbit {
            center: Vec3::zero(),
            radius: extent * 0.6,
            phase: index as f64 / count * std::f64::consts::TAU,
            speed: 0.005,
        };

        let controller = self.allocate();
        let player_state = self.allocate();
        let pawn = self.allocate();
        graph.on_entity_networked(NetworkedEntity::new(controller, self.classes.controller))?;
        graph.on_entity_networked(NetworkedEntity::new(player_state, self.classes.player_state))?;
        graph.on_entity_networked(
            NetworkedEntity::new(pawn, self.classes.character).at(orbit.location(0)),
        )?;

        graph.add_connection(id)?;
        graph.set_connection_controller(id, Some(controller))?;
        if index % 2 == 0 {
            graph.on_client_level_visibility_add(id, HARBOR_REGION)?;
        }

        let connection = SimConnection {
            id,
            controller,
            player_state,
            pawn,
            orbit,
            history: RewindHistory::default(),
        };
        graph.set_viewpoints(id, vec![self.viewpoint(&connection, 0)])?;
        self.connections.push(connection);
        Ok(())
    }

    fn viewpoint(&self, connection: &SimConnection, tick: u64) -> Viewpoint {
        Viewpoint::new(connection.controller, connection.orbit.location(tick))
            .with_view_target(connection.pawn)
            .with_radius(self.settings.relevancy_radius)
            .with_controller(ControllerView {
                player_state: Some(connection.player_state),
                pawn: Some(connection.pawn),
                view_target_pawn: Some(connection.pawn),
            })
    }

    fn tick_seconds(&self, tick: u64) -> f64 {
        tick as f64 * self.settings.tick_interval_ms as f64 / 1000.0
    }

    /// Advances the world by one tick and reports the changes to `graph`.
    pub fn step(&mut self, graph: &mut ReplicationRoutingGraph, tick: u64) -> Result<(), RepGraphError> {
        for projectile in &self.projectiles {
            graph.notify_entity_moved(projectile.entity, projectile.orbit.location(tick));
        }

        let time = self.tick_seconds(tick);
        let half = Vec3::new(PAWN_HALF_EXTENT, PAWN_HALF_EXTENT, PAWN_HALF_EXTENT);
        for connection in &mut self.connections {
            let location = connection.orbit.location(tick);
            graph.notify_entity_moved(connection.pawn, location);
            let hit_box = Aabb::new(
                Vec3::new(location.x - half.x, location.y - half.y, location.z - half.z),
                Vec3::new(location.x + half.x, location.y + half.y, location.z + half.z),
            );
            connection.history.tick(hit_box, time);
        }
        for connection in &self.connections {
            graph.set_viewpoints(connection.id, vec![self.viewpoint(connection, tick)])?;
        }

        let toggle = self.settings.door_toggle_ticks;
        if toggle > 0 && tick > 0 && tick % toggle == 0 {
            self.doors_dormant = !self.doors_dormant;
            for door in &self.doors {
                graph.notify_dormancy_changed(*door, self.doors_dormant);
            }
            debug!("🚪 Doors dormant: {}", self.doors_dormant);
        }

        if tick > 0 && tick % CHURN_INTERVAL_TICKS == 0 && !self.projectiles.is_empty() {
            let index = (tick / CHURN_INTERVAL_TICKS) as usize % self.projectiles.len();
            let removed = self.projectiles.swap_remove(index);
            graph.on_entity_removed(removed.entity);
            let replacement = self.spawn_projectile(graph, index)?;
            debug!("💥 {} destroyed, {} spawned", removed.entity, replacement);
        }

        Ok(())
    }

    /// Runs one replication pass over every connection.
    pub fn replicate(
        &mut self,
        graph: &mut ReplicationRoutingGraph,
        tick: u64,
    ) -> Result<TickReport, RepGraphError> {
        let info = TickInfo::new(tick);
        graph.prepare_for_replication(info);

        // A player state that just changed owner-facing data skips its throttle bucket.
        if tick % CHURN_INTERVAL_TICKS == 0 && !self.connections.is_empty() {
            let index = (tick / CHURN_INTERVAL_TICKS) as usize % self.connections.len();
            graph.force_net_update(self.connections[index].player_state);
        }

        let results = graph.gather_all(info);
        let mut report = TickReport {
            tick,
            connections: results.len(),
            ..TickReport::default()
        };
        for result in &results {
            report.replicate += result.replicate.len();
            report.fast_shared += result.fast_shared.len();
        }
        for connection in &self.connections {
            report.destruction_notices += graph.take_destruction_notices(connection.id)?.len();
        }
        Ok(report)
    }

    /// Hit box of a connection's pawn `seconds_ago` before the newest frame.
    pub fn rewound_pawn_hit_box(&self, connection: ConnectionId, seconds_ago: f64) -> Option<Aabb> {
        let sim = self.connections.iter().find(|c| c.id == connection)?;
        let newest = sim.history.newest()?.time;
        match sim.history.rewound_hit_box(newest - seconds_ago) {
            Ok(hit_box) => Some(hit_box),
            Err(e) => {
                debug!("Rewind for {} failed: {}", connection, e);
                None
            }
        }
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id).collect()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn classes(&self) -> DemoClasses {
        self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replication_graph::RepGraphConfig;

    fn settings() -> SimulationSettings {
        SimulationSettings {
            connections: 3,
            projectiles: 12,
            static_props: 8,
            doors: 2,
            door_toggle_ticks: 5,
            ..SimulationSettings::default()
        }
    }

    fn build() -> (ReplicationRoutingGraph, SimulationWorld) {
        let config = RepGraphConfig {
            base_pawn_class: Some("Pawn".to_string()),
            class_settings: demo_class_settings(),
            ..RepGraphConfig::default()
        };
        let mut graph = ReplicationRoutingGraph::new(config).unwrap();
        let classes = install_demo_classes(&mut graph).unwrap();
        graph.init_global_class_settings().unwrap();
        let world = SimulationWorld::spawn(&mut graph, classes, settings()).unwrap();
        (graph, world)
    }

    #[test]
    fn demo_classes_route_as_configured() {
        let (graph, world) = build();
        let c = world.classes();
        assert_eq!(graph.routing_category(c.static_prop), RoutingCategory::SpatializeStatic);
        assert_eq!(graph.routing_category(c.door), RoutingCategory::SpatializeDormancy);
        assert_eq!(graph.routing_category(c.projectile), RoutingCategory::SpatializeDynamic);
        assert_eq!(graph.routing_category(c.character), RoutingCategory::SpatializeDynamic);
        assert_eq!(graph.routing_category(c.game_state), RoutingCategory::RelevantAllConnections);
        assert_eq!(graph.routing_category(c.player_state), RoutingCategory::NotRouted);
        assert_eq!(graph.routing_category(c.controller), RoutingCategory::NotRouted);
        assert!(!graph.multicast_open_channel(c.game_state));
        assert!(graph.multicast_open_channel(c.actor));
    }

    #[test]
    fn spawn_populates_graph() {
        let (graph, world) = build();
        // game state + harbor infos + props + doors + projectiles + 3 per connection
        assert_eq!(graph.entity_count(), 1 + 3 + 8 + 2 + 12 + 3 * 3);
        assert_eq!(graph.connection_count(), 3);
        assert_eq!(world.connection_ids(), vec![ConnectionId(1), ConnectionId(2), ConnectionId(3)]);

        let harbor = |id| {
            graph
                .connection(id)
                .map(|m| m.always_relevant_node().levels_needing_replication().len())
        };
        assert_eq!(harbor(ConnectionId(1)), Some(1));
        assert_eq!(harbor(ConnectionId(2)), Some(0));
    }

    #[test]
    fn every_connection_sees_its_own_pawn_and_the_game_state() {
        let (mut graph, mut world) = build();
        let report = world.replicate(&mut graph, 0).unwrap();
        assert_eq!(report.connections, 3);
        assert!(report.replicate > 0);

        let results = graph.gather_all(TickInfo::new(0));
        for (result, sim) in results.iter().zip(&world.connections) {
            let seen: Vec<_> = result.replicate.iter().chain(&result.fast_shared).collect();
            assert!(seen.contains(&&sim.pawn));
            assert!(seen.contains(&&EntityId(1)), "game state missing for {}", result.connection);
        }
    }

    #[test]
    fn churn_replaces_projectiles() {
        let (mut graph, mut world) = build();
        let before = graph.entity_count();
        for tick in 0..=CHURN_INTERVAL_TICKS {
            world.step(&mut graph, tick).unwrap();
            world.replicate(&mut graph, tick).unwrap();
        }
        assert_eq!(graph.entity_count(), before);
        assert_eq!(world.projectile_count(), 12);
    }

    #[test]
    fn pawn_history_can_be_rewound() {
        let (mut graph, mut world) = build();
        for tick in 0..10 {
            world.step(&mut graph, tick).unwrap();
        }
        let conn = ConnectionId(1);
        assert!(world.rewound_pawn_hit_box(conn, 0.1).is_some());
        // Older than the recorded window
        assert!(world.rewound_pawn_hit_box(conn, 5.0).is_none());
        assert!(world.rewound_pawn_hit_box(ConnectionId(99), 0.0).is_none());
    }
}
