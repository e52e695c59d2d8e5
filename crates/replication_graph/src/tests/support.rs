//! Shared world used by the scenario tests.

use crate::{
    ClassDefaults, ClassId, ClassSettings, ConnectionId, EntityId, GatherResult, NetworkedEntity,
    RepGraphConfig, ReplicationRoutingGraph, RoutingCategory, TickInfo, Vec3, Viewpoint,
};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy)]
pub struct Classes {
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

pub struct TestWorld {
    pub graph: ReplicationRoutingGraph,
    pub classes: Classes,
}

pub fn config() -> RepGraphConfig {
    RepGraphConfig {
        base_pawn_class: Some("Pawn".to_string()),
        class_settings: vec![
            ClassSettings::routed("PlayerState", RoutingCategory::NotRouted),
            ClassSettings::routed("StaticProp", RoutingCategory::SpatializeStatic),
            ClassSettings::routed("Door", RoutingCategory::SpatializeDormancy),
        ],
        ..RepGraphConfig::default()
    }
}

pub fn register_classes(graph: &mut ReplicationRoutingGraph) -> Classes {
    let registry = graph.classes_mut();
    let replicated = ClassDefaults::replicated().with_cull_distance(0.0);

    let actor = registry.register("Actor", None, Some(replicated)).unwrap();
    let pawn = registry
        .register("Pawn", Some(actor), Some(replicated.with_cull_distance(15_000.0)))
        .unwrap();
    let character = registry
        .register("Character", Some(pawn), Some(replicated.with_cull_distance(15_000.0)))
        .unwrap();
    let projectile = registry
        .register("Projectile", Some(actor), Some(replicated))
        .unwrap();
    let info = registry
        .register("Info", Some(actor), Some(replicated.always_relevant()))
        .unwrap();
    let player_state = registry
        .register("PlayerState", Some(info), Some(replicated.always_relevant()))
        .unwrap();
    let game_state = registry
        .register("GameState", Some(info), Some(replicated.always_relevant()))
        .unwrap();
    let static_prop = registry
        .register("StaticProp", Some(actor), Some(replicated))
        .unwrap();
    let door = registry.register("Door", Some(actor), Some(replicated)).unwrap();
    let controller = registry
        .register("Controller", Some(actor), Some(replicated.owner_only()))
        .unwrap();

    Classes {
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
    }
}

pub fn world_with(config: RepGraphConfig) -> TestWorld {
    let mut graph = ReplicationRoutingGraph::new(config).unwrap();
    let classes = register_classes(&mut graph);
    graph.init_global_class_settings().unwrap();
    TestWorld { graph, classes }
}

pub fn world() -> TestWorld {
    world_with(config())
}

impl TestWorld {
    pub fn spawn(&mut self, id: u64, class: ClassId, x: f64, y: f64) -> EntityId {
        let entity = EntityId(id);
        self.graph
            .on_entity_networked(NetworkedEntity::new(entity, class).at(Vec3::new(x, y, 0.0)))
            .unwrap();
        entity
    }

    /// Adds a connection viewing from `(x, y)` with the given relevancy radius.
    pub fn connect(&mut self, id: u32, x: f64, y: f64, radius: f64) -> ConnectionId {
        let connection = ConnectionId(id);
        self.graph.add_connection(connection).unwrap();
        let viewer = EntityId(10_000 + u64::from(id));
        self.graph
            .set_viewpoints(
                connection,
                vec![Viewpoint::new(viewer, Vec3::new(x, y, 0.0)).with_radius(radius)],
            )
            .unwrap();
        connection
    }

    pub fn tick(&mut self, tick: u64) -> Vec<GatherResult> {
        let tick = TickInfo::new(tick);
        self.graph.prepare_for_replication(tick);
        self.graph.gather_all(tick)
    }

    pub fn gather(&mut self, connection: ConnectionId, tick: u64) -> GatherResult {
        let tick = TickInfo::new(tick);
        self.graph.prepare_for_replication(tick);
        self.graph.gather_for_connection(connection, tick).unwrap()
    }

    /// Every entity handed to `connection` on any path over `ticks`.
    pub fn seen_over(&mut self, connection: ConnectionId, ticks: std::ops::Range<u64>) -> BTreeSet<EntityId> {
        let mut seen = BTreeSet::new();
        for tick in ticks {
            let result = self.gather(connection, tick);
            seen.extend(result.replicate);
            seen.extend(result.fast_shared);
        }
        seen
    }
}
