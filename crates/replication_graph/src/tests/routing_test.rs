//! Class routing, class info and multicast policy after bootstrap.

use super::support::{config, register_classes, world, world_with};
use crate::{
    format_routing_table, ClassDefaults, ClassSettings, EntityId, RepGraphConfig, RepGraphError,
    ReplicationRoutingGraph, RoutingCategory, FAST_SHARED_REPLICATION,
};

fn always_ready(_entity: EntityId) -> bool {
    true
}

#[test]
fn derived_classes_inherit_parent_routing() {
    let w = world();
    let c = w.classes;
    let policies = w.graph.policies();

    assert_eq!(w.graph.routing_category(c.actor), RoutingCategory::SpatializeDynamic);
    assert!(policies.is_stored(c.actor));

    // Same legacy flags as their ancestors: resolved through the parent, never stored.
    for class in [c.pawn, c.character, c.projectile] {
        assert_eq!(w.graph.routing_category(class), RoutingCategory::SpatializeDynamic);
        assert!(!policies.is_stored(class));
    }
    assert_eq!(w.graph.routing_category(c.game_state), RoutingCategory::RelevantAllConnections);
    assert!(!policies.is_stored(c.game_state));
    assert!(policies.is_stored(c.info));

    // Owner-only differs from the parent and resolves to NotRouted.
    assert_eq!(w.graph.routing_category(c.controller), RoutingCategory::NotRouted);
    assert!(policies.is_stored(c.controller));

    // Explicit configuration wins.
    assert_eq!(w.graph.routing_category(c.player_state), RoutingCategory::NotRouted);
    assert_eq!(w.graph.routing_category(c.static_prop), RoutingCategory::SpatializeStatic);
    assert_eq!(w.graph.routing_category(c.door), RoutingCategory::SpatializeDormancy);
}

#[test]
fn routing_dump_lists_stored_entries_only() {
    let w = world();
    let rows = w.graph.dump_routing();
    let names: Vec<&str> = rows.iter().map(|row| row.class.as_str()).collect();

    for stored in ["Actor", "Info", "PlayerState", "StaticProp", "Door", "Controller"] {
        assert!(names.contains(&stored), "{} missing from {:?}", stored, names);
    }
    for inherited in ["Pawn", "Character", "GameState", "Projectile"] {
        assert!(!names.contains(&inherited), "{} should inherit", inherited);
    }

    let door = rows.iter().find(|row| row.class == "Door").unwrap();
    assert_eq!(door.parent.as_deref(), Some("Actor"));

    let text = format_routing_table(&rows);
    assert!(text.contains("Replication Routing Policies"));
    assert!(text.contains("SpatializeDormancy"));
}

#[test]
fn base_pawn_info_is_explicit_and_inherited() {
    let mut graph = ReplicationRoutingGraph::new(config()).unwrap();
    let c = register_classes(&mut graph);
    graph.set_fast_shared_replication(always_ready);
    graph.init_global_class_settings().unwrap();

    let character = graph.class_replication_info(c.character);
    assert!((character.cull_distance() - 15_000.0).abs() < 1e-6);
    assert_eq!(
        character.fast_shared_path.map(|path| path.name),
        Some(FAST_SHARED_REPLICATION)
    );
    assert!(character.fast_shared_path.is_some_and(|path| path.call(EntityId(1))));

    let rows = graph.dump_class_info();
    let pawn = rows.iter().find(|row| row.class == "Pawn").unwrap();
    assert!(pawn.explicit);
    assert_eq!(pawn.fast_shared_path.as_deref(), Some(FAST_SHARED_REPLICATION));
    // Descendants of an explicit class are never derived.
    assert!(rows.iter().all(|row| row.class != "Character"));
}

#[test]
fn non_spatialized_classes_have_no_cull_distance() {
    let mut w = world();
    let c = w.classes;
    let game_state = w.graph.class_replication_info(c.game_state);
    assert_eq!(game_state.cull_distance_squared, 0.0);
    // 100 Hz at a 30 Hz server tick still replicates every tick.
    assert_eq!(game_state.replication_period_frame, 1);
}

#[test]
fn late_registered_classes_are_derived_lazily() {
    let mut w = world();
    let actor = w.classes.actor;
    let drone = w
        .graph
        .classes_mut()
        .register(
            "Drone",
            Some(actor),
            Some(ClassDefaults::replicated().with_update_frequency(7.5)),
        )
        .unwrap();

    let info = w.graph.class_replication_info(drone);
    assert_eq!(info.replication_period_frame, 4);
    assert!((info.cull_distance() - 15_000.0).abs() < 1e-6);
    assert!(w.graph.dump_class_info().iter().any(|row| row.class == "Drone"));
}

#[test]
fn multicast_policy_closes_controller_channels() {
    let mut cfg = config();
    cfg.class_settings.push(ClassSettings {
        class: "GameState".to_string(),
        mapping: None,
        rpc_multicast_open_channel: Some(false),
    });
    let w = world_with(cfg);
    let c = w.classes;

    assert!(w.graph.multicast_open_channel(c.character));
    assert!(w.graph.multicast_open_channel(c.info));
    assert!(!w.graph.multicast_open_channel(c.controller));
    assert!(!w.graph.multicast_open_channel(c.game_state));
}

#[test]
fn fast_shared_budget_follows_tick_rate() {
    let w = world_with(RepGraphConfig {
        net_server_max_tick_rate: 20.0,
        target_kbytes_sec_fast_shared_path: 10,
        ..config()
    });
    let constants = w.graph.fast_shared_path_constants();
    assert_eq!(constants.max_bits_per_frame, 4096);
    assert!((constants.distance_requirement_pct - 0.8).abs() < f32::EPSILON);
}

#[test]
fn unknown_class_names_in_settings_are_skipped() {
    let mut cfg = config();
    cfg.class_settings
        .push(ClassSettings::routed("Ghost", RoutingCategory::SpatializeStatic));
    cfg.spatial_rebuild_deny_list.push("Phantom".to_string());
    let w = world_with(cfg);
    assert!(w.graph.classes().find("Ghost").is_none());

    let mut graph = ReplicationRoutingGraph::new(RepGraphConfig {
        base_pawn_class: Some("Hovercraft".to_string()),
        ..RepGraphConfig::default()
    })
    .unwrap();
    register_classes(&mut graph);
    assert!(matches!(
        graph.init_global_class_settings(),
        Err(RepGraphError::UnknownClassName(name)) if name == "Hovercraft"
    ));
}

#[test]
fn invalid_config_is_rejected() {
    let result = ReplicationRoutingGraph::new(RepGraphConfig {
        dynamic_actor_frequency_buckets: 0,
        ..RepGraphConfig::default()
    });
    assert!(matches!(result, Err(RepGraphError::Config(_))));
}
