//! Player state frequency limiting and the per-connection throttle.

use super::support::{config, world, world_with};
use crate::{ConnectionId, ControllerView, EntityId, RepGraphConfig, Vec3, Viewpoint};
use std::collections::BTreeSet;

#[test]
fn limiter_builds_ceil_n_over_k_buckets() {
    let mut w = world();
    let c = w.classes;
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();

    let players: BTreeSet<EntityId> = (0..7).map(|i| w.spawn(100 + i, c.player_state, 0.0, 0.0)).collect();

    let mut seen = BTreeSet::new();
    for tick in 0..4 {
        let result = w.gather(conn, tick);
        assert_eq!(w.graph.player_state_node().bucket_count(), 4);
        assert!(result.replicate.len() <= 2);
        seen.extend(result.replicate);
    }
    assert_eq!(seen, players);

    let buckets = w.graph.player_state_node().buckets();
    let total: usize = buckets.iter().map(|b| b.len()).sum();
    assert_eq!(total, 7);
}

#[test]
fn limiter_skips_torn_off_and_honours_force_update() {
    let mut w = world_with(RepGraphConfig {
        player_state_target_actors_per_frame: 1,
        ..config()
    });
    let c = w.classes;
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();

    for i in 0..4 {
        w.spawn(10 + i, c.player_state, 0.0, 0.0);
    }
    let game_state = w.spawn(50, c.game_state, 0.0, 0.0);

    w.graph.prepare_for_replication(crate::TickInfo::new(0));
    w.graph.force_net_update(EntityId(13));
    // Not a throttled class: ignored.
    w.graph.force_net_update(game_state);
    let result = w.graph.gather_for_connection(conn, crate::TickInfo::new(0)).unwrap();
    assert!(result.replicate.contains(&EntityId(10)));
    assert!(result.replicate.contains(&EntityId(13)));
    assert_eq!(result.replicate.iter().filter(|e| **e == game_state).count(), 1);

    // The force list only lasts for one tick.
    let result = w.gather(conn, 1);
    assert!(result.replicate.contains(&EntityId(11)));
    assert!(!result.replicate.contains(&EntityId(13)));

    w.graph.set_torn_off(EntityId(11));
    w.graph.prepare_for_replication(crate::TickInfo::new(2));
    assert_eq!(w.graph.player_state_node().bucket_count(), 3);
    let seen = w.seen_over(conn, 2..5);
    assert!(!seen.contains(&EntityId(11)));
}

#[test]
fn own_player_state_is_sent_every_other_tick() {
    let mut w = world();
    let c = w.classes;

    let connections = [ConnectionId(1), ConnectionId(2)];
    for (i, conn) in connections.iter().enumerate() {
        let controller = EntityId(500 + i as u64);
        let player_state = w.spawn(600 + i as u64, c.player_state, 0.0, 0.0);
        // Keep the limiter out of the picture.
        w.graph.set_torn_off(player_state);

        w.graph.add_connection(*conn).unwrap();
        let viewpoint = Viewpoint::new(controller, Vec3::zero()).with_controller(ControllerView {
            player_state: Some(player_state),
            ..ControllerView::default()
        });
        w.graph.set_viewpoints(*conn, vec![viewpoint]).unwrap();
    }

    let mut included = [[false; 6]; 2];
    for tick in 0..6 {
        for result in w.tick(tick) {
            let i = (result.connection.0 - 1) as usize;
            included[i][tick as usize] = result.replicate.contains(&EntityId(600 + i as u64));
        }
    }

    for (i, ticks) in included.iter().enumerate() {
        for pair in ticks.windows(2) {
            assert!(pair[0] || pair[1], "connection {} missed its player state", i);
        }
        assert!(ticks.iter().any(|sent| !sent), "connection {} was never throttled", i);
    }
    // Neighbouring connections alternate.
    for tick in 0..6 {
        assert_ne!(included[0][tick], included[1][tick]);
    }

    let manager = w.graph.connection(connections[0]).unwrap();
    assert!(manager.always_relevant_node().player_state_initialized());
    assert_eq!(
        manager.actor_info(EntityId(600)).and_then(|info| info.replication_period_frame),
        Some(1)
    );
}

#[test]
fn owned_pawn_is_never_culled_on_its_connection() {
    let mut w = world();
    let c = w.classes;
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();
    let first = w.spawn(1, c.character, 0.0, 0.0);
    let second = w.spawn(2, c.character, 0.0, 0.0);

    let view = |pawn: EntityId| {
        Viewpoint::new(EntityId(900), Vec3::zero()).with_controller(ControllerView {
            pawn: Some(pawn),
            ..ControllerView::default()
        })
    };

    w.graph.set_viewpoints(conn, vec![view(first)]).unwrap();
    let result = w.gather(conn, 0);
    assert!(result.replicate.contains(&first));
    let info = |w: &super::support::TestWorld, e: EntityId| {
        w.graph
            .connection(conn)
            .and_then(|m| m.actor_info(e))
            .and_then(|i| i.cull_distance_squared)
    };
    assert_eq!(info(&w, first), Some(0.0));

    w.graph.set_viewpoints(conn, vec![view(second)]).unwrap();
    w.gather(conn, 1);
    assert_eq!(info(&w, second), Some(0.0));
    let restored = info(&w, first).unwrap_or_default();
    assert!((restored - 15_000.0 * 15_000.0).abs() < 1e-3);
}
