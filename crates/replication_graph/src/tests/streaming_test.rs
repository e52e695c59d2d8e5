//! Streaming region scoped always-relevant lists.

use super::support::{world, TestWorld};
use crate::{ConnectionId, EntityId, NetworkedEntity};

fn spawn_in_region(w: &mut TestWorld, id: u64, region: &str) -> EntityId {
    let class = w.classes.game_state;
    let entity = EntityId(id);
    w.graph
        .on_entity_networked(NetworkedEntity::new(entity, class).in_region(region))
        .unwrap();
    entity
}

#[test]
fn region_lists_require_visibility() {
    let mut w = world();
    let visible = ConnectionId(1);
    let hidden = ConnectionId(2);
    w.graph.add_connection(visible).unwrap();
    w.graph.add_connection(hidden).unwrap();

    let a = spawn_in_region(&mut w, 50, "Harbor");
    let b = spawn_in_region(&mut w, 51, "Harbor");
    w.graph.on_client_level_visibility_add(visible, "Harbor").unwrap();

    let results = w.tick(0);
    assert!(results[0].replicate.contains(&a));
    assert!(results[0].replicate.contains(&b));
    assert!(results[1].replicate.is_empty());

    w.graph.on_client_level_visibility_remove(visible, "Harbor").unwrap();
    assert!(w.gather(visible, 1).replicate.is_empty());
}

#[test]
fn fully_dormant_region_is_dropped_until_visible_again() {
    let mut w = world();
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();
    let a = spawn_in_region(&mut w, 50, "Harbor");
    let b = spawn_in_region(&mut w, 51, "Harbor");
    w.graph.on_client_level_visibility_add(conn, "Harbor").unwrap();

    w.graph.set_dormant_on_connection(conn, a, true).unwrap();
    let result = w.gather(conn, 0);
    assert_eq!(result.replicate, vec![a, b]);

    w.graph.set_dormant_on_connection(conn, b, true).unwrap();
    assert!(w.gather(conn, 1).replicate.is_empty());
    let levels = |w: &TestWorld| {
        w.graph
            .connection(conn)
            .map(|m| m.always_relevant_node().levels_needing_replication().len())
    };
    assert_eq!(levels(&w), Some(0));

    // Waking a member does not bring the region back on its own.
    w.graph.set_dormant_on_connection(conn, b, false).unwrap();
    assert!(w.gather(conn, 2).replicate.is_empty());

    w.graph.on_client_level_visibility_add(conn, "Harbor").unwrap();
    let result = w.gather(conn, 3);
    assert!(result.replicate.contains(&b));
    assert_eq!(levels(&w), Some(1));
}

#[test]
fn removed_members_and_missing_lists() {
    let mut w = world();
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();
    let a = spawn_in_region(&mut w, 50, "Harbor");
    let b = spawn_in_region(&mut w, 51, "Harbor");
    w.graph.on_client_level_visibility_add(conn, "Harbor").unwrap();
    w.graph.on_client_level_visibility_add(conn, "Nowhere").unwrap();

    w.graph.on_entity_removed(a);
    let result = w.gather(conn, 0);
    assert_eq!(result.replicate, vec![b]);

    // Regions without a list are forgotten after the first gather.
    let levels: Vec<String> = w
        .graph
        .connection(conn)
        .map(|m| {
            m.always_relevant_node()
                .levels_needing_replication()
                .iter()
                .map(|l| l.to_string())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(levels, vec!["Harbor".to_string()]);
}

#[test]
fn emptied_region_keeps_tracking_new_members() {
    let mut w = world();
    let conn = ConnectionId(1);
    w.graph.add_connection(conn).unwrap();
    let a = spawn_in_region(&mut w, 50, "Harbor");
    w.graph.on_client_level_visibility_add(conn, "Harbor").unwrap();

    w.graph.on_entity_removed(a);
    assert!(w.gather(conn, 0).replicate.is_empty());
    let levels = w
        .graph
        .connection(conn)
        .map(|m| m.always_relevant_node().levels_needing_replication().len());
    assert_eq!(levels, Some(1));

    let b = spawn_in_region(&mut w, 51, "Harbor");
    assert_eq!(w.gather(conn, 1).replicate, vec![b]);
}
