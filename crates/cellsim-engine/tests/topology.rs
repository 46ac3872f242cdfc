//! Integration test: graph membership tracks the connection closure.
//!
//! Cells are placed in a [`GraphWorld`] with an explicit adjacency and then
//! removed again; after every change each graph must be exactly one
//! connected component of the connection relation.

use cellsim_core::CellId;
use cellsim_engine::{CellBuilder, CellGraphManager, SimulationConfig};
use cellsim_test_utils::fixtures::plain;
use cellsim_test_utils::{node, GraphWorld, HookEvent, HookLog, RecordingHooks};
use indexmap::{IndexMap, IndexSet};
use proptest::prelude::*;
use std::collections::HashSet;

fn manager() -> CellGraphManager {
    CellGraphManager::new(SimulationConfig {
        worker_threads: Some(2),
        ..SimulationConfig::default()
    })
    .unwrap()
}

/// Assert that every graph is connected, closed under connections, and
/// that the graphs partition the placed cells.
fn assert_closure(manager: &CellGraphManager) {
    let mut seen: HashSet<CellId> = HashSet::new();
    for id in manager.graph_ids() {
        let graph = manager.graph(id).unwrap();
        let members: HashSet<CellId> = graph.cell_ids().into_iter().collect();
        assert!(!members.is_empty(), "graph {id} is empty");
        for member in &members {
            assert!(seen.insert(*member), "cell {member} in two graphs");
            assert_eq!(manager.graph_of(*member), Some(id));
            let connections = graph
                .with_cell(*member, |cell, _| cell.connections().to_vec())
                .unwrap();
            for remote in connections {
                assert!(members.contains(&remote), "edge {member}-{remote} leaves graph {id}");
            }
        }

        let start = *members.iter().next().unwrap();
        let mut reached = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            let connections = graph
                .with_cell(current, |cell, _| cell.connections().to_vec())
                .unwrap();
            for remote in connections {
                if reached.insert(remote) {
                    stack.push(remote);
                }
            }
        }
        assert_eq!(reached, members, "graph {id} is not connected");
    }
    assert_eq!(seen.len(), manager.cell_count());
}

fn components(nodes: &IndexSet<i32>, edges: &IndexSet<(i32, i32)>) -> usize {
    let mut remaining = nodes.clone();
    let mut count = 0;
    while let Some(start) = remaining.pop() {
        count += 1;
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for (a, b) in edges {
                let other = if *a == current {
                    *b
                } else if *b == current {
                    *a
                } else {
                    continue;
                };
                if remaining.shift_remove(&other) {
                    stack.push(other);
                }
            }
        }
    }
    count
}

// ── Fixed topologies ─────────────────────────────────────────────────

#[test]
fn cycle_survives_one_removal() {
    let mut m = manager();
    let world = GraphWorld::new();
    let n = 6;
    for i in 0..n {
        world.link_nodes(i, (i + 1) % n);
    }
    let ids: Vec<CellId> = (0..n).map(|i| world.insert(&mut m, plain(node(i)))).collect();
    assert_eq!(m.graph_count(), 1);
    assert_closure(&m);

    world.remove(&mut m, ids[2]);
    assert_eq!(m.graph_count(), 1);
    assert_eq!(m.cell_count(), n as usize - 1);
    assert_closure(&m);

    world.remove(&mut m, ids[4]);
    assert_eq!(m.graph_count(), 2);
    assert_closure(&m);
}

#[test]
fn cutting_the_bridge_between_triangles_splits() {
    let mut m = manager();
    let world = GraphWorld::new();
    for (a, b) in [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (2, 6), (6, 3)] {
        world.link_nodes(a, b);
    }
    let ids: Vec<CellId> = (0..7).map(|i| world.insert(&mut m, plain(node(i)))).collect();
    assert_eq!(m.graph_count(), 1);

    let bridge = ids[6];
    world.remove(&mut m, bridge);
    assert_eq!(m.graph_count(), 2);
    assert_closure(&m);
    assert_ne!(m.graph_of(ids[0]), m.graph_of(ids[3]));
    assert_eq!(m.graph_of(ids[0]), m.graph_of(ids[2]));
    assert_eq!(m.graph_of(ids[3]), m.graph_of(ids[5]));

    let events = world.events();
    assert!(events.disconnected.contains(&(bridge, ids[2])));
    assert!(events.disconnected.contains(&(ids[3], bridge)));
}

#[test]
fn triangles_sharing_a_cell_fall_apart_into_pairs() {
    let mut m = manager();
    let world = GraphWorld::new();
    for (a, b) in [(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (4, 2)] {
        world.link_nodes(a, b);
    }
    let ids: Vec<CellId> = (0..5).map(|i| world.insert(&mut m, plain(node(i)))).collect();
    assert_eq!(m.graph_count(), 1);

    world.remove(&mut m, ids[2]);
    assert_eq!(m.graph_count(), 2);
    assert_closure(&m);
    let mut sizes: Vec<usize> = m
        .graph_ids()
        .into_iter()
        .map(|id| m.graph(id).unwrap().len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 2]);

    let connections = |cell: CellId| m.with_cell(cell, |c| c.connections().to_vec()).unwrap();
    assert_eq!(connections(ids[0]), vec![ids[1]]);
    assert_eq!(connections(ids[1]), vec![ids[0]]);
    assert_eq!(connections(ids[3]), vec![ids[4]]);
    assert_eq!(connections(ids[4]), vec![ids[3]]);
    assert_ne!(m.graph_of(ids[0]), m.graph_of(ids[3]));
}

#[test]
fn bridging_cell_merges_and_notifies_members() {
    let mut m = manager();
    let world = GraphWorld::new();
    let log = HookLog::new();
    let hooked = |i: i32| {
        CellBuilder::new("node", node(i))
            .hooks(RecordingHooks::new(log.clone()))
            .build()
            .unwrap()
    };

    // Chain 0-1-2 and chain 4-5, bridged by 3.
    for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)] {
        world.link_nodes(a, b);
    }
    let left: Vec<CellId> = (0..3).map(|i| world.insert(&mut m, hooked(i))).collect();
    let right: Vec<CellId> = (4..6).map(|i| world.insert(&mut m, hooked(i))).collect();
    assert_eq!(m.graph_count(), 2);
    let before = [m.graph_of(left[0]).unwrap(), m.graph_of(right[0]).unwrap()];
    log.clear();

    let bridge = world.insert(&mut m, hooked(3));
    assert_eq!(m.graph_count(), 1);
    assert_eq!(m.cell_count(), 6);
    let merged = m.graph_of(bridge).unwrap();
    assert!(!before.contains(&merged));
    assert_closure(&m);

    assert_eq!(
        log.events_of(bridge),
        vec![
            HookEvent::ConnectionsChanged,
            HookEvent::GraphChanged,
            HookEvent::Created
        ]
    );
    for neighbour in [left[2], right[0]] {
        assert_eq!(
            log.events_of(neighbour),
            vec![HookEvent::ConnectionsChanged, HookEvent::GraphChanged]
        );
    }
    for far in [left[0], left[1], right[1]] {
        assert_eq!(log.events_of(far), vec![HookEvent::GraphChanged]);
    }
}

#[test]
fn removal_hooks_run_in_order() {
    let mut m = manager();
    let world = GraphWorld::new();
    let log = HookLog::new();
    world.link_nodes(0, 1);
    let a = world.insert(
        &mut m,
        CellBuilder::new("node", node(0))
            .hooks(RecordingHooks::new(log.clone()))
            .build()
            .unwrap(),
    );
    let b = world.insert(
        &mut m,
        CellBuilder::new("node", node(1))
            .hooks(RecordingHooks::new(log.clone()))
            .build()
            .unwrap(),
    );
    log.clear();

    let removed = world.remove(&mut m, b).unwrap();
    assert!(removed.is_removed());
    assert_eq!(
        log.events_of(b),
        vec![HookEvent::Removing, HookEvent::Destroyed]
    );
    assert_eq!(log.events_of(a), vec![HookEvent::ConnectionsChanged]);
    assert!(world.remove(&mut m, b).is_none());
}

#[test]
fn retopologize_reconnects_without_lifecycle_hooks() {
    let mut m = manager();
    let world = GraphWorld::new();
    let log = HookLog::new();
    world.link_nodes(0, 1);
    world.link_nodes(1, 2);
    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(world.insert(
            &mut m,
            CellBuilder::new("node", node(i))
                .hooks(RecordingHooks::new(log.clone()))
                .build()
                .unwrap(),
        ));
    }
    log.clear();

    assert!(m.retopologize(ids[1], |_| {}));
    assert_eq!(m.graph_count(), 1);
    assert_closure(&m);
    assert_eq!(log.count(ids[1], HookEvent::Removing), 0);
    assert_eq!(log.count(ids[1], HookEvent::Destroyed), 0);
    assert_eq!(log.count(ids[1], HookEvent::Created), 0);
    assert!(m.is_dirty());
}

// ── Random topologies ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn membership_matches_connection_closure(
        n in 2i32..10,
        raw_edges in prop::collection::vec((0i32..10, 0i32..10), 0..24),
        removals in prop::collection::vec(0i32..10, 0..6),
    ) {
        let mut m = manager();
        let world = GraphWorld::new();
        let mut edges: IndexSet<(i32, i32)> = IndexSet::new();
        for (a, b) in raw_edges {
            let (a, b) = (a % n, b % n);
            if a != b {
                world.link_nodes(a, b);
                edges.insert((a.min(b), a.max(b)));
            }
        }

        let mut placed: IndexMap<i32, CellId> = IndexMap::new();
        for i in 0..n {
            placed.insert(i, world.insert(&mut m, plain(node(i))));
            assert_closure(&m);
        }
        let nodes: IndexSet<i32> = placed.keys().copied().collect();
        prop_assert_eq!(m.graph_count(), components(&nodes, &edges));

        for r in removals {
            let r = r % n;
            if let Some(id) = placed.shift_remove(&r) {
                prop_assert!(world.remove(&mut m, id).is_some());
                assert_closure(&m);
                let nodes: IndexSet<i32> = placed.keys().copied().collect();
                let live: IndexSet<(i32, i32)> = edges
                    .iter()
                    .filter(|(a, b)| nodes.contains(a) && nodes.contains(b))
                    .copied()
                    .collect();
                prop_assert_eq!(m.graph_count(), components(&nodes, &live));
            }
        }
        prop_assert_eq!(m.cell_count(), placed.len());
    }
}
