//! Topology maintenance.
//!
//! Keeps graph membership equal to the transitive closure of the
//! connection relation while cells come and go:
//!
//! - inserting a cell joins it to the graph of its accepting neighbours,
//!   merging every distinct neighbour graph into a fresh one when there is
//!   more than one;
//! - removing a cell with two or more neighbours may cut its graph apart,
//!   so the remaining members are redistributed by a flood fill seeded
//!   with the former neighbours.
//!
//! Every affected graph is stopped before it is touched, rebuilt, and
//! started again once the change is complete.

use crate::cell::Cell;
use crate::container::CellContainer;
use crate::graph::GraphState;
use crate::manager::CellGraphManager;
use cellsim_core::{CellId, GraphId};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Place `cell` in `container`'s world.
///
/// Scans the container for candidate neighbours, keeps those that accept
/// the cell and that it accepts, records the symmetric edges, and joins or
/// merges graphs accordingly. The cell's `on_created` hook runs once its
/// graph is running again.
///
/// # Panics
///
/// Panics if the cell is already placed, or if called off the control
/// thread.
pub fn insert(
    manager: &mut CellGraphManager,
    container: Arc<dyn CellContainer>,
    cell: Cell,
) -> CellId {
    insert_inner(manager, container, cell, true)
}

/// Remove a placed cell and return it after its `on_destroyed` hook.
/// Returns `None` when the cell is not placed.
///
/// # Panics
///
/// Panics if called off the control thread.
pub fn remove(manager: &mut CellGraphManager, cell: CellId) -> Option<Cell> {
    remove_inner(manager, cell, true)
}

/// Detach a cell without removal notifications, run `action` on it, and
/// connect it again through its container. Returns `false` when the cell
/// is not placed or has no container.
pub fn retopologize(
    manager: &mut CellGraphManager,
    cell: CellId,
    action: impl FnOnce(&mut Cell),
) -> bool {
    let Some(mut detached) = remove_inner(manager, cell, false) else {
        return false;
    };
    action(&mut detached);
    let Some(container) = detached.container().cloned() else {
        warn!(%cell, "detached cell has no container; cannot reconnect");
        return false;
    };
    insert_inner(manager, container, detached, false);
    true
}

fn push_unique(containers: &mut Vec<Arc<dyn CellContainer>>, container: Arc<dyn CellContainer>) {
    if !containers.iter().any(|c| Arc::ptr_eq(c, &container)) {
        containers.push(container);
    }
}

// ── Insertion ──────────────────────────────────────────────────────

fn insert_inner(
    manager: &mut CellGraphManager,
    container: Arc<dyn CellContainer>,
    mut cell: Cell,
    notify: bool,
) -> CellId {
    let id = cell.id();
    assert!(!manager.contains(id), "cell {id} is already placed");
    cell.set_container(Some(Arc::clone(&container)));

    let mut neighbors: Vec<(CellId, GraphId)> = Vec::new();
    for candidate in container.neighbor_scan(id, cell.locator()) {
        if candidate.cell == id || neighbors.iter().any(|(n, _)| *n == candidate.cell) {
            continue;
        }
        let Some(graph_id) = manager.graph_of(candidate.cell) else {
            debug!(cell = %id, remote = %candidate.cell, "scan returned an unplaced cell");
            continue;
        };
        let accepted = manager
            .graph(graph_id)
            .and_then(|g| {
                g.with_cell(candidate.cell, |remote, _| {
                    Cell::is_connection_accepted(&cell, remote)
                })
            })
            .unwrap_or(false);
        if accepted {
            neighbors.push((candidate.cell, graph_id));
        }
    }
    let graphs: IndexSet<GraphId> = neighbors.iter().map(|(_, g)| *g).collect();
    for graph_id in &graphs {
        manager.graph_entry(*graph_id).stop();
    }

    let mut containers = vec![Arc::clone(&container)];
    for (remote, graph_id) in &neighbors {
        cell.connections_mut().push(*remote);
        let remote_container = manager.graph_entry(*graph_id).with_state(|state| {
            let remote_cell = &mut state.cells[remote];
            remote_cell.connections_mut().push(id);
            remote_cell.container().cloned()
        });
        container.on_cell_connected(id, *remote);
        if let Some(rc) = remote_container {
            rc.on_cell_connected(*remote, id);
            push_unique(&mut containers, rc);
        }
    }

    let target = match graphs.len() {
        0 => {
            let graph_id = manager.create_graph();
            let graph = manager.graph_entry(graph_id);
            graph.add_cell(cell);
            graph.build_solver();
            graph.update_cell(id, true, true);
            manager.index_cell(id, graph_id);
            graph_id
        }
        1 => {
            let graph_id = graphs[0];
            let graph = manager.graph_entry(graph_id);
            graph.add_cell(cell);
            graph.build_solver();
            for (remote, _) in &neighbors {
                graph.update_cell(*remote, true, false);
            }
            graph.update_cell(id, true, true);
            manager.index_cell(id, graph_id);
            graph_id
        }
        _ => {
            let graph_id = manager.create_graph();
            let mut migrated = Vec::new();
            for old in &graphs {
                if let Some(mut old_graph) = manager.remove_graph(*old) {
                    migrated.extend(old_graph.take_cells());
                }
            }
            let moved = migrated.len();
            let mut members = Vec::with_capacity(moved + 1);
            let graph = manager.graph_entry(graph_id);
            for member in migrated {
                let is_neighbor = neighbors.iter().any(|(n, _)| *n == member.id());
                members.push((member.id(), is_neighbor));
                graph.add_cell(member);
            }
            graph.add_cell(cell);
            graph.build_solver();
            for (member, is_neighbor) in &members {
                graph.update_cell(*member, *is_neighbor, true);
            }
            graph.update_cell(id, true, true);
            for (member, _) in members {
                manager.index_cell(member, graph_id);
            }
            manager.index_cell(id, graph_id);
            info!(graph = %graph_id, merged = graphs.len(), cells = moved + 1, "graphs merged");
            graph_id
        }
    };

    manager.mark_dirty();
    for c in &containers {
        c.on_topology_changed();
    }
    let graph = manager.graph_entry(target);
    graph.start();
    if notify {
        graph.with_cell_locked(id, Cell::notify_created);
    }
    debug!(cell = %id, graph = %target, neighbors = neighbors.len(), "cell inserted");
    id
}

// ── Removal ────────────────────────────────────────────────────────

fn remove_inner(manager: &mut CellGraphManager, id: CellId, notify: bool) -> Option<Cell> {
    let graph_id = manager.graph_of(id)?;
    let graph = manager.graph_entry(graph_id);
    graph.stop();

    let (neighbors, container, remotes) = graph.with_state(|state| {
        let GraphState {
            cells, subscribers, ..
        } = state;
        let cell = &mut cells[&id];
        if notify {
            cell.notify_removing(Some(subscribers));
        } else {
            cell.detach_subscribers(subscribers);
        }
        let neighbors = std::mem::take(cell.connections_mut());
        let container = cell.container().cloned();
        let mut remotes = Vec::with_capacity(neighbors.len());
        for remote in &neighbors {
            if let Some(remote_cell) = cells.get_mut(remote) {
                remote_cell.connections_mut().retain(|c| *c != id);
                remotes.push((*remote, remote_cell.container().cloned()));
            }
        }
        (neighbors, container, remotes)
    });

    let mut containers = Vec::new();
    if let Some(c) = &container {
        push_unique(&mut containers, Arc::clone(c));
    }
    for (remote, remote_container) in remotes {
        if let Some(c) = &container {
            c.on_cell_disconnected(id, remote);
        }
        if let Some(rc) = remote_container {
            rc.on_cell_disconnected(remote, id);
            push_unique(&mut containers, rc);
        }
    }

    let removed = match neighbors.len() {
        0 => {
            let mut old = manager.remove_graph(graph_id)?;
            old.take_cells().pop()
        }
        1 => {
            let graph = manager.graph_entry(graph_id);
            let removed = graph.remove_cell(id);
            graph.update_cell(neighbors[0], true, false);
            graph.build_solver();
            graph.start();
            removed
        }
        _ => {
            let mut old = manager.remove_graph(graph_id)?;
            let mut pool: IndexMap<CellId, Cell> = old
                .take_cells()
                .into_iter()
                .map(|c| (c.id(), c))
                .collect();
            drop(old);
            let removed = pool.shift_remove(&id);
            rebuild_topologies(manager, pool, &neighbors);
            removed
        }
    };

    manager.unindex_cell(id);
    manager.mark_dirty();
    for c in &containers {
        c.on_topology_changed();
    }
    let mut removed = removed?;
    if notify {
        removed.notify_destroyed();
    }
    debug!(cell = %id, neighbors = neighbors.len(), "cell removed");
    Some(removed)
}

/// Redistribute the members of a cut graph into one new graph per
/// connected component.
///
/// The work queue is seeded with the removed cell's former neighbours.
/// Each popped seed that has not been placed yet starts a breadth-first
/// search over the remaining edges; the component found becomes a new
/// graph and its members are dropped from the queue.
fn rebuild_topologies(
    manager: &mut CellGraphManager,
    mut pool: IndexMap<CellId, Cell>,
    seeds: &[CellId],
) {
    let mut queue: VecDeque<CellId> = seeds.iter().copied().collect();
    let mut components = 0usize;
    while !pool.is_empty() {
        let start = match queue.pop_front() {
            Some(start) => start,
            None => {
                let Some(&orphan) = pool.keys().next() else {
                    break;
                };
                warn!(cell = %orphan, "cell unreachable from the removed cell's neighbours");
                orphan
            }
        };
        if !pool.contains_key(&start) {
            continue;
        }

        let mut component = vec![start];
        let mut visited: HashSet<CellId> = HashSet::from([start]);
        let mut next = 0;
        while next < component.len() {
            let current = component[next];
            next += 1;
            for remote in pool[&current].connections() {
                if pool.contains_key(remote) && visited.insert(*remote) {
                    component.push(*remote);
                }
            }
        }
        queue.retain(|c| !visited.contains(c));

        let graph_id = manager.create_graph();
        let graph = manager.graph_entry(graph_id);
        for member in &component {
            if let Some(cell) = pool.shift_remove(member) {
                graph.add_cell(cell);
            }
        }
        graph.build_solver();
        for member in &component {
            graph.update_cell(*member, seeds.contains(member), true);
        }
        graph.start();
        for member in component {
            manager.index_cell(member, graph_id);
        }
        components += 1;
    }
    info!(components, "graph split");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;
    use crate::config::SimulationConfig;
    use crate::container::NeighborInfo;
    use cellsim_core::{BlockPos, Locator};
    use std::sync::Mutex;

    /// Cells on a line; neighbours are the cells one block away.
    #[derive(Default)]
    struct Line {
        cells: Mutex<Vec<(CellId, Locator)>>,
        events: Mutex<Vec<String>>,
    }

    impl Line {
        fn place(&self, x: i32) -> Cell {
            let cell = CellBuilder::new("node", Locator::at(BlockPos::new(x, 0, 0)))
                .build()
                .unwrap();
            self.cells
                .lock()
                .unwrap()
                .push((cell.id(), cell.locator().clone()));
            cell
        }

        fn forget(&self, id: CellId) {
            self.cells.lock().unwrap().retain(|(c, _)| *c != id);
        }
    }

    impl CellContainer for Line {
        fn cells(&self) -> Vec<(CellId, Locator)> {
            self.cells.lock().unwrap().clone()
        }

        fn neighbor_scan(&self, cell: CellId, locator: &Locator) -> Vec<NeighborInfo> {
            let here = locator.require_block();
            self.cells
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, loc)| *id != cell && (loc.require_block().x - here.x).abs() == 1)
                .map(|(id, loc)| NeighborInfo {
                    cell: *id,
                    locator: loc.clone(),
                })
                .collect()
        }

        fn on_cell_connected(&self, cell: CellId, remote: CellId) {
            self.events
                .lock()
                .unwrap()
                .push(format!("connect {cell} {remote}"));
        }

        fn on_topology_changed(&self) {
            self.events.lock().unwrap().push("topology".into());
        }
    }

    fn manager() -> CellGraphManager {
        CellGraphManager::new(SimulationConfig {
            worker_threads: Some(1),
            ..SimulationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn bridging_cell_merges_two_graphs() {
        let mut m = manager();
        let line = Arc::new(Line::default());
        let a = m.insert_cell(line.clone(), line.place(0));
        let c = m.insert_cell(line.clone(), line.place(2));
        assert_eq!(m.graph_count(), 2);

        let b = m.insert_cell(line.clone(), line.place(1));
        assert_eq!(m.graph_count(), 1);
        let g = m.graph_of(b).unwrap();
        assert_eq!(m.graph_of(a), Some(g));
        assert_eq!(m.graph_of(c), Some(g));
        assert!(m.graph(g).unwrap().is_running());
        assert_eq!(m.with_cell(b, |cell| cell.connections().len()), Some(2));

        let events = line.events.lock().unwrap();
        assert!(events.contains(&format!("connect {b} {a}")));
        assert!(events.contains(&format!("connect {a} {b}")));
        assert!(m.is_dirty());
    }

    #[test]
    fn removing_a_cut_vertex_splits_the_graph() {
        let mut m = manager();
        let line = Arc::new(Line::default());
        let ids: Vec<CellId> = (0..5)
            .map(|x| m.insert_cell(line.clone(), line.place(x)))
            .collect();
        assert_eq!(m.graph_count(), 1);

        line.forget(ids[2]);
        let removed = m.remove_cell(ids[2]).unwrap();
        assert!(removed.is_removed());
        assert!(removed.connections().is_empty());
        assert_eq!(m.graph_count(), 2);
        assert_eq!(m.graph_of(ids[0]), m.graph_of(ids[1]));
        assert_eq!(m.graph_of(ids[3]), m.graph_of(ids[4]));
        assert_ne!(m.graph_of(ids[0]), m.graph_of(ids[3]));
        assert!(!m.contains(ids[2]));
    }

    #[test]
    fn removing_a_lone_cell_drops_its_graph() {
        let mut m = manager();
        let line = Arc::new(Line::default());
        let id = m.insert_cell(line.clone(), line.place(0));
        line.forget(id);
        assert!(m.remove_cell(id).is_some());
        assert_eq!(m.graph_count(), 0);
        assert!(m.remove_cell(id).is_none());
    }

    #[test]
    fn retopologize_keeps_the_cell_placed() {
        let mut m = manager();
        let line = Arc::new(Line::default());
        let a = m.insert_cell(line.clone(), line.place(0));
        let b = m.insert_cell(line.clone(), line.place(1));
        let mut touched = false;
        assert!(m.retopologize(b, |cell| touched = !cell.is_removed()));
        assert!(touched);
        assert_eq!(m.graph_count(), 1);
        assert_eq!(m.graph_of(a), m.graph_of(b));
        assert_eq!(m.with_cell(a, |cell| cell.connections().to_vec()), Some(vec![b]));
    }
}
