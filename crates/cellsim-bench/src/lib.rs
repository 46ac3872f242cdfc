//! Benchmark worlds for the cellsim engine.
//!
//! Provides pre-built worlds for benchmarking:
//!
//! - [`random_topology`]: seeded random adjacency over plain cells
//! - [`thermal_grid`]: a square of touching thermal masses
//! - [`divider_chain`]: a long series resistor chain between two grounds
//!
//! Managers built here tick slowly so that benchmarks driving
//! [`CellGraph::tick`](cellsim_engine::CellGraph::tick) by hand are not
//! competing with the scheduler.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use cellsim_core::{BlockPos, CellId, Locator};
use cellsim_engine::{CellGraphManager, ConfigError, SimulationConfig};
use cellsim_test_utils::fixtures::{ground, plain, resistor, thermal_mass, voltage_source, AMBIENT};
use cellsim_test_utils::{node, GraphWorld, GridWorld};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// A manager whose scheduled ticks are a second apart.
pub fn quiet_manager() -> Result<CellGraphManager, ConfigError> {
    CellGraphManager::new(SimulationConfig {
        tick_rate_hz: 1.0,
        worker_threads: Some(1),
    })
}

/// Generate `edges` random node pairs among `nodes` nodes.
///
/// Self loops are skipped, so fewer pairs may be returned. The same seed
/// always yields the same pairs.
pub fn random_edges(nodes: i32, edges: usize, seed: u64) -> Vec<(i32, i32)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..edges)
        .map(|_| (rng.random_range(0..nodes), rng.random_range(0..nodes)))
        .filter(|(a, b)| a != b)
        .collect()
}

/// A [`GraphWorld`] with the links of [`random_edges`] declared but no
/// cells placed yet.
pub fn random_topology(nodes: i32, edges: usize, seed: u64) -> Arc<GraphWorld> {
    let world = GraphWorld::new();
    for (a, b) in random_edges(nodes, edges, seed) {
        world.link_nodes(a, b);
    }
    world
}

/// Place a plain cell on every node of `world`.
pub fn populate(
    manager: &mut CellGraphManager,
    world: &Arc<GraphWorld>,
    nodes: i32,
) -> Vec<CellId> {
    (0..nodes)
        .map(|i| world.insert(manager, plain(node(i))))
        .collect()
}

/// A `side` x `side` square of thermal masses with a warm diagonal.
pub fn thermal_grid(manager: &mut CellGraphManager, side: i32) -> (Arc<GridWorld>, Vec<CellId>) {
    let world = GridWorld::new();
    let mut cells = Vec::new();
    for x in 0..side {
        for z in 0..side {
            let temperature = if x == z { AMBIENT + 100.0 } else { AMBIENT };
            let locator = Locator::at(BlockPos::new(x, 0, z));
            cells.push(world.insert(manager, thermal_mass(locator, 10.0, temperature)));
        }
    }
    (world, cells)
}

/// Ground, a 10 V source, `resistors` 10 Ω resistors and ground stacked
/// along z. Returns the world and the resistor ids.
pub fn divider_chain(
    manager: &mut CellGraphManager,
    resistors: i32,
) -> (Arc<GridWorld>, Vec<CellId>) {
    let at = |z: i32| Locator::at(BlockPos::new(0, 0, z));
    let world = GridWorld::new();
    world.insert(manager, ground(at(1)));
    world.insert(manager, voltage_source(at(0), 10.0));
    let chain = (1..=resistors)
        .map(|i| world.insert(manager, resistor(at(-i), 10.0)))
        .collect();
    world.insert(manager, ground(at(-resistors - 1)));
    (world, chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_edges_are_deterministic() {
        assert_eq!(random_edges(50, 80, 7), random_edges(50, 80, 7));
        assert!(random_edges(50, 80, 7).iter().all(|(a, b)| a != b));
    }

    #[test]
    fn divider_chain_is_one_graph() {
        let mut m = quiet_manager().unwrap();
        let (_world, chain) = divider_chain(&mut m, 8);
        assert_eq!(chain.len(), 8);
        assert_eq!(m.graph_count(), 1);
        assert_eq!(m.cell_count(), 11);
    }

    #[test]
    fn thermal_grid_is_one_graph() {
        let mut m = quiet_manager().unwrap();
        let (_world, cells) = thermal_grid(&mut m, 4);
        assert_eq!(cells.len(), 16);
        assert_eq!(m.graph_count(), 1);
    }
}
