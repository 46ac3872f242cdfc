//! Integration test: solvers realized from placed cells.
//!
//! Small worlds on a [`GridWorld`] exercise each domain end to end: the
//! cells are inserted through the manager, the graph realizes its solvers,
//! and values are read back through the cells' objects.

use cellsim_core::{BlockPos, CellId, Direction, Domain, Locator, SolveStatus};
use cellsim_engine::objects::{FluidPatchObject, ResistorObject};
use cellsim_engine::{CellGraph, CellGraphManager, SimulationConfig, VoltageSetpointBehavior};
use cellsim_test_utils::fixtures::{ground, pipe, resistor, thermal_mass, voltage_source};
use cellsim_test_utils::GridWorld;
use std::sync::Arc;

fn manager() -> CellGraphManager {
    CellGraphManager::new(SimulationConfig {
        worker_threads: Some(2),
        ..SimulationConfig::default()
    })
    .unwrap()
}

fn at(x: i32, z: i32) -> Locator {
    Locator::at(BlockPos::new(x, 0, z))
}

fn graph_of(m: &CellGraphManager, cell: CellId) -> &CellGraph {
    m.graph(m.graph_of(cell).unwrap()).unwrap()
}

fn resistor_current(m: &CellGraphManager, cell: CellId) -> f64 {
    graph_of(m, cell)
        .with_cell(cell, |cell, solvers| {
            let object = cell.objects().get(Domain::Electrical).unwrap();
            let circuit = solvers.circuit(object.realized().unwrap()).unwrap();
            object.downcast_ref::<ResistorObject>().unwrap().current(circuit)
        })
        .unwrap()
}

fn fluid_amount(m: &CellGraphManager, cell: CellId) -> f64 {
    graph_of(m, cell)
        .with_cell(cell, |cell, solvers| {
            let object = cell.objects().get(Domain::Diffusion).unwrap();
            let volume = object.realized().and_then(|i| solvers.diffusion(i));
            object.downcast_ref::<FluidPatchObject>().unwrap().amount(volume)
        })
        .unwrap()
}

/// Ground, 10 V source, 100 Ω, 300 Ω and ground stacked along z.
fn divider(m: &mut CellGraphManager, world: &Arc<GridWorld>) -> [CellId; 3] {
    world.insert(m, ground(at(0, 1)));
    let source = world.insert(m, voltage_source(at(0, 0), 10.0));
    let r1 = world.insert(m, resistor(at(0, -1), 100.0));
    let r2 = world.insert(m, resistor(at(0, -2), 300.0));
    world.insert(m, ground(at(0, -3)));
    [source, r1, r2]
}

// ── Electrical ───────────────────────────────────────────────────────

#[test]
fn series_divider_carries_one_current() {
    let mut m = manager();
    let world = GridWorld::new();
    let [_, r1, r2] = divider(&mut m, &world);
    assert_eq!(m.graph_count(), 1);

    let graph = graph_of(&m, r1);
    assert_eq!(graph.partition(Domain::Electrical).len(), 1);
    assert_eq!(graph.last_report().worst(), SolveStatus::Ok);
    graph.tick();

    let i1 = resistor_current(&m, r1).abs();
    let i2 = resistor_current(&m, r2).abs();
    assert!((i1 - 0.025).abs() < 1e-4, "current {i1}");
    assert!((i1 - i2).abs() < 1e-9);
    let drop_r2 = i2 * 300.0;
    assert!((drop_r2 - 7.5).abs() < 1e-2, "drop {drop_r2}");
}

#[test]
fn setpoint_published_off_thread_retunes_the_source() {
    let mut m = manager();
    let world = GridWorld::new();
    let [source, r1, _] = divider(&mut m, &world);
    let setpoint = m
        .with_cell(source, |cell| {
            cell.behaviors()
                .get::<VoltageSetpointBehavior>()
                .map(VoltageSetpointBehavior::setpoint)
        })
        .flatten()
        .unwrap();

    std::thread::spawn(move || setpoint.publish(20.0))
        .join()
        .unwrap();
    let graph = graph_of(&m, r1);
    graph.tick();
    graph.tick();
    let current = resistor_current(&m, r1).abs();
    assert!((current - 0.05).abs() < 1e-4, "current {current}");
}

#[test]
fn cutting_the_divider_splits_the_circuit() {
    let mut m = manager();
    let world = GridWorld::new();
    let [source, r1, r2] = divider(&mut m, &world);
    world.remove(&mut m, r1);
    assert_eq!(m.graph_count(), 2);
    assert_ne!(m.graph_of(source), m.graph_of(r2));

    let graph = graph_of(&m, r2);
    graph.tick();
    assert!(resistor_current(&m, r2).abs() < 1e-9);
}

// ── Thermal ──────────────────────────────────────────────────────────

#[test]
fn touching_masses_share_one_simulator() {
    let mut m = manager();
    let world = GridWorld::new();
    let hot = world.insert(&mut m, thermal_mass(at(0, 0), 10.0, 400.0));
    let cold = world.insert(&mut m, thermal_mass(at(1, 0), 10.0, 200.0));
    let graph = graph_of(&m, hot);
    assert_eq!(graph.partition(Domain::Thermal).len(), 1);

    for _ in 0..2_000 {
        graph.tick();
    }
    let temperature = |cell| {
        graph
            .with_cell(cell, |c, s| c.objects().temperature(s))
            .flatten()
            .unwrap()
    };
    let (th, tc) = (temperature(hot), temperature(cold));
    assert!((th - tc).abs() < 1.0, "{th} vs {tc}");
    assert!((th + tc - 600.0).abs() < 1e-6);
}

// ── Diffusion ────────────────────────────────────────────────────────

#[test]
fn open_pipes_share_fluid() {
    let mut m = manager();
    let world = GridWorld::new();
    let full = world.insert(&mut m, pipe(at(0, 0), &[Direction::East], "water", 1.0));
    let empty = world.insert(&mut m, pipe(at(1, 0), &[Direction::West], "water", 0.0));
    let graph = graph_of(&m, full);
    assert_eq!(graph.partition(Domain::Diffusion).len(), 1);
    assert_eq!(graph.last_report().worst(), SolveStatus::Ok);

    let total = fluid_amount(&m, full) + fluid_amount(&m, empty);
    for _ in 0..200 {
        graph.tick();
    }
    let (a, b) = (fluid_amount(&m, full), fluid_amount(&m, empty));
    assert!(b > 0.0);
    assert!(a >= b - 1e-9);
    assert!((a + b - total).abs() < 1e-6);
}

#[test]
fn pipe_open_to_nothing_is_not_realized() {
    let mut m = manager();
    let world = GridWorld::new();
    let leaky = world.insert(&mut m, pipe(at(0, 0), &[Direction::North], "water", 1.0));
    let graph = graph_of(&m, leaky);
    assert_eq!(graph.partition(Domain::Diffusion).len(), 0);
    assert_eq!(graph.last_report().worst(), SolveStatus::ConfigurationError);
    let realized = graph
        .with_cell(leaky, |cell, _| {
            cell.objects().get(Domain::Diffusion).unwrap().realized()
        })
        .unwrap();
    assert_eq!(realized, None);
}

#[test]
fn different_fluids_stay_apart() {
    let mut m = manager();
    let world = GridWorld::new();
    let water = world.insert(&mut m, pipe(at(0, 0), &[], "water", 1.0));
    world.insert(&mut m, pipe(at(1, 0), &[], "steam", 1.0));
    assert_eq!(m.graph_count(), 1);
    assert_eq!(graph_of(&m, water).partition(Domain::Diffusion).len(), 2);
}
