//! cellsim quickstart: a small powered world from scratch.
//!
//! Demonstrates:
//!   1. Creating a manager on the control thread
//!   2. Placing cells in a host container (the grid host from the test
//!      utilities)
//!   3. Reading solver results back through cell objects
//!   4. Publishing a setpoint from another thread
//!   5. Pumping the control queue as a heater overheats and removes itself
//!   6. Saving the world to JSON and restoring it into a new manager
//!
//! Run with:
//!   RUST_LOG=info cargo run --example quickstart

use cellsim::engine::objects::ResistorObject;
use cellsim::engine::VoltageSetpointBehavior;
use cellsim::prelude::*;
use cellsim_test_utils::fixtures::{ground, heater, resistor, test_registry, voltage_source};
use cellsim_test_utils::GridWorld;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const SUPPLY_VOLTS: f64 = 12.0;

fn at(x: i32, z: i32) -> Locator {
    Locator::at(BlockPos::new(x, 0, z))
}

fn resistor_current(manager: &CellGraphManager, cell: CellId) -> Option<f64> {
    let graph = manager.graph(manager.graph_of(cell)?)?;
    graph
        .with_cell(cell, |cell, solvers| {
            let object = cell.objects().get(Domain::Electrical)?;
            let circuit = solvers.circuit(object.realized()?)?;
            Some(object.downcast_ref::<ResistorObject>()?.current(circuit))
        })
        .flatten()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut manager = CellGraphManager::new(SimulationConfig::default()).unwrap();
    let world = GridWorld::new();

    // --- A voltage divider along z ---
    world.insert(&mut manager, ground(at(0, 1)));
    let source = world.insert(&mut manager, voltage_source(at(0, 0), SUPPLY_VOLTS));
    let upper = world.insert(&mut manager, resistor(at(0, -1), 100.0));
    world.insert(&mut manager, resistor(at(0, -2), 200.0));
    world.insert(&mut manager, ground(at(0, -3)));

    thread::sleep(Duration::from_millis(50));
    info!(
        graphs = manager.graph_count(),
        current = resistor_current(&manager, upper).unwrap_or(0.0),
        "divider running"
    );

    // --- Retune the supply from another thread ---
    let setpoint = manager
        .with_cell(source, |cell| {
            cell.behaviors()
                .get::<VoltageSetpointBehavior>()
                .map(VoltageSetpointBehavior::setpoint)
        })
        .flatten()
        .unwrap();
    thread::spawn(move || setpoint.publish(2.0 * SUPPLY_VOLTS))
        .join()
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    info!(
        current = resistor_current(&manager, upper).unwrap_or(0.0),
        "supply doubled"
    );

    // --- An overdriven heater next to it ---
    world.insert(&mut manager, ground(at(4, 1)));
    world.insert(&mut manager, voltage_source(at(4, 0), 100.0));
    let hot = world.insert(&mut manager, heater(at(4, -1), 10.0, 400.0, 0.5));
    world.insert(&mut manager, ground(at(4, -2)));
    info!(graphs = manager.graph_count(), "heater placed");

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.contains(hot) && Instant::now() < deadline {
        manager.pump();
        thread::sleep(Duration::from_millis(10));
    }
    info!(
        removed = !manager.contains(hot),
        graphs = manager.graph_count(),
        tick_rate = manager.sample_tick_rate(),
        "heater check done"
    );

    // --- Save and restore ---
    let json = manager.save().to_json().unwrap();
    info!(bytes = json.len(), "world saved");
    manager.shutdown();

    let mut restored = CellGraphManager::new(SimulationConfig::default()).unwrap();
    let target = GridWorld::new();
    let record = ManagerRecord::from_json(&json).unwrap();
    let graphs = restored
        .load(record, &test_registry(), target.clone())
        .unwrap();
    info!(
        graphs = graphs.len(),
        cells = restored.cell_count(),
        "world restored"
    );
}
