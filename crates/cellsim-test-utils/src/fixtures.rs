//! Ready-made cells for tests and benchmarks.
//!
//! Every factory builds through [`CellBuilder`] under a fixed kind name;
//! [`test_registry`] registers the same kinds with default parameters so
//! saved worlds made of fixture cells can be restored.

use cellsim_core::{Direction, Locator};
use cellsim_engine::objects::{
    FluidPatchObject, GroundObject, ResistorObject, ThermalMassObject, VoltageSourceObject,
    WireObject,
};
use cellsim_engine::{
    Cell, CellBuilder, CellRegistry, PowerHeatingBehavior, SimulationObject,
    TemperatureExplosionBehavior, VoltageSetpointBehavior,
};
use cellsim_solver::VoxelPatch;

/// Ambient temperature of fixture thermal masses, in K.
pub const AMBIENT: f64 = 293.15;

/// A cell with no simulation objects.
pub fn plain(locator: Locator) -> Cell {
    CellBuilder::new("node", locator).build().unwrap()
}

/// A thermal mass.
pub fn thermal_mass(locator: Locator, capacity: f64, temperature: f64) -> Cell {
    CellBuilder::new("mass", locator)
        .object(SimulationObject::thermal(ThermalMassObject::new(
            capacity,
            temperature,
        )))
        .build()
        .unwrap()
}

/// A two-terminal resistor, terminals north and south.
pub fn resistor(locator: Locator, ohms: f64) -> Cell {
    CellBuilder::new("resistor", locator)
        .object(SimulationObject::electrical(ResistorObject::new(ohms)))
        .build()
        .unwrap()
}

/// A voltage source, positive north and negative south, with a
/// [`VoltageSetpointBehavior`].
pub fn voltage_source(locator: Locator, volts: f64) -> Cell {
    CellBuilder::new("source", locator)
        .object(SimulationObject::electrical(VoltageSourceObject::new(
            volts, 1e-3,
        )))
        .behavior(VoltageSetpointBehavior::new())
        .build()
        .unwrap()
}

/// A tie to the ground reference.
pub fn ground(locator: Locator) -> Cell {
    CellBuilder::new("ground", locator)
        .object(SimulationObject::electrical(GroundObject::new(1e-3)))
        .build()
        .unwrap()
}

/// A junction joining every neighbour.
pub fn wire(locator: Locator) -> Cell {
    CellBuilder::new("wire", locator)
        .object(SimulationObject::electrical(WireObject::new(1e-3)))
        .build()
        .unwrap()
}

/// A resistor whose dissipation heats a thermal mass, and which explodes
/// after `seconds` at or above `threshold` K.
pub fn heater(locator: Locator, ohms: f64, threshold: f64, seconds: f64) -> Cell {
    CellBuilder::new("heater", locator)
        .object(SimulationObject::electrical(ResistorObject::new(ohms)))
        .object(SimulationObject::thermal(ThermalMassObject::new(1.0, AMBIENT)))
        .behavior(PowerHeatingBehavior)
        .behavior(TemperatureExplosionBehavior::new(threshold, seconds))
        .build()
        .unwrap()
}

/// A sealed pipe section of `fluid` filling the locator's block, open
/// towards each of `open`.
pub fn pipe(locator: Locator, open: &[Direction], fluid: &str, density: f64) -> Cell {
    let mut patch = VoxelPatch::shell(locator.require_block(), 4);
    for dir in open {
        patch.open_face(*dir);
    }
    CellBuilder::new("pipe", locator)
        .object(SimulationObject::diffusion(FluidPatchObject::new(
            fluid, patch, 0.5, density,
        )))
        .build()
        .unwrap()
}

/// Registry of the fixture kinds with default parameters.
pub fn test_registry() -> CellRegistry {
    let mut registry = CellRegistry::new();
    registry.register("node", |l| Ok(plain(l))).unwrap();
    registry
        .register("mass", |l| Ok(thermal_mass(l, 100.0, AMBIENT)))
        .unwrap();
    registry.register("resistor", |l| Ok(resistor(l, 100.0))).unwrap();
    registry
        .register("source", |l| Ok(voltage_source(l, 10.0)))
        .unwrap();
    registry.register("ground", |l| Ok(ground(l))).unwrap();
    registry.register("wire", |l| Ok(wire(l))).unwrap();
    registry
        .register("heater", |l| Ok(heater(l, 10.0, 400.0, 1.0)))
        .unwrap();
    registry
        .register("pipe", |l| Ok(pipe(l, &[], "water", 1.0)))
        .unwrap();
    registry
}
