use crate::object::{ObjectPeer, ThermalModel};
use cellsim_core::Locator;
use cellsim_solver::{BodyId, ThermalSimulator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default contact conductance, in W/K.
const DEFAULT_CONDUCTANCE: f64 = 10.0;

/// A single lumped body with uniform temperature.
///
/// While unrealized the temperature lives in the object; once realized it
/// lives in the simulator and is copied back on capture.
#[derive(Debug)]
pub struct ThermalMassObject {
    capacity: f64,
    temperature: f64,
    conductance: f64,
    environment: Option<(f64, f64)>,
    body: Option<BodyId>,
}

#[derive(Serialize, Deserialize)]
struct MassState {
    temperature: f64,
}

impl ThermalMassObject {
    /// A body of `capacity` J/K at `temperature` K.
    pub fn new(capacity: f64, temperature: f64) -> Self {
        Self {
            capacity,
            temperature,
            conductance: DEFAULT_CONDUCTANCE,
            environment: None,
            body: None,
        }
    }

    /// Contact conductance towards each neighbour, in W/K.
    pub fn with_conductance(mut self, conductance: f64) -> Self {
        self.conductance = conductance.max(0.0);
        self
    }

    /// Exchange heat with a fixed-temperature environment.
    pub fn with_environment(mut self, conductance: f64, temperature: f64) -> Self {
        self.environment = Some((conductance.max(0.0), temperature));
        self
    }

    /// Heat capacity in J/K.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Realized body, if any.
    pub fn body(&self) -> Option<BodyId> {
        self.body
    }
}

impl ThermalModel for ThermalMassObject {
    fn add_bodies(&mut self, sim: &mut ThermalSimulator) {
        let body = sim.add_body(self.capacity, self.temperature);
        if let Some((g, t)) = self.environment {
            sim.set_environment(body, g, t);
        }
        self.body = Some(body);
    }

    fn offer_body(&self, _local: &Locator, _peer: &ObjectPeer) -> Option<(BodyId, f64)> {
        self.body.map(|b| (b, self.conductance))
    }

    fn capture(&mut self, sim: &ThermalSimulator) {
        if let Some(body) = self.body {
            self.temperature = sim.temperature(body);
        }
    }

    fn clear(&mut self) {
        self.body = None;
    }

    fn temperature(&self, sim: Option<&ThermalSimulator>) -> f64 {
        match (sim, self.body) {
            (Some(sim), Some(body)) => sim.temperature(body),
            _ => self.temperature,
        }
    }

    fn add_energy(&mut self, sim: Option<&mut ThermalSimulator>, joules: f64) {
        match (sim, self.body) {
            (Some(sim), Some(body)) => sim.add_energy(body, joules),
            _ if self.capacity > 0.0 => self.temperature += joules / self.capacity,
            _ => {}
        }
    }

    fn save(&self) -> Value {
        serde_json::to_value(MassState {
            temperature: self.temperature,
        })
        .unwrap_or(Value::Null)
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        let state: MassState = serde_json::from_value(state)?;
        self.temperature = state.temperature;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_copies_simulated_temperature() {
        let mut sim = ThermalSimulator::new();
        let mut mass = ThermalMassObject::new(50.0, 300.0);
        mass.add_bodies(&mut sim);
        mass.add_energy(Some(&mut sim), 500.0);
        assert!((mass.temperature(Some(&sim)) - 310.0).abs() < 1e-9);
        mass.capture(&sim);
        mass.clear();
        assert!((mass.temperature(None) - 310.0).abs() < 1e-9);
    }

    #[test]
    fn environment_is_applied_on_realization() {
        let mut sim = ThermalSimulator::new();
        let mut mass = ThermalMassObject::new(10.0, 400.0).with_environment(5.0, 300.0);
        mass.add_bodies(&mut sim);
        for _ in 0..1000 {
            sim.step(0.01);
        }
        assert!(mass.temperature(Some(&sim)) < 400.0);
    }

    #[test]
    fn saved_temperature_is_restored() {
        let mass = ThermalMassObject::new(10.0, 345.0);
        let mut other = ThermalMassObject::new(10.0, 0.0);
        other.load(mass.save()).unwrap();
        assert_eq!(other.temperature(None), 345.0);
    }
}
