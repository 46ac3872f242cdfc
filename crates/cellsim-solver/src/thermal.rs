//! Lumped thermal network.
//!
//! Bodies store thermal energy and have a heat capacity; links move heat
//! proportionally to the temperature difference. The explicit step clamps
//! every transfer so a link never pushes a pair past equilibrium, which
//! keeps stiff links stable at the engine's fixed tick.

use cellsim_core::SolveStatus;
use indexmap::IndexMap;

/// Handle of a body within one [`ThermalSimulator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(usize);

#[derive(Clone, Copy, Debug)]
struct Body {
    /// J/K
    capacity: f64,
    /// J
    energy: f64,
    environment: Option<Environment>,
}

#[derive(Clone, Copy, Debug)]
struct Environment {
    conductance: f64,
    temperature: f64,
}

/// A set of thermal bodies and the conductive links between them.
#[derive(Debug, Default)]
pub struct ThermalSimulator {
    bodies: Vec<Body>,
    links: IndexMap<(usize, usize), f64>,
}

impl ThermalSimulator {
    /// Create an empty simulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body with `capacity` J/K at `temperature` K.
    pub fn add_body(&mut self, capacity: f64, temperature: f64) -> BodyId {
        self.bodies.push(Body {
            capacity,
            energy: capacity * temperature,
            environment: None,
        });
        BodyId(self.bodies.len() - 1)
    }

    /// Link two bodies with `conductance` W/K. Links are unordered and the
    /// first conductance registered for a pair is kept.
    pub fn connect(&mut self, a: BodyId, b: BodyId, conductance: f64) {
        if a == b {
            return;
        }
        let key = (a.0.min(b.0), a.0.max(b.0));
        self.links.entry(key).or_insert(conductance);
    }

    /// Exchange heat between `body` and a fixed-temperature environment.
    pub fn set_environment(&mut self, body: BodyId, conductance: f64, temperature: f64) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.environment = Some(Environment {
                conductance,
                temperature,
            });
        }
    }

    /// Number of bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of distinct links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Temperature of a body in K.
    pub fn temperature(&self, body: BodyId) -> f64 {
        self.bodies
            .get(body.0)
            .map_or(0.0, |b| b.energy / b.capacity)
    }

    /// Stored energy of a body in J.
    pub fn energy(&self, body: BodyId) -> f64 {
        self.bodies.get(body.0).map_or(0.0, |b| b.energy)
    }

    /// Add (or, if negative, remove) energy.
    pub fn add_energy(&mut self, body: BodyId, joules: f64) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.energy += joules;
        }
    }

    /// Overwrite a body's stored energy.
    pub fn set_energy(&mut self, body: BodyId, joules: f64) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.energy = joules;
        }
    }

    /// Total energy across all bodies.
    pub fn total_energy(&self) -> f64 {
        self.bodies.iter().map(|b| b.energy).sum()
    }

    /// Advance the network by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> SolveStatus {
        let mut delta = vec![0.0; self.bodies.len()];
        for (&(a, b), &conductance) in &self.links {
            let (ba, bb) = (&self.bodies[a], &self.bodies[b]);
            let ta = ba.energy / ba.capacity;
            let tb = bb.energy / bb.capacity;
            let flow = conductance * (ta - tb) * dt;
            // Energy that would bring the pair to a common temperature.
            let limit = (ta - tb) * ba.capacity * bb.capacity / (ba.capacity + bb.capacity);
            let flow = if flow.abs() > limit.abs() { limit } else { flow };
            delta[a] -= flow;
            delta[b] += flow;
        }
        for (body, d) in self.bodies.iter_mut().zip(delta) {
            body.energy += d;
            if let Some(env) = body.environment {
                let t = body.energy / body.capacity;
                let flow = env.conductance * (t - env.temperature) * dt;
                let limit = (t - env.temperature) * body.capacity;
                body.energy -= if flow.abs() > limit.abs() { limit } else { flow };
            }
        }
        if self
            .bodies
            .iter()
            .any(|b| !(b.energy / b.capacity).is_finite())
        {
            return SolveStatus::NumericFailure;
        }
        SolveStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_bodies_equalize() {
        let mut sim = ThermalSimulator::new();
        let a = sim.add_body(10.0, 400.0);
        let b = sim.add_body(10.0, 300.0);
        sim.connect(a, b, 5.0);
        for _ in 0..2_000 {
            assert_eq!(sim.step(0.01), SolveStatus::Ok);
        }
        assert!((sim.temperature(a) - 350.0).abs() < 1e-3);
        assert!((sim.temperature(b) - 350.0).abs() < 1e-3);
    }

    #[test]
    fn stiff_link_does_not_overshoot() {
        let mut sim = ThermalSimulator::new();
        let a = sim.add_body(1.0, 500.0);
        let b = sim.add_body(1.0, 300.0);
        sim.connect(a, b, 1e6);
        sim.step(1.0);
        assert!((sim.temperature(a) - 400.0).abs() < 1e-9);
        assert!((sim.temperature(b) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn links_are_deduplicated() {
        let mut sim = ThermalSimulator::new();
        let a = sim.add_body(1.0, 300.0);
        let b = sim.add_body(1.0, 300.0);
        sim.connect(a, b, 1.0);
        sim.connect(b, a, 2.0);
        sim.connect(a, a, 2.0);
        assert_eq!(sim.link_count(), 1);
    }

    #[test]
    fn environment_cools_body() {
        let mut sim = ThermalSimulator::new();
        let a = sim.add_body(1.0, 400.0);
        sim.set_environment(a, 0.5, 300.0);
        sim.step(0.1);
        assert!(sim.temperature(a) < 400.0);
        assert!(sim.temperature(a) > 300.0);
    }

    #[test]
    fn zero_capacity_is_numeric_failure() {
        let mut sim = ThermalSimulator::new();
        sim.add_body(0.0, 300.0);
        assert_eq!(sim.step(0.01), SolveStatus::NumericFailure);
    }

    proptest! {
        #[test]
        fn links_conserve_energy(
            temps in prop::collection::vec(200.0f64..800.0, 2..8),
            g in 0.1f64..100.0,
        ) {
            let mut sim = ThermalSimulator::new();
            let ids: Vec<_> = temps.iter().map(|t| sim.add_body(2.0, *t)).collect();
            for w in ids.windows(2) {
                sim.connect(w[0], w[1], g);
            }
            let before = sim.total_energy();
            for _ in 0..50 {
                sim.step(0.01);
            }
            prop_assert!((sim.total_energy() - before).abs() < 1e-6 * before);
        }
    }
}
