//! Stock behaviors coupling the domains of one cell.

use crate::behavior::CellBehavior;
use crate::context::TickContext;
use crate::objects::VoltageSourceObject;
use crate::subscriber::{SubscriberCollection, SubscriberCollectionExt};
use cellsim_core::{CellId, Domain, LatestValue};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, trace};

// ── PowerHeatingBehavior ───────────────────────────────────────────

/// Turns the electrical dissipation of a cell into heat in its thermal
/// object, every tick before the solvers step.
#[derive(Debug, Default)]
pub struct PowerHeatingBehavior;

impl CellBehavior for PowerHeatingBehavior {
    fn subscribe(&mut self, cell: CellId, subscribers: &mut dyn SubscriberCollection) {
        subscribers.add_pre(move |dt, _, ctx: &mut TickContext<'_>| {
            ctx.with_cell(cell, |cell, solvers| {
                let power = cell.objects().electrical_power(solvers).unwrap_or(0.0);
                if power != 0.0 {
                    cell.objects_mut()
                        .add_thermal_energy(solvers, power.abs() * dt);
                }
            });
        });
    }

    fn type_name(&self) -> &'static str {
        "power_heating"
    }
}

// ── TemperatureExplosionBehavior ───────────────────────────────────

/// Removes its cell after it has stayed too hot for too long.
///
/// Every 10 ticks the score rises by `increase` per second while the
/// temperature is at or above the threshold, and decays by `decrease` per
/// second otherwise. At a score of 1 the cell asks the control thread to
/// remove it.
#[derive(Debug)]
pub struct TemperatureExplosionBehavior {
    threshold: f64,
    increase: f64,
    decrease: f64,
    score: f64,
    exploded: bool,
}

#[derive(Serialize, Deserialize)]
struct ExplosionState {
    score: f64,
}

impl TemperatureExplosionBehavior {
    /// Explode after `seconds` continuously at or above `threshold` K.
    pub fn new(threshold: f64, seconds: f64) -> Self {
        let increase = 1.0 / seconds.max(f64::EPSILON);
        Self {
            threshold,
            increase,
            decrease: increase,
            score: 0.0,
            exploded: false,
        }
    }

    /// Rate at which the score decays while cool, per second.
    pub fn with_decrease(mut self, decrease: f64) -> Self {
        self.decrease = decrease.max(0.0);
        self
    }

    /// Current score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Whether removal has been requested.
    pub fn has_exploded(&self) -> bool {
        self.exploded
    }

    /// Advance the score; returns `true` exactly once, when it first
    /// reaches 1.
    fn advance(&mut self, temperature: f64, dt: f64) -> bool {
        if self.exploded {
            return false;
        }
        if temperature >= self.threshold {
            self.score += self.increase * dt;
        } else {
            self.score -= self.decrease * dt;
        }
        self.score = self.score.clamp(0.0, 1.0);
        if self.score >= 1.0 {
            self.exploded = true;
            return true;
        }
        false
    }
}

impl CellBehavior for TemperatureExplosionBehavior {
    fn subscribe(&mut self, cell: CellId, subscribers: &mut dyn SubscriberCollection) {
        subscribers.add_post10(move |dt, _, ctx: &mut TickContext<'_>| {
            let explode = ctx
                .with_cell(cell, |cell, solvers| {
                    let temperature = cell.objects().temperature(solvers)?;
                    let behavior = cell
                        .behaviors_mut()
                        .get_mut::<TemperatureExplosionBehavior>()?;
                    Some(behavior.advance(temperature, dt))
                })
                .flatten()
                .unwrap_or(false);
            if explode {
                info!(%cell, "cell overheated; requesting removal");
                ctx.request_removal(cell);
            }
        });
    }

    fn save(&self) -> Option<Value> {
        serde_json::to_value(ExplosionState { score: self.score }).ok()
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        let state: ExplosionState = serde_json::from_value(state)?;
        self.score = state.score.clamp(0.0, 1.0);
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "temperature_explosion"
    }
}

// ── VoltageSetpointBehavior ────────────────────────────────────────

/// Applies potentials published from other threads to the cell's
/// [`VoltageSourceObject`].
///
/// The host keeps a clone of [`setpoint`](Self::setpoint) and publishes
/// into it; the newest value is consumed once per tick before the solvers
/// step.
#[derive(Debug, Default)]
pub struct VoltageSetpointBehavior {
    setpoint: Arc<LatestValue<f64>>,
}

impl VoltageSetpointBehavior {
    /// A behavior with a fresh slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot the host publishes into.
    pub fn setpoint(&self) -> Arc<LatestValue<f64>> {
        Arc::clone(&self.setpoint)
    }
}

impl CellBehavior for VoltageSetpointBehavior {
    fn subscribe(&mut self, cell: CellId, subscribers: &mut dyn SubscriberCollection) {
        let slot = Arc::clone(&self.setpoint);
        subscribers.add_pre(move |_, _, ctx: &mut TickContext<'_>| {
            let Some(potential) = slot.take() else {
                return;
            };
            ctx.with_cell(cell, |target, solvers| {
                let Some(object) = target.objects_mut().get_mut(Domain::Electrical) else {
                    return;
                };
                let circuit = object.realized().and_then(|i| solvers.circuit_mut(i));
                if let Some(source) = object.downcast_mut::<VoltageSourceObject>() {
                    trace!(%cell, potential, "applying voltage setpoint");
                    source.set_potential(potential, circuit);
                }
            });
        });
    }

    fn type_name(&self) -> &'static str {
        "voltage_setpoint"
    }
}

// ── TemperatureReplicatorBehavior ──────────────────────────────────

/// A temperature sample sent to an observer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureUpdate {
    /// Observed cell.
    pub cell: CellId,
    /// Temperature in K.
    pub temperature: f64,
}

/// Streams temperature changes of a cell to an observer.
///
/// Meant to be bound with [`CellGraph::bind_game_object`](crate::CellGraph::bind_game_object)
/// while something outside the simulation watches the cell. A sample is
/// sent every 10 ticks when it differs from the last one sent by at least
/// the threshold; a disconnected receiver is ignored.
#[derive(Debug)]
pub struct TemperatureReplicatorBehavior {
    sender: Sender<TemperatureUpdate>,
    threshold: f64,
    last_sent: Option<f64>,
}

impl TemperatureReplicatorBehavior {
    /// Send changes of at least `threshold` K over `sender`.
    pub fn new(sender: Sender<TemperatureUpdate>, threshold: f64) -> Self {
        Self {
            sender,
            threshold: threshold.max(0.0),
            last_sent: None,
        }
    }

    fn sample(&mut self, cell: CellId, temperature: f64) {
        let changed = self
            .last_sent
            .is_none_or(|last| (temperature - last).abs() >= self.threshold);
        if changed {
            self.last_sent = Some(temperature);
            let _ = self.sender.try_send(TemperatureUpdate { cell, temperature });
        }
    }
}

impl CellBehavior for TemperatureReplicatorBehavior {
    fn subscribe(&mut self, cell: CellId, subscribers: &mut dyn SubscriberCollection) {
        subscribers.add_post10(move |_, _, ctx: &mut TickContext<'_>| {
            ctx.with_cell(cell, |c, solvers| {
                let Some(temperature) = c.objects().temperature(solvers) else {
                    return;
                };
                if let Some(replicator) = c
                    .replicators_mut()
                    .get_mut::<TemperatureReplicatorBehavior>()
                {
                    replicator.sample(cell, temperature);
                }
            });
        });
    }

    fn destroy(&mut self) {
        self.last_sent = None;
    }

    fn type_name(&self) -> &'static str {
        "temperature_replicator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explosion_score_rises_and_fires_once() {
        let mut b = TemperatureExplosionBehavior::new(500.0, 1.0);
        assert!(!b.advance(600.0, 0.5));
        assert!((b.score() - 0.5).abs() < 1e-12);
        assert!(b.advance(600.0, 0.5));
        assert!(b.has_exploded());
        assert!(!b.advance(600.0, 0.5));
    }

    #[test]
    fn explosion_score_decays_when_cool() {
        let mut b = TemperatureExplosionBehavior::new(500.0, 1.0).with_decrease(0.25);
        b.advance(600.0, 0.8);
        b.advance(300.0, 1.0);
        assert!((b.score() - 0.55).abs() < 1e-12);
        b.advance(300.0, 10.0);
        assert_eq!(b.score(), 0.0);
    }

    #[test]
    fn replicator_sends_only_significant_changes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut r = TemperatureReplicatorBehavior::new(tx, 1.0);
        let cell = CellId::next();
        r.sample(cell, 300.0);
        r.sample(cell, 300.5);
        r.sample(cell, 301.2);
        let got: Vec<f64> = rx.try_iter().map(|u| u.temperature).collect();
        assert_eq!(got, vec![300.0, 301.2]);
    }

    #[test]
    fn replicator_ignores_disconnected_receiver() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        let mut r = TemperatureReplicatorBehavior::new(tx, 0.0);
        r.sample(CellId::next(), 1.0);
    }

    #[test]
    fn setpoint_slot_is_shared() {
        let b = VoltageSetpointBehavior::new();
        b.setpoint().publish(5.0);
        assert!(b.setpoint.is_pending());
    }
}
