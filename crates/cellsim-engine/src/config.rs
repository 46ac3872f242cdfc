//! Simulation configuration and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ── SimulationConfig ───────────────────────────────────────────────

/// Settings shared by every graph of one [`CellGraphManager`](crate::CellGraphManager).
///
/// Hosts typically embed this in their own configuration file; every field
/// has a default so partial documents deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed tick rate of every graph, in Hz. Each tick advances the
    /// solvers by `1 / tick_rate_hz` seconds.
    pub tick_rate_hz: f64,
    /// Worker threads running graph ticks. `None` = auto-detect.
    pub worker_threads: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 100.0,
            worker_threads: None,
        }
    }
}

impl SimulationConfig {
    /// Check the configuration for values the scheduler cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidTickRate {
                value: self.tick_rate_hz,
            });
        }
        if self.tick_rate_hz > 10_000.0 {
            return Err(ConfigError::TickRateTooHigh {
                value: self.tick_rate_hz,
            });
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Simulated seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    /// Wall-clock period between ticks.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.dt())
    }

    /// Resolve the worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_threads {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                (cpus / 2).clamp(2, 16)
            }
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SimulationConfig::validate()`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// tick_rate_hz is NaN, infinite, zero, or negative.
    #[error("tick rate must be finite and positive, got {value}")]
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// tick_rate_hz exceeds what a millisecond-resolution timer can honour.
    #[error("tick rate {value} Hz exceeds the 10 kHz limit")]
    TickRateTooHigh {
        /// The configured value.
        value: f64,
    },
    /// An explicit worker count of zero.
    #[error("worker_threads must be at least 1")]
    NoWorkers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_at_100_hz() {
        let cfg = SimulationConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.dt() - 0.01).abs() < 1e-12);
        assert_eq!(cfg.tick_period(), Duration::from_millis(10));
    }

    #[test]
    fn rejects_bad_tick_rates() {
        for value in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let cfg = SimulationConfig {
                tick_rate_hz: value,
                ..SimulationConfig::default()
            };
            assert!(
                matches!(cfg.validate(), Err(ConfigError::InvalidTickRate { .. })),
                "{value} accepted"
            );
        }
        let cfg = SimulationConfig {
            tick_rate_hz: 50_000.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TickRateTooHigh { .. })
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        let cfg = SimulationConfig {
            worker_threads: Some(0),
            ..SimulationConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn worker_count_clamps() {
        let cfg = SimulationConfig {
            worker_threads: Some(200),
            ..SimulationConfig::default()
        };
        assert_eq!(cfg.resolved_worker_count(), 64);
        let auto = SimulationConfig::default().resolved_worker_count();
        assert!((2..=16).contains(&auto), "auto count {auto} out of [2,16]");
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: SimulationConfig = serde_json::from_str(r#"{ "tick_rate_hz": 20.0 }"#).unwrap();
        assert_eq!(cfg.tick_rate_hz, 20.0);
        assert_eq!(cfg.worker_threads, None);
    }
}
