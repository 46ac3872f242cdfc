//! Simulation domains and solver outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category of physics a cell may participate in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    /// Lumped electrical circuits.
    Electrical,
    /// Lumped thermal networks.
    Thermal,
    /// Voxelized mass diffusion.
    Diffusion,
}

impl Domain {
    /// Every domain, in the order solvers are built and stepped.
    pub const ALL: [Domain; 3] = [Domain::Electrical, Domain::Thermal, Domain::Diffusion];

    /// Lower-case name used in logs and persisted records.
    pub fn name(self) -> &'static str {
        match self {
            Domain::Electrical => "electrical",
            Domain::Thermal => "thermal",
            Domain::Diffusion => "diffusion",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of building or stepping a solver instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolveStatus {
    /// The solver produced a valid state.
    #[default]
    Ok,
    /// The numeric kernel failed (singular system, non-finite values).
    NumericFailure,
    /// The network lacks a reference (e.g. a floating circuit with no
    /// source to ground). It still runs but its results are relative.
    Unconstrained,
    /// The subset is not a valid configuration (e.g. an open diffusion
    /// hull). The solver is not realized.
    ConfigurationError,
}

impl SolveStatus {
    /// Whether this status reports success.
    pub fn is_ok(self) -> bool {
        self == SolveStatus::Ok
    }

    /// Combine two statuses, keeping the most severe.
    pub fn worst(self, other: SolveStatus) -> SolveStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    fn severity(self) -> u8 {
        match self {
            SolveStatus::Ok => 0,
            SolveStatus::Unconstrained => 1,
            SolveStatus::NumericFailure => 2,
            SolveStatus::ConfigurationError => 3,
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Ok => "ok",
            SolveStatus::NumericFailure => "numeric failure",
            SolveStatus::Unconstrained => "unconstrained",
            SolveStatus::ConfigurationError => "configuration error",
        };
        f.write_str(s)
    }
}
