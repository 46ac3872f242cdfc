//! Per-tick performance metrics for cell graphs.
//!
//! [`TickMetrics`] captures timing for a single graph tick, enabling
//! telemetry and tick-rate sampling by the host.

use cellsim_core::Domain;

/// Timing collected during a single tick of one graph.
///
/// All durations are in microseconds. The graph replaces these after each
/// completed tick; an abandoned tick leaves the previous values in place.
#[derive(Clone, Debug, Default)]
pub struct TickMetrics {
    /// Wall-clock time for the entire tick, in microseconds.
    pub total_us: u64,
    /// Time spent dispatching Pre subscribers, in microseconds.
    pub pre_us: u64,
    /// Per-domain solver stepping times: `(domain, microseconds)`.
    pub solve_us: Vec<(Domain, u64)>,
    /// Time spent dispatching Post subscribers, in microseconds.
    pub post_us: u64,
    /// Solvers that did not report `Ok` this tick.
    pub failed_solvers: u32,
    /// Registered subscribers at the end of the tick.
    pub subscribers: usize,
}
