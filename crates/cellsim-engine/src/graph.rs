//! A connected cell graph and its tick.
//!
//! A [`CellGraph`] owns its member cells, the solvers realized from them
//! and a subscriber pool. Each graph has one fixed-rate task on the shared
//! [`SimulationScheduler`](crate::SimulationScheduler); a tick holds the
//! graph lock for its whole duration, and [`CellGraph::stop`] blocks on
//! that lock, so once `stop` returns no tick is in flight.
//!
//! Membership and solver changes require the graph stopped and the caller
//! on the manager's control thread. Violations are caller bugs and panic.

use crate::behavior::CellBehavior;
use crate::cell::Cell;
use crate::error::CellError;
use crate::manager::ControlTask;
use crate::metrics::TickMetrics;
use crate::scheduler::{SchedulerHandle, TaskHandle};
use crate::solvers::{BuildReport, Solvers, StatusChange};
use crate::subscriber::{
    Subscriber, SubscriberCollection, SubscriberOptions, SubscriberPhase, SubscriberPool,
};
use crate::TickContext;
use cellsim_core::{CellId, Domain, GraphId, Locator, SubscriberId};
use crossbeam_channel::Sender;
use indexmap::IndexMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Where a tick was when it panicked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickStage {
    /// Before any subscriber ran.
    Start,
    /// Dispatching Pre subscribers.
    SubscribersPre,
    /// Stepping circuits.
    ElectricalSims,
    /// Stepping thermal networks.
    ThermalSims,
    /// Stepping diffusion volumes.
    DiffusionSims,
    /// Dispatching Post subscribers.
    SubscribersPost,
}

impl TickStage {
    fn solving(domain: Domain) -> Self {
        match domain {
            Domain::Electrical => TickStage::ElectricalSims,
            Domain::Thermal => TickStage::ThermalSims,
            Domain::Diffusion => TickStage::DiffusionSims,
        }
    }
}

// ── GraphState ─────────────────────────────────────────────────────

/// Everything the graph lock protects.
#[derive(Default)]
pub(crate) struct GraphState {
    pub(crate) cells: IndexMap<CellId, Cell>,
    pub(crate) by_locator: IndexMap<Locator, CellId>,
    pub(crate) solvers: Solvers,
    pub(crate) subscribers: SubscriberPool,
    pub(crate) last_report: BuildReport,
    pub(crate) last_metrics: TickMetrics,
}

impl GraphState {
    /// Sync evolving primitive state of every member back into its objects.
    pub(crate) fn capture_all(&mut self) {
        for cell in self.cells.values_mut() {
            cell.objects_mut().capture(&self.solvers);
        }
    }

    /// Capture, clear and detach one member so it can leave the graph.
    fn release(&mut self, mut cell: Cell) -> Cell {
        cell.objects_mut().capture(&self.solvers);
        cell.objects_mut().clear();
        cell.detach_subscribers(&mut self.subscribers);
        cell.set_graph(None);
        cell
    }
}

struct GraphShared {
    id: GraphId,
    dt: f64,
    state: Mutex<GraphState>,
    running: AtomicBool,
    updates: AtomicU64,
    last_tick_nanos: AtomicU64,
    had_failure: AtomicBool,
    control: Sender<ControlTask>,
}

impl GraphShared {
    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scheduled entry point: ticks only while the graph is running.
    fn scheduled_tick(&self) {
        let mut state = self.lock();
        if self.running.load(Ordering::Acquire) {
            self.tick_locked(&mut state);
        }
    }

    fn tick_locked(&self, state: &mut GraphState) {
        let started = Instant::now();
        let mut stage = TickStage::Start;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run_tick(state, &mut stage)));
        match outcome {
            Ok(metrics) => {
                let failed = metrics.failed_solvers > 0;
                self.had_failure.store(failed, Ordering::Release);
                state.last_metrics = metrics;
            }
            Err(_) => {
                error!(graph = %self.id, stage = ?stage, "tick panicked; abandoning");
                self.had_failure.store(true, Ordering::Release);
            }
        }
        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_tick_nanos.store(elapsed, Ordering::Release);
        self.updates.fetch_add(1, Ordering::AcqRel);
    }

    fn run_tick(&self, state: &mut GraphState, stage: &mut TickStage) -> TickMetrics {
        let tick_start = Instant::now();
        let GraphState {
            cells,
            solvers,
            subscribers,
            ..
        } = state;

        *stage = TickStage::SubscribersPre;
        let pre_start = Instant::now();
        {
            let mut ctx = TickContext::new(self.id, self.dt, cells, solvers, &self.control);
            subscribers.update(SubscriberPhase::Pre, &mut ctx);
        }
        let pre_us = pre_start.elapsed().as_micros() as u64;

        let mut solve_us = Vec::with_capacity(Domain::ALL.len());
        for domain in Domain::ALL {
            *stage = TickStage::solving(domain);
            let solve_start = Instant::now();
            for change in solvers.step(domain, self.dt) {
                self.log_status_change(change);
            }
            solve_us.push((domain, solve_start.elapsed().as_micros() as u64));
        }

        *stage = TickStage::SubscribersPost;
        let post_start = Instant::now();
        {
            let mut ctx = TickContext::new(self.id, self.dt, cells, solvers, &self.control);
            subscribers.update(SubscriberPhase::Post, &mut ctx);
        }
        let post_us = post_start.elapsed().as_micros() as u64;

        TickMetrics {
            total_us: tick_start.elapsed().as_micros() as u64,
            pre_us,
            solve_us,
            post_us,
            failed_solvers: solvers.failed_count() as u32,
            subscribers: subscribers.subscriber_count(),
        }
    }

    fn log_status_change(&self, change: StatusChange) {
        if change.to.is_ok() {
            info!(
                graph = %self.id,
                domain = %change.domain,
                index = change.index,
                "solver recovered"
            );
        } else {
            error!(
                graph = %self.id,
                domain = %change.domain,
                index = change.index,
                status = %change.to,
                "solver failed"
            );
        }
    }
}

// ── CellGraph ──────────────────────────────────────────────────────

/// A maximal set of connected cells, simulated together.
pub struct CellGraph {
    shared: Arc<GraphShared>,
    scheduler: SchedulerHandle,
    task: Option<TaskHandle>,
    period: Duration,
    control_thread: ThreadId,
    sampled_updates: u64,
}

impl CellGraph {
    pub(crate) fn new(
        id: GraphId,
        period: Duration,
        dt: f64,
        scheduler: SchedulerHandle,
        control: Sender<ControlTask>,
        control_thread: ThreadId,
    ) -> Self {
        Self {
            shared: Arc::new(GraphShared {
                id,
                dt,
                state: Mutex::new(GraphState::default()),
                running: AtomicBool::new(false),
                updates: AtomicU64::new(0),
                last_tick_nanos: AtomicU64::new(0),
                had_failure: AtomicBool::new(false),
                control,
            }),
            scheduler,
            task: None,
            period,
            control_thread,
            sampled_updates: 0,
        }
    }

    /// Graph id.
    pub fn id(&self) -> GraphId {
        self.shared.id
    }

    /// Simulated seconds per tick.
    pub fn tick_dt(&self) -> f64 {
        self.shared.dt
    }

    /// Whether the periodic tick is scheduled.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of member cells.
    pub fn len(&self) -> usize {
        self.shared.lock().cells.len()
    }

    /// Whether the graph has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Membership ─────────────────────────────────────────────────

    /// Add a cell. Its edges are not touched.
    ///
    /// # Panics
    ///
    /// Panics if the graph is running, the caller is not on the control
    /// thread, or a member already occupies the cell's locator.
    pub fn add_cell(&mut self, mut cell: Cell) {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        let id = cell.id();
        let locator = cell.locator().clone();
        if let Some(existing) = state.by_locator.get(&locator) {
            panic!("locator {locator} already occupied by {existing} in graph {}", self.shared.id);
        }
        cell.set_graph(Some(self.shared.id));
        state.by_locator.insert(locator, id);
        state.cells.insert(id, cell);
    }

    /// Remove a member, capturing its solver state first. Its edges are not
    /// touched.
    ///
    /// # Panics
    ///
    /// Panics if the graph is running or the caller is not on the control
    /// thread.
    pub fn remove_cell(&mut self, id: CellId) -> Option<Cell> {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        let cell = state.cells.shift_remove(&id)?;
        state.by_locator.shift_remove(cell.locator());
        Some(state.release(cell))
    }

    /// Remove every member, in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the graph is running or the caller is not on the control
    /// thread.
    pub fn take_cells(&mut self) -> Vec<Cell> {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        state.by_locator.clear();
        let cells = std::mem::take(&mut state.cells);
        let released = cells
            .into_values()
            .map(|cell| state.release(cell))
            .collect();
        state.solvers = Solvers::default();
        released
    }

    /// Rebuild every solver from the members' current connections.
    ///
    /// # Panics
    ///
    /// Panics if the graph is running or the caller is not on the control
    /// thread.
    pub fn build_solver(&mut self) -> BuildReport {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        state.capture_all();
        let (solvers, report) = Solvers::rebuild(&mut state.cells);
        state.solvers = solvers;
        debug!(
            graph = %self.shared.id,
            cells = state.cells.len(),
            circuits = report.subset_count(Domain::Electrical),
            thermal = report.subset_count(Domain::Thermal),
            diffusion = report.subset_count(Domain::Diffusion),
            "solvers rebuilt"
        );
        let worst = report.worst();
        if !worst.is_ok() {
            warn!(graph = %self.shared.id, status = %worst, "solver build reported problems");
        }
        state.last_report = report.clone();
        report
    }

    // ── Ticking ────────────────────────────────────────────────────

    /// Run one tick on the calling thread, whether or not the graph is
    /// scheduled.
    pub fn tick(&self) {
        let mut state = self.shared.lock();
        self.shared.tick_locked(&mut state);
    }

    /// Schedule the periodic tick. No-op while running.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not on the control thread.
    pub fn start(&mut self) {
        self.validate_thread();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let task = self
            .scheduler
            .schedule_fixed_rate(self.period, Arc::new(move || shared.scheduled_tick()));
        self.task = Some(task);
        debug!(graph = %self.shared.id, "graph started");
    }

    /// Cancel the periodic tick and wait for an in-flight tick to finish.
    /// No-op while stopped.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not on the control thread.
    pub fn stop(&mut self) {
        self.validate_thread();
        self.halt();
    }

    /// [`stop`](Self::stop) without the thread check, for teardown.
    pub(crate) fn halt(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        drop(self.shared.lock());
        debug!(graph = %self.shared.id, "graph stopped");
    }

    /// Run `action` with the graph stopped, then restore the previous
    /// running state. Nests.
    pub fn run_suspended<R>(&mut self, action: impl FnOnce(&mut CellGraph) -> R) -> R {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        let result = action(self);
        if was_running {
            self.start();
        }
        result
    }

    // ── Statistics ─────────────────────────────────────────────────

    /// Ticks completed since the previous call.
    pub fn sample_elapsed_updates(&mut self) -> u64 {
        let now = self.shared.updates.load(Ordering::Acquire);
        let elapsed = now.saturating_sub(self.sampled_updates);
        self.sampled_updates = now;
        elapsed
    }

    /// Total ticks completed.
    pub fn update_count(&self) -> u64 {
        self.shared.updates.load(Ordering::Acquire)
    }

    /// Wall-clock duration of the latest tick.
    pub fn last_tick_time(&self) -> Duration {
        Duration::from_nanos(self.shared.last_tick_nanos.load(Ordering::Acquire))
    }

    /// Metrics of the latest completed tick.
    pub fn last_metrics(&self) -> TickMetrics {
        self.shared.lock().last_metrics.clone()
    }

    /// Whether the latest tick left a solver failed or panicked.
    pub fn had_failure(&self) -> bool {
        self.shared.had_failure.load(Ordering::Acquire)
    }

    /// Report of the latest solver build.
    pub fn last_report(&self) -> BuildReport {
        self.shared.lock().last_report.clone()
    }

    /// Member sets of the realized solvers of `domain`.
    pub fn partition(&self, domain: Domain) -> Vec<Vec<CellId>> {
        self.shared.lock().solvers.partition(domain)
    }

    // ── Cell access ────────────────────────────────────────────────

    /// Run `f` with a member cell and the realized solvers.
    pub fn with_cell<R>(&self, id: CellId, f: impl FnOnce(&Cell, &Solvers) -> R) -> Option<R> {
        let state = self.shared.lock();
        let cell = state.cells.get(&id)?;
        Some(f(cell, &state.solvers))
    }

    /// Run `f` with a mutable member cell and the realized solvers.
    ///
    /// # Panics
    ///
    /// Panics if the graph is running or the caller is not on the control
    /// thread.
    pub fn with_cell_mut<R>(
        &mut self,
        id: CellId,
        f: impl FnOnce(&mut Cell, &mut Solvers) -> R,
    ) -> Option<R> {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        let GraphState { cells, solvers, .. } = &mut *state;
        let cell = cells.get_mut(&id)?;
        Some(f(cell, solvers))
    }

    /// Ids of every member, in insertion order.
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.shared.lock().cells.keys().copied().collect()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: CellId) -> bool {
        self.shared.lock().cells.contains_key(&id)
    }

    /// The member at `locator`.
    pub fn cell_by_locator(&self, locator: &Locator) -> Option<CellId> {
        self.shared.lock().by_locator.get(locator).copied()
    }

    // ── Subscribers and game objects ───────────────────────────────

    /// Register a subscriber with the graph's pool. Blocks while a tick is
    /// in flight.
    pub fn add_subscriber(
        &self,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriberId {
        self.shared.lock().subscribers.add_subscriber(options, subscriber)
    }

    /// Remove a subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.shared.lock().subscribers.remove_subscriber(id);
    }

    /// Bind replicators of an observing game object to a member cell.
    /// Returns `Ok(false)` when `id` is not a member.
    pub fn bind_game_object(
        &self,
        id: CellId,
        replicators: Vec<Box<dyn CellBehavior>>,
    ) -> Result<bool, CellError> {
        let mut state = self.shared.lock();
        let GraphState {
            cells, subscribers, ..
        } = &mut *state;
        let Some(cell) = cells.get_mut(&id) else {
            return Ok(false);
        };
        cell.bind_game_object(replicators, Some(subscribers))?;
        Ok(true)
    }

    /// Detach and destroy the replicators bound to a member cell.
    pub fn unbind_game_object(&self, id: CellId) -> bool {
        let mut state = self.shared.lock();
        let GraphState {
            cells, subscribers, ..
        } = &mut *state;
        match cells.get_mut(&id) {
            Some(cell) => {
                cell.unbind_game_object(Some(subscribers));
                true
            }
            None => false,
        }
    }

    // ── Crate-internal ─────────────────────────────────────────────

    /// Run `f` on the locked state of a stopped graph.
    pub(crate) fn with_state<R>(&mut self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        self.validate_mutation_access();
        let mut state = self.shared.lock();
        f(&mut state)
    }

    /// Run `f` on a member without the stopped check. Used for host hooks
    /// that fire after the graph has been restarted.
    pub(crate) fn with_cell_locked<R>(&self, id: CellId, f: impl FnOnce(&mut Cell) -> R) -> Option<R> {
        let mut state = self.shared.lock();
        state.cells.get_mut(&id).map(f)
    }

    /// Apply a topology change to a member.
    pub(crate) fn update_cell(&mut self, id: CellId, connections_changed: bool, graph_changed: bool) {
        self.with_state(|state| {
            let GraphState {
                cells, subscribers, ..
            } = state;
            if let Some(cell) = cells.get_mut(&id) {
                cell.update(connections_changed, graph_changed, subscribers);
            }
        });
    }

    fn validate_thread(&self) {
        let current = thread::current().id();
        assert!(
            current == self.control_thread,
            "graph {} accessed off the control thread ({current:?})",
            self.shared.id
        );
    }

    fn validate_mutation_access(&self) {
        self.validate_thread();
        assert!(
            !self.is_running(),
            "graph {} mutated while running; stop it or use run_suspended",
            self.shared.id
        );
    }
}

impl Drop for CellGraph {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}

impl std::fmt::Debug for CellGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellGraph")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .field("updates", &self.update_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellBuilder;
    use crate::object::SimulationObject;
    use crate::objects::ThermalMassObject;
    use crate::scheduler::SimulationScheduler;
    use crate::subscriber::SubscriberCollectionExt;
    use cellsim_core::BlockPos;
    use std::sync::atomic::AtomicUsize;

    fn graph(scheduler: &SimulationScheduler) -> CellGraph {
        let (tx, _rx) = crossbeam_channel::unbounded();
        CellGraph::new(
            GraphId::new_random(),
            Duration::from_millis(1),
            0.01,
            scheduler.handle(),
            tx,
            thread::current().id(),
        )
    }

    fn mass(x: i32, t: f64) -> Cell {
        CellBuilder::new("mass", Locator::at(BlockPos::new(x, 0, 0)))
            .object(SimulationObject::thermal(ThermalMassObject::new(100.0, t)))
            .build()
            .unwrap()
    }

    #[test]
    fn add_and_remove_members() {
        let scheduler = SimulationScheduler::new(1);
        let mut g = graph(&scheduler);
        let cell = mass(0, 300.0);
        let id = cell.id();
        g.add_cell(cell);
        assert!(g.contains(id));
        assert_eq!(g.cell_by_locator(&Locator::at(BlockPos::new(0, 0, 0))), Some(id));
        let removed = g.remove_cell(id).unwrap();
        assert_eq!(removed.graph(), None);
        assert!(g.is_empty());
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn duplicate_locator_panics() {
        let scheduler = SimulationScheduler::new(1);
        let mut g = graph(&scheduler);
        g.add_cell(mass(0, 300.0));
        g.add_cell(mass(0, 300.0));
    }

    #[test]
    #[should_panic(expected = "mutated while running")]
    fn mutation_while_running_panics() {
        let scheduler = SimulationScheduler::new(1);
        let mut g = graph(&scheduler);
        g.start();
        g.add_cell(mass(0, 300.0));
    }

    #[test]
    fn mutation_off_control_thread_panics() {
        let scheduler = SimulationScheduler::new(1);
        let g = graph(&scheduler);
        let result = thread::scope(|s| {
            s.spawn(move || {
                let mut g = g;
                g.add_cell(mass(0, 300.0));
            })
            .join()
        });
        assert!(result.is_err());
    }

    #[test]
    fn manual_tick_runs_phases_in_order() {
        let scheduler = SimulationScheduler::new(1);
        let mut g = graph(&scheduler);
        let a = mass(0, 400.0);
        let b = mass(1, 200.0);
        let (ida, idb) = (a.id(), b.id());
        g.add_cell(a);
        g.add_cell(b);
        g.with_state(|s| {
            s.cells[&ida].connections_mut().push(idb);
            s.cells[&idb].connections_mut().push(ida);
        });
        let report = g.build_solver();
        assert_eq!(report.subset_count(Domain::Thermal), 1);

        let order = Arc::new(Mutex::new(Vec::new()));
        let (pre, post) = (Arc::clone(&order), Arc::clone(&order));
        g.with_state(|s| {
            s.subscribers.add_post(move |_, _, _: &mut TickContext<'_>| {
                post.lock().unwrap().push("post");
            });
            s.subscribers.add_pre(move |_, _, _: &mut TickContext<'_>| {
                pre.lock().unwrap().push("pre");
            });
        });
        g.tick();
        assert_eq!(*order.lock().unwrap(), vec!["pre", "post"]);
        assert_eq!(g.update_count(), 1);
        assert!(!g.had_failure());
        assert_eq!(g.last_metrics().solve_us.len(), 3);
    }

    #[test]
    fn panicking_subscriber_abandons_the_tick() {
        let scheduler = SimulationScheduler::new(1);
        let g = graph(&scheduler);
        let post_ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&post_ran);
        g.add_subscriber(
            SubscriberOptions::pre(1),
            Box::new(|_: f64, _: SubscriberPhase, _: &mut TickContext<'_>| panic!("bad subscriber")),
        );
        g.add_subscriber(
            SubscriberOptions::post(1),
            Box::new(move |_: f64, _: SubscriberPhase, _: &mut TickContext<'_>| {
                flag.store(true, Ordering::SeqCst);
            }),
        );
        g.tick();
        assert!(g.had_failure());
        assert!(!post_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn scheduled_ticks_stop_on_stop() {
        let scheduler = SimulationScheduler::new(2);
        let mut g = graph(&scheduler);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        g.add_subscriber(
            SubscriberOptions::pre(1),
            Box::new(move |_: f64, _: SubscriberPhase, _: &mut TickContext<'_>| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        g.start();
        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        g.stop();
        let after = hits.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), after);
        assert!(after >= 3);
        assert!(g.sample_elapsed_updates() >= 3);
        assert_eq!(g.sample_elapsed_updates(), 0);
    }

    #[test]
    fn subscribers_come_and_go_through_the_graph() {
        let scheduler = SimulationScheduler::new(1);
        let g = graph(&scheduler);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = g.add_subscriber(
            SubscriberOptions::pre(1),
            Box::new(move |_: f64, _: SubscriberPhase, _: &mut TickContext<'_>| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        g.tick();
        g.remove_subscriber(id);
        g.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(g.update_count(), 2);
    }

    #[test]
    fn run_suspended_restores_running_state() {
        let scheduler = SimulationScheduler::new(1);
        let mut g = graph(&scheduler);
        g.start();
        let inner = g.run_suspended(|g| {
            assert!(!g.is_running());
            g.add_cell(mass(0, 300.0));
            g.run_suspended(|g| g.is_running())
        });
        assert!(!inner);
        assert!(g.is_running());
        g.stop();
        g.run_suspended(|_| ());
        assert!(!g.is_running());
    }
}
