//! The session-scoped owner of every graph.
//!
//! A [`CellGraphManager`] is created on the thread that will drive topology
//! changes (the *control thread*). It owns the shared scheduler, the graph
//! registry, the cell → graph index and the control queue through which
//! tick threads hand work back to the control thread.

use crate::cell::Cell;
use crate::config::{ConfigError, SimulationConfig};
use crate::connections;
use crate::container::CellContainer;
use crate::error::PersistenceError;
use crate::graph::CellGraph;
use crate::persistence::{self, ManagerRecord};
use crate::registry::CellRegistry;
use crate::scheduler::SimulationScheduler;
use cellsim_core::{CellId, GraphId};
use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Work posted to the control thread, run by [`CellGraphManager::pump`].
pub type ControlTask = Box<dyn FnOnce(&mut CellGraphManager) + Send>;

/// Owner of the scheduler, the graphs and the control queue.
pub struct CellGraphManager {
    config: SimulationConfig,
    scheduler: SimulationScheduler,
    graphs: IndexMap<GraphId, CellGraph>,
    cell_index: IndexMap<CellId, GraphId>,
    control_tx: Sender<ControlTask>,
    control_rx: Receiver<ControlTask>,
    control_thread: ThreadId,
    dirty: bool,
    last_sample: Instant,
}

impl CellGraphManager {
    /// Validate `config` and start the scheduler. The calling thread
    /// becomes the control thread.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = SimulationScheduler::new(config.resolved_worker_count());
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        info!(
            tick_rate_hz = config.tick_rate_hz,
            workers = scheduler.worker_count(),
            "cell graph manager started"
        );
        Ok(Self {
            config,
            scheduler,
            graphs: IndexMap::new(),
            cell_index: IndexMap::new(),
            control_tx,
            control_rx,
            control_thread: thread::current().id(),
            dirty: false,
            last_sample: Instant::now(),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Whether the caller is on the control thread.
    pub fn is_control_thread(&self) -> bool {
        thread::current().id() == self.control_thread
    }

    // ── Graph registry ─────────────────────────────────────────────

    /// An empty, unregistered graph bound to this manager's scheduler.
    pub fn new_graph(&self, id: GraphId) -> CellGraph {
        CellGraph::new(
            id,
            self.config.tick_period(),
            self.config.dt(),
            self.scheduler.handle(),
            self.control_tx.clone(),
            self.control_thread,
        )
    }

    /// Register an empty graph with a fresh id.
    pub fn create_graph(&mut self) -> GraphId {
        let id = GraphId::new_random();
        self.add_graph(self.new_graph(id));
        id
    }

    /// Register `graph` and index its members.
    ///
    /// # Panics
    ///
    /// Panics if a graph with the same id is registered.
    pub fn add_graph(&mut self, graph: CellGraph) {
        let id = graph.id();
        assert!(!self.graphs.contains_key(&id), "graph {id} registered twice");
        for cell in graph.cell_ids() {
            self.cell_index.insert(cell, id);
        }
        self.graphs.insert(id, graph);
        debug!(graph = %id, "graph registered");
    }

    /// Stop and unregister a graph. Its members stay inside it but leave
    /// the cell index.
    pub fn remove_graph(&mut self, id: GraphId) -> Option<CellGraph> {
        let mut graph = self.graphs.shift_remove(&id)?;
        graph.stop();
        self.cell_index.retain(|_, owner| *owner != id);
        debug!(graph = %id, "graph unregistered");
        Some(graph)
    }

    /// A registered graph.
    pub fn graph(&self, id: GraphId) -> Option<&CellGraph> {
        self.graphs.get(&id)
    }

    /// A registered graph, mutably.
    pub fn graph_mut(&mut self, id: GraphId) -> Option<&mut CellGraph> {
        self.graphs.get_mut(&id)
    }

    /// Graph owning `cell`.
    pub fn graph_of(&self, cell: CellId) -> Option<GraphId> {
        self.cell_index.get(&cell).copied()
    }

    /// Whether `cell` is placed in some graph.
    pub fn contains(&self, cell: CellId) -> bool {
        self.cell_index.contains_key(&cell)
    }

    /// Ids of every registered graph, in registration order.
    pub fn graph_ids(&self) -> Vec<GraphId> {
        self.graphs.keys().copied().collect()
    }

    /// Number of registered graphs.
    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Number of placed cells.
    pub fn cell_count(&self) -> usize {
        self.cell_index.len()
    }

    pub(crate) fn graph_entry(&mut self, id: GraphId) -> &mut CellGraph {
        match self.graphs.get_mut(&id) {
            Some(graph) => graph,
            None => panic!("graph {id} is not registered"),
        }
    }

    pub(crate) fn index_cell(&mut self, cell: CellId, graph: GraphId) {
        self.cell_index.insert(cell, graph);
    }

    pub(crate) fn unindex_cell(&mut self, cell: CellId) {
        self.cell_index.shift_remove(&cell);
    }

    // ── Topology ───────────────────────────────────────────────────

    /// Place `cell` in `container`'s world, connecting it to accepting
    /// neighbours. See [`connections::insert`].
    pub fn insert_cell(&mut self, container: Arc<dyn CellContainer>, cell: Cell) -> CellId {
        connections::insert(self, container, cell)
    }

    /// Remove a placed cell. See [`connections::remove`].
    pub fn remove_cell(&mut self, cell: CellId) -> Option<Cell> {
        connections::remove(self, cell)
    }

    /// Disconnect, modify and reconnect a placed cell. See
    /// [`connections::retopologize`].
    pub fn retopologize(&mut self, cell: CellId, action: impl FnOnce(&mut Cell)) -> bool {
        connections::retopologize(self, cell, action)
    }

    /// Run `f` with a placed cell.
    pub fn with_cell<R>(&self, cell: CellId, f: impl FnOnce(&Cell) -> R) -> Option<R> {
        let graph = self.graphs.get(&self.graph_of(cell)?)?;
        graph.with_cell(cell, |cell, _| f(cell))
    }

    /// Whether the topology changed since the last save or load.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // ── Scheduling ─────────────────────────────────────────────────

    /// Stop `graphs`, run `action`, then restart those that were running
    /// and still exist.
    pub fn run_suspended_many<R>(
        &mut self,
        graphs: &[GraphId],
        action: impl FnOnce(&mut CellGraphManager) -> R,
    ) -> R {
        let mut resume = Vec::new();
        for id in graphs {
            if let Some(graph) = self.graphs.get_mut(id) {
                if graph.is_running() {
                    graph.stop();
                    resume.push(*id);
                }
            }
        }
        let result = action(self);
        for id in resume {
            if let Some(graph) = self.graphs.get_mut(&id) {
                graph.start();
            }
        }
        result
    }

    /// Average ticks per second per graph since the previous call.
    pub fn sample_tick_rate(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sample).as_secs_f64();
        self.last_sample = now;
        let updates: u64 = self
            .graphs
            .values_mut()
            .map(CellGraph::sample_elapsed_updates)
            .sum();
        if self.graphs.is_empty() || elapsed <= 0.0 {
            return 0.0;
        }
        updates as f64 / elapsed / self.graphs.len() as f64
    }

    /// Sum of the latest tick durations of every graph.
    pub fn total_spent_time(&self) -> Duration {
        self.graphs.values().map(CellGraph::last_tick_time).sum()
    }

    /// A sender for posting work to the control thread.
    pub fn control_sender(&self) -> Sender<ControlTask> {
        self.control_tx.clone()
    }

    /// Run every queued control task. Tasks posted while pumping run in
    /// the same call. Returns the number of tasks run.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not on the control thread.
    pub fn pump(&mut self) -> usize {
        assert!(self.is_control_thread(), "pump called off the control thread");
        let mut ran = 0;
        while let Ok(task) = self.control_rx.try_recv() {
            task(self);
            ran += 1;
        }
        ran
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Snapshot every graph. Each graph is suspended while its solver
    /// state is captured.
    pub fn save(&mut self) -> ManagerRecord {
        let ids = self.graph_ids();
        let mut graphs = Vec::with_capacity(ids.len());
        for id in ids {
            let graph = self.graph_entry(id);
            graphs.push(graph.run_suspended(persistence::save_graph));
        }
        self.dirty = false;
        info!(graphs = graphs.len(), "world saved");
        ManagerRecord { graphs }
    }

    /// Restore the graphs of `record`, constructing cells through
    /// `registry` and placing them in `container`. Returns the ids of the
    /// restored graphs. Nothing is registered when an error is returned.
    pub fn load(
        &mut self,
        record: ManagerRecord,
        registry: &CellRegistry,
        container: Arc<dyn CellContainer>,
    ) -> Result<Vec<GraphId>, PersistenceError> {
        let loaded = persistence::load(self, record, registry, container)?;
        self.dirty = false;
        Ok(loaded)
    }

    /// Stop every graph, drop them and join the scheduler threads.
    pub fn shutdown(&mut self) {
        for graph in self.graphs.values_mut() {
            graph.halt();
        }
        self.graphs.clear();
        self.cell_index.clear();
        self.scheduler.shutdown();
    }
}

impl Drop for CellGraphManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CellGraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellGraphManager")
            .field("graphs", &self.graphs.len())
            .field("cells", &self.cell_index.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> CellGraphManager {
        CellGraphManager::new(SimulationConfig {
            worker_threads: Some(1),
            ..SimulationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = CellGraphManager::new(SimulationConfig {
            tick_rate_hz: 0.0,
            ..SimulationConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTickRate { .. }));
    }

    #[test]
    fn graph_registry() {
        let mut m = manager();
        let id = m.create_graph();
        assert_eq!(m.graph_count(), 1);
        assert!(m.graph(id).is_some());
        let graph = m.remove_graph(id).unwrap();
        assert_eq!(graph.id(), id);
        assert_eq!(m.graph_count(), 0);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_graph_panics() {
        let mut m = manager();
        let id = m.create_graph();
        let twin = m.new_graph(id);
        m.add_graph(twin);
    }

    #[test]
    fn pump_runs_tasks_posted_from_other_threads() {
        let mut m = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let tx = m.control_sender();
        let h = Arc::clone(&hits);
        thread::spawn(move || {
            let task: ControlTask = Box::new(move |m: &mut CellGraphManager| {
                h.fetch_add(1, Ordering::SeqCst);
                let h2 = Arc::clone(&h);
                let _ = m.control_sender().send(Box::new(move |_: &mut CellGraphManager| {
                    h2.fetch_add(1, Ordering::SeqCst);
                }));
            });
            tx.send(task).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(m.pump(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_suspended_many_restores_running_graphs() {
        let mut m = manager();
        let running = m.create_graph();
        let idle = m.create_graph();
        m.graph_mut(running).unwrap().start();
        m.run_suspended_many(&[running, idle], |m| {
            assert!(!m.graph(running).unwrap().is_running());
        });
        assert!(m.graph(running).unwrap().is_running());
        assert!(!m.graph(idle).unwrap().is_running());
    }

    #[test]
    fn tick_rate_of_an_empty_world_is_zero() {
        let mut m = manager();
        assert_eq!(m.sample_tick_rate(), 0.0);
        assert_eq!(m.total_spent_time(), Duration::ZERO);
    }
}
