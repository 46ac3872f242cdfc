//! State handed to subscribers while a graph ticks.

use crate::cell::Cell;
use crate::manager::{CellGraphManager, ControlTask};
use crate::solvers::Solvers;
use crate::subscriber::{PendingChange, Subscriber, SubscriberOptions};
use cellsim_core::{CellId, GraphId, SubscriberId};
use crossbeam_channel::Sender;
use indexmap::IndexMap;
use tracing::warn;

/// Mutable view of one graph during a tick.
///
/// Gives callbacks access to the graph's cells and realized solvers, and
/// queues subscriber changes until the running phase has dispatched.
/// Work that needs the manager (such as removing a cell) is posted to the
/// control thread with [`post_control`](Self::post_control).
pub struct TickContext<'a> {
    graph: GraphId,
    dt: f64,
    cells: &'a mut IndexMap<CellId, Cell>,
    solvers: &'a mut Solvers,
    control: &'a Sender<ControlTask>,
    pending: Vec<PendingChange>,
    current: Option<SubscriberId>,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(
        graph: GraphId,
        dt: f64,
        cells: &'a mut IndexMap<CellId, Cell>,
        solvers: &'a mut Solvers,
        control: &'a Sender<ControlTask>,
    ) -> Self {
        Self {
            graph,
            dt,
            cells,
            solvers,
            control,
            pending: Vec::new(),
            current: None,
        }
    }

    /// The graph being ticked.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Simulated seconds per tick.
    pub fn tick_dt(&self) -> f64 {
        self.dt
    }

    /// The subscriber currently being invoked.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.current
    }

    /// A member cell.
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// Ids of every member cell.
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.keys().copied().collect()
    }

    /// The graph's realized solvers.
    pub fn solvers(&self) -> &Solvers {
        &*self.solvers
    }

    /// Run `f` with a member cell and the realized solvers.
    pub fn with_cell<R>(
        &mut self,
        id: CellId,
        f: impl FnOnce(&mut Cell, &mut Solvers) -> R,
    ) -> Option<R> {
        let cell = self.cells.get_mut(&id)?;
        Some(f(cell, self.solvers))
    }

    /// Queue a subscriber for registration after the current phase.
    pub fn add_subscriber(
        &mut self,
        options: SubscriberOptions,
        subscriber: Box<dyn Subscriber>,
    ) -> SubscriberId {
        let id = SubscriberId::next();
        self.pending
            .push(PendingChange::Add(id, options, subscriber));
        id
    }

    /// Queue a subscriber for removal after the current phase.
    pub fn remove_subscriber(&mut self, id: SubscriberId) {
        self.pending.push(PendingChange::Remove(id));
    }

    /// Queue removal of the subscriber currently being invoked.
    pub fn remove_self(&mut self) {
        if let Some(id) = self.current {
            self.remove_subscriber(id);
        }
    }

    /// Run `task` on the control thread at its next
    /// [`CellGraphManager::pump`].
    pub fn post_control(&self, task: impl FnOnce(&mut CellGraphManager) + Send + 'static) {
        if self.control.send(Box::new(task)).is_err() {
            warn!(graph = %self.graph, "control queue closed; dropping task");
        }
    }

    /// Ask the control thread to remove `cell` from the world.
    pub fn request_removal(&self, cell: CellId) {
        self.post_control(move |manager| {
            manager.remove_cell(cell);
        });
    }

    pub(crate) fn set_current(&mut self, id: Option<SubscriberId>) {
        self.current = id;
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.pending)
    }
}
