//! Cells: the nodes of a cell graph.
//!
//! A cell carries at most one [`SimulationObject`] per domain, a set of
//! behaviors, the relation rules that decide which neighbours it accepts,
//! and optional host hooks. Edges are stored as [`CellId`]s and are kept
//! symmetric by [`connections`](crate::connections).

use crate::behavior::{CellBehavior, CellBehaviorContainer};
use crate::container::CellContainer;
use crate::error::CellError;
use crate::object::{SimulationObject, SimulationObjectSet};
use crate::subscriber::{SubscriberPool, TrackedSubscribers};
use cellsim_core::{CellId, CellTypeId, GraphId, Locator, LocatorRelationRuleSet};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Identity of a cell, handed to hooks and behaviors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellInfo {
    /// Cell id.
    pub id: CellId,
    /// Registered kind.
    pub kind: CellTypeId,
    /// Placement.
    pub locator: Locator,
    /// Owning graph, if any.
    pub graph: Option<GraphId>,
}

/// Stage of a world load at which
/// [`CellHooks`] are notified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldLoadStage {
    /// Every cell is linked, no solver is built yet.
    PreSolver,
    /// Every graph has built its solvers.
    PostSolver,
    /// Right before the graphs start.
    PreSim,
    /// Every graph is running.
    PostSim,
}

/// Host callbacks for the lifecycle of one cell. Every method defaults to
/// doing nothing.
pub trait CellHooks: Send {
    /// The cell has been inserted and its graph is running.
    fn on_created(&mut self, _cell: &CellInfo) {}
    /// The cell is about to be detached.
    fn on_removing(&mut self, _cell: &CellInfo) {}
    /// The cell has left the world.
    fn on_destroyed(&mut self, _cell: &CellInfo) {}
    /// The cell's edges changed.
    fn on_connections_changed(&mut self, _cell: &CellInfo) {}
    /// The cell moved to another graph.
    fn on_graph_changed(&mut self, _cell: &CellInfo) {}
    /// The cell was restored from a save.
    fn on_loaded_from_disk(&mut self, _cell: &CellInfo) {}
    /// World load reached [`WorldLoadStage::PreSolver`].
    fn on_world_loaded_pre_solver(&mut self, _cell: &CellInfo) {}
    /// World load reached [`WorldLoadStage::PostSolver`].
    fn on_world_loaded_post_solver(&mut self, _cell: &CellInfo) {}
    /// World load reached [`WorldLoadStage::PreSim`].
    fn on_world_loaded_pre_sim(&mut self, _cell: &CellInfo) {}
    /// World load reached [`WorldLoadStage::PostSim`].
    fn on_world_loaded_post_sim(&mut self, _cell: &CellInfo) {}

    /// Custom payload to persist.
    fn save(&self, _cell: &CellInfo) -> Value {
        Value::Null
    }

    /// Restore the custom payload.
    fn load(&mut self, _cell: &CellInfo, _data: Value) -> Result<(), serde_json::Error> {
        Ok(())
    }
}

/// Hooks that ignore every event.
#[derive(Debug, Default)]
pub struct NoHooks;

impl CellHooks for NoHooks {}

// ── Cell ───────────────────────────────────────────────────────────

/// A simulation-capable node.
pub struct Cell {
    id: CellId,
    kind: CellTypeId,
    locator: Locator,
    connections: Vec<CellId>,
    graph: Option<GraphId>,
    objects: SimulationObjectSet,
    behaviors: CellBehaviorContainer,
    replicators: CellBehaviorContainer,
    persistent: TrackedSubscribers,
    transient: TrackedSubscribers,
    rules: LocatorRelationRuleSet,
    hooks: Box<dyn CellHooks>,
    container: Option<Arc<dyn CellContainer>>,
    bound: bool,
    removed: bool,
}

impl Cell {
    /// Cell id.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Registered kind.
    pub fn kind(&self) -> &CellTypeId {
        &self.kind
    }

    /// Placement.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Snapshot of the cell's identity.
    pub fn info(&self) -> CellInfo {
        CellInfo {
            id: self.id,
            kind: self.kind.clone(),
            locator: self.locator.clone(),
            graph: self.graph,
        }
    }

    /// Adjacent cells.
    pub fn connections(&self) -> &[CellId] {
        &self.connections
    }

    /// Whether `other` is adjacent.
    pub fn is_connected_to(&self, other: CellId) -> bool {
        self.connections.contains(&other)
    }

    /// Owning graph.
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// Simulation objects.
    pub fn objects(&self) -> &SimulationObjectSet {
        &self.objects
    }

    /// Simulation objects, mutably.
    pub fn objects_mut(&mut self) -> &mut SimulationObjectSet {
        &mut self.objects
    }

    /// Behaviors living as long as the cell.
    pub fn behaviors(&self) -> &CellBehaviorContainer {
        &self.behaviors
    }

    /// Behaviors living as long as the cell, mutably.
    pub fn behaviors_mut(&mut self) -> &mut CellBehaviorContainer {
        &mut self.behaviors
    }

    /// Behaviors bound to an observing game object.
    pub fn replicators(&self) -> &CellBehaviorContainer {
        &self.replicators
    }

    /// Bound replicators, mutably.
    pub fn replicators_mut(&mut self) -> &mut CellBehaviorContainer {
        &mut self.replicators
    }

    /// Container the cell was placed in.
    pub fn container(&self) -> Option<&Arc<dyn CellContainer>> {
        self.container.as_ref()
    }

    /// Whether a game object is bound.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Whether removal has started.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Number of subscribers registered by behaviors and replicators.
    pub fn subscription_count(&self) -> usize {
        self.persistent.len() + self.transient.len()
    }

    /// Whether this cell accepts an edge to `remote` at `remote_locator`.
    /// An edge that already exists is always accepted.
    pub fn allows_connection(&self, remote: CellId, remote_locator: &Locator) -> bool {
        if self.is_connected_to(remote) {
            debug!(cell = %self.id, %remote, "connection already recorded; accepting");
            return true;
        }
        self.rules.accepts(&self.locator, remote_locator)
    }

    /// Whether `a` and `b` accept each other.
    pub fn is_connection_accepted(a: &Cell, b: &Cell) -> bool {
        a.allows_connection(b.id, &b.locator) && b.allows_connection(a.id, &a.locator)
    }

    /// Persisted custom payload.
    pub fn save_data(&self) -> Value {
        self.hooks.save(&self.info())
    }

    /// Restore the custom payload.
    pub fn load_data(&mut self, data: Value) -> Result<(), serde_json::Error> {
        let info = self.info();
        self.hooks.load(&info, data)
    }

    // ── Crate-internal mutation ────────────────────────────────────

    pub(crate) fn connections_mut(&mut self) -> &mut Vec<CellId> {
        &mut self.connections
    }

    pub(crate) fn set_graph(&mut self, graph: Option<GraphId>) {
        self.graph = graph;
    }

    pub(crate) fn set_kind(&mut self, kind: CellTypeId) {
        self.kind = kind;
    }

    pub(crate) fn set_container(&mut self, container: Option<Arc<dyn CellContainer>>) {
        self.container = container;
    }

    /// Apply a topology change. The cell must already be detached from the
    /// pool of any previous graph.
    pub(crate) fn update(
        &mut self,
        connections_changed: bool,
        graph_changed: bool,
        pool: &mut SubscriberPool,
    ) {
        let info = self.info();
        if connections_changed {
            self.hooks.on_connections_changed(&info);
        }
        if graph_changed {
            self.subscribe(pool);
            self.hooks.on_graph_changed(&info);
        }
    }

    fn subscribe(&mut self, pool: &mut SubscriberPool) {
        self.behaviors
            .subscribe_all(self.id, &mut self.persistent.track(pool));
        if self.bound {
            self.replicators
                .subscribe_all(self.id, &mut self.transient.track(pool));
        }
    }

    /// Remove every subscription this cell made from `pool`.
    pub(crate) fn detach_subscribers(&mut self, pool: &mut SubscriberPool) {
        self.persistent.clear(pool);
        self.transient.clear(pool);
    }

    /// Start teardown: hooks first, then subscriptions and behaviors.
    pub(crate) fn notify_removing(&mut self, pool: Option<&mut SubscriberPool>) {
        self.removed = true;
        let info = self.info();
        self.hooks.on_removing(&info);
        if let Some(pool) = pool {
            self.detach_subscribers(pool);
        }
        self.behaviors.destroy_all();
        if self.bound {
            self.replicators.drain_destroy();
            self.bound = false;
        }
    }

    pub(crate) fn notify_created(&mut self) {
        let info = self.info();
        self.hooks.on_created(&info);
    }

    pub(crate) fn notify_destroyed(&mut self) {
        let info = self.info();
        self.hooks.on_destroyed(&info);
    }

    pub(crate) fn notify_loaded_from_disk(&mut self) {
        let info = self.info();
        self.hooks.on_loaded_from_disk(&info);
    }

    pub(crate) fn notify_world_loaded(&mut self, stage: WorldLoadStage) {
        let info = self.info();
        match stage {
            WorldLoadStage::PreSolver => self.hooks.on_world_loaded_pre_solver(&info),
            WorldLoadStage::PostSolver => self.hooks.on_world_loaded_post_solver(&info),
            WorldLoadStage::PreSim => self.hooks.on_world_loaded_pre_sim(&info),
            WorldLoadStage::PostSim => self.hooks.on_world_loaded_post_sim(&info),
        }
    }

    /// Attach replicators for an observing game object. They subscribe to
    /// `pool` immediately when the cell belongs to a graph.
    pub(crate) fn bind_game_object(
        &mut self,
        replicators: Vec<Box<dyn CellBehavior>>,
        mut pool: Option<&mut SubscriberPool>,
    ) -> Result<(), CellError> {
        if self.bound {
            self.unbind_game_object(pool.as_deref_mut());
        }
        let info = self.info();
        let mut container = CellBehaviorContainer::new();
        for replicator in replicators {
            container.add_boxed(replicator)?;
        }
        container.on_added(&info);
        self.replicators = container;
        self.bound = true;
        if let Some(pool) = pool {
            self.replicators
                .subscribe_all(self.id, &mut self.transient.track(pool));
        }
        Ok(())
    }

    /// Detach and destroy the bound replicators.
    pub(crate) fn unbind_game_object(&mut self, pool: Option<&mut SubscriberPool>) {
        if let Some(pool) = pool {
            self.transient.clear(pool);
        }
        self.replicators.drain_destroy();
        self.bound = false;
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("locator", &self.locator)
            .field("connections", &self.connections)
            .field("graph", &self.graph)
            .field("objects", &self.objects)
            .field("behaviors", &self.behaviors)
            .finish_non_exhaustive()
    }
}

// ── CellBuilder ────────────────────────────────────────────────────

/// Assembles a [`Cell`] from explicitly registered parts.
pub struct CellBuilder {
    kind: CellTypeId,
    locator: Locator,
    objects: Vec<SimulationObject>,
    behaviors: Vec<Box<dyn CellBehavior>>,
    rules: LocatorRelationRuleSet,
    hooks: Option<Box<dyn CellHooks>>,
}

impl CellBuilder {
    /// Start a cell of `kind` at `locator`.
    pub fn new(kind: impl Into<CellTypeId>, locator: Locator) -> Self {
        Self {
            kind: kind.into(),
            locator,
            objects: Vec::new(),
            behaviors: Vec::new(),
            rules: LocatorRelationRuleSet::new(),
            hooks: None,
        }
    }

    /// Add a simulation object.
    pub fn object(mut self, object: SimulationObject) -> Self {
        self.objects.push(object);
        self
    }

    /// Add a behavior.
    pub fn behavior(mut self, behavior: impl CellBehavior) -> Self {
        self.behaviors.push(Box::new(behavior));
        self
    }

    /// Set the cell-level relation rules.
    pub fn rules(mut self, rules: LocatorRelationRuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Set the host hooks.
    pub fn hooks(mut self, hooks: impl CellHooks + 'static) -> Self {
        self.hooks = Some(Box::new(hooks));
        self
    }

    /// Build the cell, rejecting duplicate objects or behaviors.
    pub fn build(self) -> Result<Cell, CellError> {
        let mut objects = SimulationObjectSet::new();
        for object in self.objects {
            objects.insert(object)?;
        }
        let mut behaviors = CellBehaviorContainer::new();
        for behavior in self.behaviors {
            behaviors.add_boxed(behavior)?;
        }
        let mut cell = Cell {
            id: CellId::next(),
            kind: self.kind,
            locator: self.locator,
            connections: Vec::new(),
            graph: None,
            objects,
            behaviors,
            replicators: CellBehaviorContainer::new(),
            persistent: TrackedSubscribers::new(),
            transient: TrackedSubscribers::new(),
            rules: self.rules,
            hooks: self.hooks.unwrap_or_else(|| Box::new(NoHooks)),
            container: None,
            bound: false,
            removed: false,
        };
        let info = cell.info();
        cell.behaviors.on_added(&info);
        Ok(cell)
    }
}
