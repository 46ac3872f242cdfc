//! Test utilities for cellsim development.
//!
//! Provides two in-memory [`CellContainer`] hosts and recording hooks:
//!
//! - [`GraphWorld`]: adjacency declared explicitly between locators, for
//!   arbitrary topologies (cycles, bridges, random graphs).
//! - [`GridWorld`]: a block grid where block-only cells touch their six
//!   face neighbours and face-mounted cells use the planar/wrapped scans.
//! - [`RecordingHooks`]: a [`CellHooks`] implementation appending every
//!   lifecycle event to a shared [`HookLog`].
//!
//! Cell factories and a matching [`CellRegistry`](cellsim_engine::CellRegistry)
//! live in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use cellsim_core::{BlockPos, CellId, Direction, Locator};
use cellsim_engine::{
    face_scan, Cell, CellContainer, CellGraphManager, CellHooks, CellInfo, ContainerLookup,
    NeighborInfo, WorldLoadStage,
};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Locator of the `i`-th node of a [`GraphWorld`].
pub fn node(i: i32) -> Locator {
    Locator::at(BlockPos::new(i, 0, 0))
}

// ── ContainerEvents ────────────────────────────────────────────────

/// Container callbacks observed by a test host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerEvents {
    pub connected: Vec<(CellId, CellId)>,
    pub disconnected: Vec<(CellId, CellId)>,
    pub topology_changes: usize,
    pub loaded: Vec<CellId>,
}

#[derive(Default)]
struct Placement {
    cells: IndexMap<CellId, Locator>,
    events: ContainerEvents,
}

impl Placement {
    fn place(&mut self, cell: &Cell) {
        self.cells.insert(cell.id(), cell.locator().clone());
    }

    fn placed_at(&self, locator: &Locator) -> Vec<(CellId, Locator)> {
        self.cells
            .iter()
            .filter(|(_, l)| *l == locator)
            .map(|(id, l)| (*id, l.clone()))
            .collect()
    }
}

// ── GraphWorld ─────────────────────────────────────────────────────

/// Host whose adjacency is an explicit undirected relation on locators.
#[derive(Default)]
pub struct GraphWorld {
    placement: Mutex<Placement>,
    links: Mutex<IndexSet<(Locator, Locator)>>,
}

impl GraphWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Declare locators `a` and `b` adjacent.
    pub fn link(&self, a: &Locator, b: &Locator) {
        let mut links = lock(&self.links);
        links.insert((a.clone(), b.clone()));
        links.insert((b.clone(), a.clone()));
    }

    /// Declare nodes `a` and `b` adjacent.
    pub fn link_nodes(&self, a: i32, b: i32) {
        self.link(&node(a), &node(b));
    }

    /// Record `cell` as placed and insert it through `manager`.
    pub fn insert(self: &Arc<Self>, manager: &mut CellGraphManager, cell: Cell) -> CellId {
        lock(&self.placement).place(&cell);
        manager.insert_cell(self.clone(), cell)
    }

    /// Remove `cell` through `manager` and forget its placement.
    pub fn remove(&self, manager: &mut CellGraphManager, cell: CellId) -> Option<Cell> {
        let removed = manager.remove_cell(cell);
        lock(&self.placement).cells.shift_remove(&cell);
        removed
    }

    /// Placed cell at `locator`.
    pub fn cell_at(&self, locator: &Locator) -> Option<CellId> {
        lock(&self.placement)
            .placed_at(locator)
            .first()
            .map(|(id, _)| *id)
    }

    pub fn events(&self) -> ContainerEvents {
        lock(&self.placement).events.clone()
    }
}

impl CellContainer for GraphWorld {
    fn cells(&self) -> Vec<(CellId, Locator)> {
        lock(&self.placement)
            .cells
            .iter()
            .map(|(id, l)| (*id, l.clone()))
            .collect()
    }

    fn neighbor_scan(&self, cell: CellId, locator: &Locator) -> Vec<NeighborInfo> {
        let links = lock(&self.links);
        lock(&self.placement)
            .cells
            .iter()
            .filter(|(id, l)| **id != cell && links.contains(&(locator.clone(), (*l).clone())))
            .map(|(id, l)| NeighborInfo {
                cell: *id,
                locator: l.clone(),
            })
            .collect()
    }

    fn on_cell_connected(&self, cell: CellId, remote: CellId) {
        lock(&self.placement).events.connected.push((cell, remote));
    }

    fn on_cell_disconnected(&self, cell: CellId, remote: CellId) {
        lock(&self.placement).events.disconnected.push((cell, remote));
    }

    fn on_topology_changed(&self) {
        lock(&self.placement).events.topology_changes += 1;
    }

    fn on_cell_loaded(&self, cell: CellId, locator: &Locator) {
        let mut placement = lock(&self.placement);
        placement.cells.insert(cell, locator.clone());
        placement.events.loaded.push(cell);
    }
}

// ── GridWorld ──────────────────────────────────────────────────────

/// Block-grid host.
///
/// Cells whose locator has no face facet touch the cells of the six
/// neighbouring blocks; face-mounted cells use [`face_scan`].
#[derive(Default)]
pub struct GridWorld {
    placement: Mutex<Placement>,
}

impl GridWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record `cell` as placed and insert it through `manager`.
    pub fn insert(self: &Arc<Self>, manager: &mut CellGraphManager, cell: Cell) -> CellId {
        lock(&self.placement).place(&cell);
        manager.insert_cell(self.clone(), cell)
    }

    /// Remove `cell` through `manager` and forget its placement.
    pub fn remove(&self, manager: &mut CellGraphManager, cell: CellId) -> Option<Cell> {
        let removed = manager.remove_cell(cell);
        lock(&self.placement).cells.shift_remove(&cell);
        removed
    }

    pub fn events(&self) -> ContainerEvents {
        lock(&self.placement).events.clone()
    }
}

impl ContainerLookup for GridWorld {
    fn cells_at(&self, pos: BlockPos) -> Vec<(CellId, Locator)> {
        lock(&self.placement)
            .cells
            .iter()
            .filter(|(_, l)| l.block() == Some(pos))
            .map(|(id, l)| (*id, l.clone()))
            .collect()
    }
}

impl CellContainer for GridWorld {
    fn cells(&self) -> Vec<(CellId, Locator)> {
        lock(&self.placement)
            .cells
            .iter()
            .map(|(id, l)| (*id, l.clone()))
            .collect()
    }

    fn neighbor_scan(&self, cell: CellId, locator: &Locator) -> Vec<NeighborInfo> {
        if locator.face().is_some() {
            return face_scan(self, cell, locator);
        }
        let here = locator.require_block();
        Direction::ALL
            .into_iter()
            .flat_map(|dir| self.cells_at(here.offset(dir)))
            .filter(|(id, l)| *id != cell && l.face().is_none())
            .map(|(cell, locator)| NeighborInfo { cell, locator })
            .collect()
    }

    fn on_cell_connected(&self, cell: CellId, remote: CellId) {
        lock(&self.placement).events.connected.push((cell, remote));
    }

    fn on_cell_disconnected(&self, cell: CellId, remote: CellId) {
        lock(&self.placement).events.disconnected.push((cell, remote));
    }

    fn on_topology_changed(&self) {
        lock(&self.placement).events.topology_changes += 1;
    }

    fn on_cell_loaded(&self, cell: CellId, locator: &Locator) {
        let mut placement = lock(&self.placement);
        placement.cells.insert(cell, locator.clone());
        placement.events.loaded.push(cell);
    }
}

// ── RecordingHooks ─────────────────────────────────────────────────

/// A lifecycle event seen by [`RecordingHooks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookEvent {
    Created,
    Removing,
    Destroyed,
    ConnectionsChanged,
    GraphChanged,
    LoadedFromDisk,
    WorldLoaded(WorldLoadStage),
}

/// Shared, ordered record of hook events, plus the labels restored by
/// [`RecordingHooks::load`](CellHooks::load).
#[derive(Clone, Debug, Default)]
pub struct HookLog {
    events: Arc<Mutex<Vec<(CellId, HookEvent)>>>,
    labels: Arc<Mutex<IndexMap<CellId, String>>>,
}

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event, in order.
    pub fn events(&self) -> Vec<(CellId, HookEvent)> {
        lock(&self.events).clone()
    }

    /// Events of one cell, in order.
    pub fn events_of(&self, cell: CellId) -> Vec<HookEvent> {
        lock(&self.events)
            .iter()
            .filter(|(id, _)| *id == cell)
            .map(|(_, e)| *e)
            .collect()
    }

    /// How often `cell` saw `event`.
    pub fn count(&self, cell: CellId, event: HookEvent) -> usize {
        lock(&self.events)
            .iter()
            .filter(|(id, e)| *id == cell && *e == event)
            .count()
    }

    /// Label restored into `cell`, if any.
    pub fn label_of(&self, cell: CellId) -> Option<String> {
        lock(&self.labels).get(&cell).cloned()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
        lock(&self.labels).clear();
    }

    fn push(&self, cell: &CellInfo, event: HookEvent) {
        lock(&self.events).push((cell.id, event));
    }
}

/// Hooks that log every event and persist a free-form label.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    log: HookLog,
    label: Option<String>,
}

impl RecordingHooks {
    pub fn new(log: HookLog) -> Self {
        Self { log, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl CellHooks for RecordingHooks {
    fn on_created(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::Created);
    }
    fn on_removing(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::Removing);
    }
    fn on_destroyed(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::Destroyed);
    }
    fn on_connections_changed(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::ConnectionsChanged);
    }
    fn on_graph_changed(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::GraphChanged);
    }
    fn on_loaded_from_disk(&mut self, cell: &CellInfo) {
        self.log.push(cell, HookEvent::LoadedFromDisk);
    }
    fn on_world_loaded_pre_solver(&mut self, cell: &CellInfo) {
        self.log
            .push(cell, HookEvent::WorldLoaded(WorldLoadStage::PreSolver));
    }
    fn on_world_loaded_post_solver(&mut self, cell: &CellInfo) {
        self.log
            .push(cell, HookEvent::WorldLoaded(WorldLoadStage::PostSolver));
    }
    fn on_world_loaded_pre_sim(&mut self, cell: &CellInfo) {
        self.log
            .push(cell, HookEvent::WorldLoaded(WorldLoadStage::PreSim));
    }
    fn on_world_loaded_post_sim(&mut self, cell: &CellInfo) {
        self.log
            .push(cell, HookEvent::WorldLoaded(WorldLoadStage::PostSim));
    }

    fn save(&self, _cell: &CellInfo) -> Value {
        self.label.clone().map_or(Value::Null, Value::String)
    }

    fn load(&mut self, cell: &CellInfo, data: Value) -> Result<(), serde_json::Error> {
        self.label = serde_json::from_value(data)?;
        if let Some(label) = &self.label {
            lock(&self.log.labels).insert(cell.id, label.clone());
        }
        Ok(())
    }
}
