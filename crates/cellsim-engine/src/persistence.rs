//! Save and restore of whole worlds.
//!
//! A save is a tree of serde records: graphs, their cells (kind, locator,
//! neighbour locators, payload) and the per-domain solver partition. Cell
//! ids are process-local and never persisted; edges are stored as
//! locators, which are unique within a graph.
//!
//! Loading validates the whole record and reconstructs every cell before
//! anything is registered, so a malformed save leaves the manager
//! untouched.

use crate::cell::{Cell, WorldLoadStage};
use crate::container::CellContainer;
use crate::error::PersistenceError;
use crate::graph::CellGraph;
use crate::manager::CellGraphManager;
use crate::registry::CellRegistry;
use cellsim_core::{CellId, CellTypeId, Domain, GraphId, Locator};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Records ────────────────────────────────────────────────────────

/// Every graph of a manager.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerRecord {
    /// Saved graphs.
    pub graphs: Vec<GraphRecord>,
}

impl ManagerRecord {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Graph id, restored on load.
    pub id: GraphId,
    /// Member cells.
    pub cells: Vec<CellRecord>,
    /// Solver partition per domain at save time.
    #[serde(default)]
    pub extra: Vec<DomainPartition>,
}

/// Member sets of the realized solvers of one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainPartition {
    /// Domain.
    pub domain: Domain,
    /// One list of member locators per solver.
    pub subsets: Vec<Vec<Locator>>,
}

/// One cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    /// Registered kind.
    pub kind: CellTypeId,
    /// Placement.
    pub locator: Locator,
    /// Locators of adjacent cells.
    pub connections: Vec<Locator>,
    /// Cell state.
    #[serde(default)]
    pub payload: CellPayload,
}

/// Persistent state of one cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellPayload {
    /// Host payload from [`CellHooks::save`](crate::CellHooks::save).
    pub data: Value,
    /// Object states.
    pub objects: Vec<ObjectRecord>,
    /// Behavior states.
    pub behaviors: Vec<BehaviorRecord>,
}

/// State of one simulation object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Domain of the object.
    pub domain: Domain,
    /// Model state.
    pub state: Value,
}

/// State of one behavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    /// [`CellBehavior::type_name`](crate::CellBehavior::type_name) of the behavior.
    pub name: String,
    /// Behavior state.
    pub state: Value,
}

// ── Save ───────────────────────────────────────────────────────────

/// Snapshot a stopped graph, capturing live solver state first.
pub(crate) fn save_graph(graph: &mut CellGraph) -> GraphRecord {
    let id = graph.id();
    graph.with_state(|state| {
        state.capture_all();
        let locator_of = |cell: &CellId| state.cells.get(cell).map(|c| c.locator().clone());
        let cells = state
            .cells
            .values()
            .map(|cell| CellRecord {
                kind: cell.kind().clone(),
                locator: cell.locator().clone(),
                connections: cell.connections().iter().filter_map(locator_of).collect(),
                payload: save_payload(cell),
            })
            .collect();
        let extra = Domain::ALL
            .into_iter()
            .map(|domain| DomainPartition {
                domain,
                subsets: state
                    .solvers
                    .partition(domain)
                    .iter()
                    .map(|members| members.iter().filter_map(locator_of).collect())
                    .collect(),
            })
            .collect();
        GraphRecord { id, cells, extra }
    })
}

fn save_payload(cell: &Cell) -> CellPayload {
    CellPayload {
        data: cell.save_data(),
        objects: cell
            .objects()
            .iter()
            .map(|object| ObjectRecord {
                domain: object.domain(),
                state: object.save(),
            })
            .collect(),
        behaviors: cell
            .behaviors()
            .save()
            .into_iter()
            .map(|(name, state)| BehaviorRecord { name, state })
            .collect(),
    }
}

// ── Load ───────────────────────────────────────────────────────────

struct PendingGraph {
    id: GraphId,
    cells: Vec<Cell>,
    extra: Vec<DomainPartition>,
}

pub(crate) fn load(
    manager: &mut CellGraphManager,
    record: ManagerRecord,
    registry: &CellRegistry,
    container: Arc<dyn CellContainer>,
) -> Result<Vec<GraphId>, PersistenceError> {
    let mut seen = HashSet::new();
    for graph in &record.graphs {
        if !seen.insert(graph.id) || manager.graph(graph.id).is_some() {
            return Err(PersistenceError::DuplicateGraph(graph.id));
        }
    }
    let pending = record
        .graphs
        .into_iter()
        .map(|graph| restore_cells(graph, registry))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ids = Vec::with_capacity(pending.len());
    let mut extras = Vec::with_capacity(pending.len());
    for PendingGraph { id, cells, extra } in pending {
        let mut graph = manager.new_graph(id);
        let members: Vec<CellId> = cells.iter().map(Cell::id).collect();
        for mut cell in cells {
            cell.set_container(Some(Arc::clone(&container)));
            graph.add_cell(cell);
        }
        for member in &members {
            graph.with_cell_mut(*member, |cell, _| cell.notify_loaded_from_disk());
            graph.update_cell(*member, true, true);
            graph.with_cell_mut(*member, |cell, _| {
                container.on_cell_loaded(cell.id(), cell.locator());
                cell.notify_created();
            });
        }
        manager.add_graph(graph);
        ids.push(id);
        extras.push(extra);
    }

    notify_stage(manager, &ids, WorldLoadStage::PreSolver);
    for (id, extra) in ids.iter().zip(&extras) {
        let graph = manager.graph_entry(*id);
        graph.build_solver();
        check_partition(graph, extra);
    }
    notify_stage(manager, &ids, WorldLoadStage::PostSolver);
    notify_stage(manager, &ids, WorldLoadStage::PreSim);
    for id in &ids {
        manager.graph_entry(*id).start();
    }
    for id in &ids {
        let graph = manager.graph_entry(*id);
        for member in graph.cell_ids() {
            graph.with_cell_locked(member, |cell| {
                cell.notify_world_loaded(WorldLoadStage::PostSim)
            });
        }
    }
    container.on_topology_changed();
    info!(graphs = ids.len(), cells = manager.cell_count(), "world loaded");
    Ok(ids)
}

/// Build, validate and link the cells of one saved graph.
fn restore_cells(
    record: GraphRecord,
    registry: &CellRegistry,
) -> Result<PendingGraph, PersistenceError> {
    let mut by_locator: IndexMap<Locator, usize> = IndexMap::new();
    for (index, cell) in record.cells.iter().enumerate() {
        if by_locator.insert(cell.locator.clone(), index).is_some() {
            return Err(PersistenceError::DuplicateLocator(cell.locator.clone()));
        }
    }
    for cell in &record.cells {
        for remote in &cell.connections {
            let Some(&index) = by_locator.get(remote) else {
                return Err(PersistenceError::DanglingConnection {
                    from: cell.locator.clone(),
                    to: remote.clone(),
                });
            };
            if !record.cells[index].connections.contains(&cell.locator) {
                return Err(PersistenceError::AsymmetricConnection {
                    from: cell.locator.clone(),
                    to: remote.clone(),
                });
            }
        }
    }

    let mut cells = Vec::with_capacity(record.cells.len());
    for saved in &record.cells {
        let mut cell = registry
            .create(&saved.kind, saved.locator.clone())
            .map_err(|source| PersistenceError::Cell {
                locator: saved.locator.clone(),
                source,
            })?;
        load_payload(&mut cell, saved.payload.clone())?;
        cells.push(cell);
    }
    let ids: Vec<CellId> = cells.iter().map(Cell::id).collect();
    for (cell, saved) in cells.iter_mut().zip(&record.cells) {
        let links = saved
            .connections
            .iter()
            .filter_map(|remote| by_locator.get(remote).map(|&i| ids[i]));
        let mut unique: IndexSet<CellId> = IndexSet::new();
        unique.extend(links);
        cell.connections_mut().extend(unique);
    }
    debug!(graph = %record.id, cells = cells.len(), "graph restored");
    Ok(PendingGraph {
        id: record.id,
        cells,
        extra: record.extra,
    })
}

fn load_payload(cell: &mut Cell, payload: CellPayload) -> Result<(), PersistenceError> {
    cell.load_data(payload.data)?;
    for object in payload.objects {
        match cell.objects_mut().get_mut(object.domain) {
            Some(target) => target.load(object.state)?,
            None => warn!(
                cell = %cell.locator(),
                domain = %object.domain,
                "saved object has no counterpart; skipping"
            ),
        }
    }
    for behavior in payload.behaviors {
        if !cell.behaviors_mut().load(&behavior.name, behavior.state)? {
            warn!(
                cell = %cell.locator(),
                behavior = %behavior.name,
                "saved behavior has no counterpart; skipping"
            );
        }
    }
    Ok(())
}

fn notify_stage(manager: &mut CellGraphManager, graphs: &[GraphId], stage: WorldLoadStage) {
    for id in graphs {
        let graph = manager.graph_entry(*id);
        for member in graph.cell_ids() {
            graph.with_cell_mut(member, |cell, _| cell.notify_world_loaded(stage));
        }
    }
}

/// Warn when the rebuilt partition differs from the saved one.
fn check_partition(graph: &CellGraph, saved: &[DomainPartition]) {
    for partition in saved {
        let rebuilt: Vec<HashSet<Locator>> = graph
            .partition(partition.domain)
            .iter()
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| graph.with_cell(*id, |cell, _| cell.locator().clone()))
                    .collect()
            })
            .collect();
        let matches = rebuilt.len() == partition.subsets.len()
            && partition.subsets.iter().all(|subset| {
                let subset: HashSet<Locator> = subset.iter().cloned().collect();
                rebuilt.contains(&subset)
            });
        if !matches {
            warn!(
                graph = %graph.id(),
                domain = %partition.domain,
                saved = partition.subsets.len(),
                rebuilt = rebuilt.len(),
                "solver partition differs from the save"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsim_core::BlockPos;
    use serde_json::json;

    fn at(x: i32) -> Locator {
        Locator::at(BlockPos::new(x, 0, 0))
    }

    fn cell(x: i32, connections: &[i32]) -> CellRecord {
        CellRecord {
            kind: "node".into(),
            locator: at(x),
            connections: connections.iter().map(|&c| at(c)).collect(),
            payload: CellPayload::default(),
        }
    }

    fn registry() -> CellRegistry {
        let mut registry = CellRegistry::new();
        registry
            .register("node", |locator| crate::CellBuilder::new("node", locator).build())
            .unwrap();
        registry
    }

    fn graph(cells: Vec<CellRecord>) -> GraphRecord {
        GraphRecord {
            id: GraphId::new_random(),
            cells,
            extra: Vec::new(),
        }
    }

    #[test]
    fn links_cells_by_locator() {
        let pending = restore_cells(graph(vec![cell(0, &[1]), cell(1, &[0])]), &registry()).unwrap();
        let (a, b) = (&pending.cells[0], &pending.cells[1]);
        assert_eq!(a.connections(), &[b.id()]);
        assert_eq!(b.connections(), &[a.id()]);
    }

    #[test]
    fn rejects_dangling_and_asymmetric_edges() {
        let err = restore_cells(graph(vec![cell(0, &[5])]), &registry()).err().unwrap();
        assert!(matches!(err, PersistenceError::DanglingConnection { .. }));
        let err = restore_cells(graph(vec![cell(0, &[1]), cell(1, &[])]), &registry())
            .err()
            .unwrap();
        assert!(matches!(err, PersistenceError::AsymmetricConnection { .. }));
        let err = restore_cells(graph(vec![cell(0, &[]), cell(0, &[])]), &registry())
            .err()
            .unwrap();
        assert!(matches!(err, PersistenceError::DuplicateLocator(_)));
    }

    #[test]
    fn unknown_kind_names_the_locator() {
        let mut record = cell(3, &[]);
        record.kind = "lamp".into();
        let err = restore_cells(graph(vec![record]), &registry()).err().unwrap();
        match err {
            PersistenceError::Cell { locator, .. } => assert_eq!(locator, at(3)),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn record_survives_json() {
        let mut record = cell(0, &[]);
        record.payload.data = json!({ "label": "north lamp" });
        record.payload.behaviors.push(BehaviorRecord {
            name: "temperature_explosion".into(),
            state: json!({ "score": 0.25 }),
        });
        let manager = ManagerRecord {
            graphs: vec![graph(vec![record])],
        };
        let text = manager.to_json().unwrap();
        assert_eq!(ManagerRecord::from_json(&text).unwrap(), manager);
        assert!(matches!(
            ManagerRecord::from_json("{ not json"),
            Err(PersistenceError::Json(_))
        ));
    }
}
