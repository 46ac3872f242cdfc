//! cellsim: dynamic cell graphs with electrical, thermal and diffusion
//! solvers.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the cellsim sub-crates. For most hosts, adding `cellsim` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use cellsim::prelude::*;
//! use cellsim::engine::objects::ThermalMassObject;
//! use std::sync::{Arc, Mutex};
//!
//! // A host that places cells on a line; cells one block apart touch.
//! #[derive(Default)]
//! struct Row(Mutex<Vec<(CellId, Locator)>>);
//!
//! impl CellContainer for Row {
//!     fn cells(&self) -> Vec<(CellId, Locator)> {
//!         self.0.lock().unwrap().clone()
//!     }
//!     fn neighbor_scan(&self, cell: CellId, locator: &Locator) -> Vec<NeighborInfo> {
//!         let here = locator.require_block();
//!         self.0
//!             .lock()
//!             .unwrap()
//!             .iter()
//!             .filter(|(id, l)| *id != cell && (l.require_block().x - here.x).abs() == 1)
//!             .map(|(id, l)| NeighborInfo { cell: *id, locator: l.clone() })
//!             .collect()
//!     }
//! }
//!
//! let mut manager = CellGraphManager::new(SimulationConfig::default()).unwrap();
//! let row = Arc::new(Row::default());
//! let mut ids = Vec::new();
//! for (x, kelvin) in [(0, 400.0), (1, 200.0)] {
//!     let cell = CellBuilder::new("mass", Locator::at(BlockPos::new(x, 0, 0)))
//!         .object(SimulationObject::thermal(ThermalMassObject::new(10.0, kelvin)))
//!         .build()
//!         .unwrap();
//!     row.0.lock().unwrap().push((cell.id(), cell.locator().clone()));
//!     ids.push(manager.insert_cell(row.clone(), cell));
//! }
//! assert_eq!(manager.graph_count(), 1);
//! assert_eq!(manager.graph_of(ids[0]), manager.graph_of(ids[1]));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cellsim-core` | IDs, locators, relation rules, domains |
//! | [`solver`] | `cellsim-solver` | Circuit, thermal and diffusion solvers |
//! | [`engine`] | `cellsim-engine` | Cells, graphs, the manager and persistence |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`cellsim-core`).
///
/// Contains the [`types::Locator`] placement key, identifiers, relation
/// rules and the [`types::Domain`] and [`types::SolveStatus`] tags.
pub use cellsim_core as types;

/// Reference solvers (`cellsim-solver`).
///
/// [`solver::Circuit`], [`solver::ThermalSimulator`] and
/// [`solver::DiffusionVolume`].
pub use cellsim_solver as solver;

/// Cells, graphs and their manager (`cellsim-engine`).
///
/// [`engine::CellGraphManager`] owns every graph; hosts implement
/// [`engine::CellContainer`] to place cells.
pub use cellsim_engine as engine;

/// Common imports for typical cellsim usage.
///
/// ```rust
/// use cellsim::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use cellsim_core::{
        BlockPos, CellId, CellTypeId, Direction, Domain, GraphId, Locator, PoleMap, SolveStatus,
    };

    // Engine
    pub use cellsim_engine::{
        Cell, CellBehavior, CellBuilder, CellContainer, CellGraph, CellGraphManager, CellHooks,
        CellInfo, CellRegistry, ManagerRecord, NeighborInfo, SimulationConfig, SimulationObject,
        SubscriberCollectionExt, SubscriberOptions, TickContext,
    };

    // Errors
    pub use cellsim_engine::{CellError, ConfigError, PersistenceError};
}
