//! Recoverable errors of the engine.
//!
//! Invariant violations (mutating a running graph, wrong thread, unknown
//! subscriber) are caller bugs and panic instead.

use cellsim_core::{CellTypeId, Domain, Locator, LocatorError};
use thiserror::Error;

/// Errors from assembling cells and registering cell kinds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    /// A cell may carry at most one object per domain.
    #[error("cell already has a {0} object")]
    DuplicateObject(Domain),
    /// A container holds at most one behavior per concrete type.
    #[error("behavior {0} is already registered")]
    DuplicateBehavior(&'static str),
    /// No provider is registered for a cell kind.
    #[error("unknown cell kind {0}")]
    UnknownKind(CellTypeId),
    /// A provider is already registered for this kind.
    #[error("cell kind {0} is already registered")]
    DuplicateKind(CellTypeId),
    /// The cell's locator is malformed.
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

/// Errors from restoring a saved [`ManagerRecord`](crate::ManagerRecord).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A saved cell could not be constructed.
    #[error("cannot restore cell at {locator}: {source}")]
    Cell {
        /// Locator of the failing cell.
        locator: Locator,
        /// Underlying error.
        source: CellError,
    },
    /// Two saved cells of one graph share a locator.
    #[error("duplicate locator {0} in saved graph")]
    DuplicateLocator(Locator),
    /// A saved connection points at a locator absent from its graph.
    #[error("saved connection from {from} to {to} has no target")]
    DanglingConnection {
        /// Locator of the cell holding the edge.
        from: Locator,
        /// Missing endpoint.
        to: Locator,
    },
    /// A saved connection is recorded on one endpoint only.
    #[error("saved connection from {from} to {to} is not symmetric")]
    AsymmetricConnection {
        /// Locator of the cell holding the edge.
        from: Locator,
        /// Endpoint lacking the reverse edge.
        to: Locator,
    },
    /// A graph id appears twice, or collides with a live graph.
    #[error("graph {0} already exists")]
    DuplicateGraph(cellsim_core::GraphId),
    /// Malformed serialized data.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
