//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Counter for unique [`CellId`] allocation.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Counter for unique [`SubscriberId`] allocation.
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Stable handle of a cell.
///
/// Allocated from a monotonic atomic counter via [`CellId::next`]. Edges
/// between cells are stored as lists of these handles, never as
/// references. Cell ids are process-local: persistence identifies cells
/// by their [`Locator`](crate::Locator) and allocates fresh ids on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    /// Allocate a fresh, unique cell id. Thread-safe.
    pub fn next() -> Self {
        Self(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Unique identifier of a cell graph.
///
/// Randomly generated when a graph is created and persisted with it, so
/// a graph keeps its identity across save and load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(Uuid);

impl GraphId {
    /// Generate a new random graph id.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned when a subscriber is registered with a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate a fresh, unique subscriber id. Thread-safe.
    pub fn next() -> Self {
        Self(SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Registry key of a cell kind, e.g. `"resistor"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellTypeId(String);

impl CellTypeId {
    /// Create a type id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CellTypeId {
    fn from(v: &str) -> Self {
        Self(v.to_owned())
    }
}

impl fmt::Display for CellTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
