//! Cell kinds known to a host, used to reconstruct cells from a save.

use crate::cell::Cell;
use crate::error::CellError;
use cellsim_core::{CellTypeId, Locator};
use indexmap::IndexMap;
use std::fmt;

/// Builds a fresh cell of one kind at a locator.
pub type CellProvider = Box<dyn Fn(Locator) -> Result<Cell, CellError> + Send + Sync>;

/// Registry of cell providers keyed by [`CellTypeId`].
#[derive(Default)]
pub struct CellRegistry {
    providers: IndexMap<CellTypeId, CellProvider>,
}

impl CellRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider for `kind`.
    pub fn register(
        &mut self,
        kind: impl Into<CellTypeId>,
        provider: impl Fn(Locator) -> Result<Cell, CellError> + Send + Sync + 'static,
    ) -> Result<(), CellError> {
        let kind = kind.into();
        if self.providers.contains_key(&kind) {
            return Err(CellError::DuplicateKind(kind));
        }
        self.providers.insert(kind, Box::new(provider));
        Ok(())
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: &CellTypeId) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &CellTypeId> {
        self.providers.keys()
    }

    /// Build a cell of `kind` at `locator`. The cell reports `kind` even if
    /// the provider built it under another name.
    pub fn create(&self, kind: &CellTypeId, locator: Locator) -> Result<Cell, CellError> {
        let provider = self
            .providers
            .get(kind)
            .ok_or_else(|| CellError::UnknownKind(kind.clone()))?;
        let mut cell = provider(locator)?;
        cell.set_kind(kind.clone());
        Ok(cell)
    }
}

impl fmt::Debug for CellRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
