//! Error types for core operations.

use crate::locator::FacetKind;
use thiserror::Error;

/// Errors from building or querying a [`Locator`](crate::Locator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// The builder already holds a facet of this kind.
    #[error("locator already has a {0:?} facet")]
    DuplicateFacet(FacetKind),
    /// A facet required by the caller is absent.
    #[error("locator has no {0:?} facet")]
    MissingFacet(FacetKind),
}
