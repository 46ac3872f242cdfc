//! Core types for the cellsim engine.
//!
//! This is the leaf crate with zero internal cellsim dependencies.
//! It defines the identifiers, the [`Locator`] placement key, relation
//! rules, simulation [`Domain`] tags and [`SolveStatus`] outcomes used
//! throughout the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod domain;
pub mod error;
pub mod id;
pub mod latest;
pub mod locator;

pub use domain::{Domain, SolveStatus};
pub use error::LocatorError;
pub use id::{CellId, CellTypeId, GraphId, SubscriberId};
pub use latest::LatestValue;
pub use locator::{
    BlockPos, Direction, DirectionMask, FacetKind, Locator, LocatorBuilder, LocatorFacet,
    LocatorRelationRule, LocatorRelationRuleSet, Pole, PoleMap,
};
