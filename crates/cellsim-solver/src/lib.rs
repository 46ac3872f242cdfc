//! Reference solvers for the cellsim engine.
//!
//! The engine only depends on the contracts these types expose: add
//! primitives, connect the handles two neighbours offer each other, then
//! step and report a [`SolveStatus`](cellsim_core::SolveStatus).
//!
//! - [`Circuit`]: dense modified nodal analysis over resistors and ideal
//!   voltage sources.
//! - [`ThermalSimulator`]: lumped thermal masses exchanging heat over
//!   conductive links.
//! - [`DiffusionVolume`]: explicit diffusion over the open voxels of a
//!   set of [`VoxelPatch`]es, with a closed-hull check at build time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod circuit;
pub mod diffusion;
pub mod error;
mod linear;
pub mod thermal;

pub use circuit::{Circuit, ComponentId, Pin};
pub use diffusion::{DiffusionVolume, PatchId, VoxelPatch};
pub use error::HullLeak;
pub use thermal::{BodyId, ThermalSimulator};
