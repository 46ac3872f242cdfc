//! Stock domain models.
//!
//! These cover the common building blocks: resistive loads, sources,
//! grounds and wires for the electrical domain, lumped thermal masses, and
//! voxel fluid patches. Hosts implement the model traits in
//! [`object`](crate::object) for anything more specialised.

mod diffusion;
mod electrical;
mod thermal;

pub use diffusion::FluidPatchObject;
pub use electrical::{GroundObject, ResistorObject, VoltageSourceObject, WireObject};
pub use thermal::ThermalMassObject;
