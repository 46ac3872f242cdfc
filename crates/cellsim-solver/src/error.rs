//! Solver error types.

use thiserror::Error;

/// An open voxel whose neighbour lies outside every patch of the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("diffusion hull is open at voxel {voxel:?} towards {outside:?}")]
pub struct HullLeak {
    /// The open voxel on the boundary.
    pub voxel: [i32; 3],
    /// The neighbouring voxel that is not covered by any patch.
    pub outside: [i32; 3],
}

/// The dense linear system could not be solved.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("singular system at column {column} (pivot {pivot:e})")]
pub(crate) struct SingularMatrix {
    pub column: usize,
    pub pivot: f64,
}
