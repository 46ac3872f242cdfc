//! Voxelized diffusion inside closed volumes.
//!
//! Every diffusion cell owns one [`VoxelPatch`]: a `resolution³` grid of
//! voxels filling its block, each either open (carries fluid) or solid.
//! A [`DiffusionVolume`] joins the patches of one connected subset and
//! diffuses density between face-adjacent open voxels of the same patch
//! or of linked patches.
//!
//! [`DiffusionVolume::build`] checks that the hull is closed: every face of
//! every open voxel must touch either another voxel of the volume or solid
//! material. An open face towards space no patch covers is a leak.

use crate::error::HullLeak;
use cellsim_core::{BlockPos, Direction, SolveStatus};
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use std::fmt;

// ── VoxelPatch ─────────────────────────────────────────────────────

/// Voxel grid filling one block.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelPatch {
    origin: BlockPos,
    resolution: u32,
    solid: Vec<bool>,
}

impl VoxelPatch {
    /// A patch with every voxel open.
    ///
    /// # Panics
    ///
    /// Panics if `resolution` is zero.
    pub fn open(origin: BlockPos, resolution: u32) -> Self {
        assert!(resolution > 0, "voxel patch resolution must be positive");
        let n = (resolution * resolution * resolution) as usize;
        Self {
            origin,
            resolution,
            solid: vec![false; n],
        }
    }

    /// A patch whose outer layer is solid, enclosing an open interior.
    pub fn shell(origin: BlockPos, resolution: u32) -> Self {
        let mut patch = Self::open(origin, resolution);
        let r = resolution;
        for z in 0..r {
            for y in 0..r {
                for x in 0..r {
                    let edge = |v: u32| v == 0 || v == r - 1;
                    if edge(x) || edge(y) || edge(z) {
                        patch.carve(x, y, z);
                    }
                }
            }
        }
        patch
    }

    /// The block this patch fills.
    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    /// Voxels per block edge.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Make a voxel solid. Coordinates are local to the patch.
    pub fn carve(&mut self, x: u32, y: u32, z: u32) {
        if let Some(i) = self.local_index(x, y, z) {
            self.solid[i] = true;
        }
    }

    /// Open the interior of the face layer towards `dir`, keeping its rim
    /// solid so the opening lines up with a neighbour built the same way.
    pub fn open_face(&mut self, dir: Direction) {
        let r = self.resolution;
        if r < 3 {
            for (x, y, z) in self.face_layer(dir) {
                if let Some(i) = self.local_index(x, y, z) {
                    self.solid[i] = false;
                }
            }
            return;
        }
        let inner = |v: u32| v > 0 && v < r - 1;
        for (x, y, z) in self.face_layer(dir) {
            let (dx, dy, dz) = dir.offset();
            let interior = (dx != 0 || inner(x)) && (dy != 0 || inner(y)) && (dz != 0 || inner(z));
            if interior {
                if let Some(i) = self.local_index(x, y, z) {
                    self.solid[i] = false;
                }
            }
        }
    }

    /// Whether a local voxel is open.
    pub fn is_open(&self, x: u32, y: u32, z: u32) -> bool {
        self.local_index(x, y, z).is_some_and(|i| !self.solid[i])
    }

    /// Number of open voxels.
    pub fn open_count(&self) -> usize {
        self.solid.iter().filter(|s| !**s).count()
    }

    /// Global coordinates of every open voxel, in storage order.
    pub fn open_voxels(&self) -> impl Iterator<Item = [i32; 3]> + '_ {
        let r = self.resolution;
        (0..r).flat_map(move |z| {
            (0..r).flat_map(move |y| {
                (0..r).filter_map(move |x| self.is_open(x, y, z).then(|| self.global(x, y, z)))
            })
        })
    }

    fn face_layer(&self, dir: Direction) -> Vec<(u32, u32, u32)> {
        let r = self.resolution;
        let fixed = |offset: i32| if offset < 0 { 0 } else { r - 1 };
        let (dx, dy, dz) = dir.offset();
        let mut out = Vec::with_capacity((r * r) as usize);
        for a in 0..r {
            for b in 0..r {
                let v = match (dx, dy, dz) {
                    (dx, 0, 0) => (fixed(dx), a, b),
                    (0, dy, 0) => (a, fixed(dy), b),
                    (_, _, dz) => (a, b, fixed(dz)),
                };
                out.push(v);
            }
        }
        out
    }

    fn local_index(&self, x: u32, y: u32, z: u32) -> Option<usize> {
        let r = self.resolution;
        (x < r && y < r && z < r).then(|| ((z * r + y) * r + x) as usize)
    }

    fn global(&self, x: u32, y: u32, z: u32) -> [i32; 3] {
        let r = self.resolution as i32;
        [
            self.origin.x * r + x as i32,
            self.origin.y * r + y as i32,
            self.origin.z * r + z as i32,
        ]
    }
}

// ── DiffusionVolume ────────────────────────────────────────────────

/// Handle of a patch within one [`DiffusionVolume`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(usize);

struct PatchEntry {
    patch: VoxelPatch,
    /// Range of this patch's open voxels in the volume's voxel list.
    first: usize,
    count: usize,
}

/// Joined patches of one connected diffusion subset.
pub struct DiffusionVolume {
    resolution: u32,
    diffusivity: f64,
    patches: Vec<PatchEntry>,
    blocks: IndexMap<BlockPos, usize>,
    links: IndexSet<(usize, usize)>,
    positions: Vec<[i32; 3]>,
    owner: Vec<usize>,
    density: Vec<f64>,
    index: IndexMap<[i32; 3], usize>,
    edges: Vec<(usize, usize)>,
    built: bool,
}

impl DiffusionVolume {
    /// Create an empty volume for patches of the given resolution.
    /// `diffusivity` is in voxel faces per second.
    pub fn new(resolution: u32, diffusivity: f64) -> Self {
        Self {
            resolution,
            diffusivity,
            patches: Vec::new(),
            blocks: IndexMap::new(),
            links: IndexSet::new(),
            positions: Vec::new(),
            owner: Vec::new(),
            density: Vec::new(),
            index: IndexMap::new(),
            edges: Vec::new(),
            built: false,
        }
    }

    /// Add a patch with initial per-voxel densities (in
    /// [`VoxelPatch::open_voxels`] order). Missing entries start at zero.
    ///
    /// # Panics
    ///
    /// Panics if the patch resolution differs from the volume's, or if the
    /// block already holds a patch. Grouping only joins compatible patches.
    pub fn add_patch(&mut self, patch: VoxelPatch, densities: &[f64]) -> PatchId {
        assert_eq!(
            patch.resolution(),
            self.resolution,
            "patch resolution does not match the volume"
        );
        let id = self.patches.len();
        let previous = self.blocks.insert(patch.origin(), id);
        assert!(previous.is_none(), "block {} already has a patch", patch.origin());

        let first = self.positions.len();
        for (i, pos) in patch.open_voxels().enumerate() {
            self.index.insert(pos, self.positions.len());
            self.positions.push(pos);
            self.owner.push(id);
            self.density.push(densities.get(i).copied().unwrap_or(0.0));
        }
        let count = self.positions.len() - first;
        self.patches.push(PatchEntry {
            patch,
            first,
            count,
        });
        self.built = false;
        PatchId(id)
    }

    /// Allow exchange between two patches. Idempotent and unordered.
    pub fn connect(&mut self, a: PatchId, b: PatchId) {
        if a != b {
            self.links.insert((a.0.min(b.0), a.0.max(b.0)));
            self.built = false;
        }
    }

    /// Compute voxel adjacency and verify the hull is closed.
    pub fn build(&mut self) -> Result<(), HullLeak> {
        self.edges.clear();
        let r = self.resolution as i32;
        for (i, pos) in self.positions.iter().enumerate() {
            let own = self.owner[i];
            for dir in Direction::ALL {
                let (dx, dy, dz) = dir.offset();
                let next = [pos[0] + dx, pos[1] + dy, pos[2] + dz];
                if let Some(&j) = self.index.get(&next) {
                    let other = self.owner[j];
                    let linked = other == own || self.links.contains(&(own.min(other), own.max(other)));
                    if linked && i < j {
                        self.edges.push((i, j));
                    }
                    continue;
                }
                let block = BlockPos::new(
                    next[0].div_euclid(r),
                    next[1].div_euclid(r),
                    next[2].div_euclid(r),
                );
                if !self.blocks.contains_key(&block) {
                    return Err(HullLeak {
                        voxel: *pos,
                        outside: next,
                    });
                }
            }
        }
        self.built = true;
        Ok(())
    }

    /// Number of patches.
    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    /// Densities of a patch's open voxels.
    pub fn patch_densities(&self, id: PatchId) -> Vec<f64> {
        self.patches
            .get(id.0)
            .map(|p| self.density[p.first..p.first + p.count].to_vec())
            .unwrap_or_default()
    }

    /// Sum of density across the volume.
    pub fn total_amount(&self) -> f64 {
        self.density.iter().sum()
    }

    /// Mean density of a patch.
    pub fn mean_density(&self, id: PatchId) -> f64 {
        match self.patches.get(id.0) {
            Some(p) if p.count > 0 => {
                self.density[p.first..p.first + p.count].iter().sum::<f64>() / p.count as f64
            }
            _ => 0.0,
        }
    }

    /// Add density to every open voxel of a patch.
    pub fn inject(&mut self, id: PatchId, amount: f64) {
        if let Some(p) = self.patches.get(id.0) {
            if p.count == 0 {
                return;
            }
            let share = amount / p.count as f64;
            for d in &mut self.density[p.first..p.first + p.count] {
                *d += share;
            }
        }
    }

    /// Advance diffusion by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> SolveStatus {
        if !self.built {
            return SolveStatus::ConfigurationError;
        }
        // Explicit scheme is stable while each voxel gives away at most
        // 1/6 of its difference per face.
        let rate = (self.diffusivity * dt).min(1.0 / 6.0);
        let mut delta: Vec<f64> = vec![0.0; self.density.len()];
        for &(i, j) in &self.edges {
            let flow = rate * (self.density[i] - self.density[j]);
            delta[i] -= flow;
            delta[j] += flow;
        }
        let mut finite = true;
        for (d, change) in self.density.iter_mut().zip(delta) {
            *d += change;
            finite &= d.is_finite();
        }
        if finite {
            SolveStatus::Ok
        } else {
            SolveStatus::NumericFailure
        }
    }

    /// The patch behind `id`.
    pub fn patch(&self, id: PatchId) -> Option<&VoxelPatch> {
        self.patches.get(id.0).map(|entry| &entry.patch)
    }

    /// Patches linked to `id`.
    pub fn linked_patches(&self, id: PatchId) -> SmallVec<[PatchId; 6]> {
        self.links
            .iter()
            .filter_map(|&(a, b)| {
                if a == id.0 {
                    Some(PatchId(b))
                } else if b == id.0 {
                    Some(PatchId(a))
                } else {
                    None
                }
            })
            .collect()
    }
}

impl fmt::Debug for DiffusionVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffusionVolume")
            .field("patches", &self.patches.len())
            .field("voxels", &self.positions.len())
            .field("links", &self.links.len())
            .field("built", &self.built)
            .finish_non_exhaustive()
    }
}
