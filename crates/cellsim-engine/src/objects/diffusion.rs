use crate::object::{DiffusionModel, ObjectPeer};
use cellsim_core::Locator;
use cellsim_solver::{DiffusionVolume, PatchId, VoxelPatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A block-sized patch of voxels holding one fluid.
#[derive(Debug)]
pub struct FluidPatchObject {
    fluid: String,
    patch: VoxelPatch,
    diffusivity: f64,
    densities: Vec<f64>,
    id: Option<PatchId>,
}

#[derive(Serialize, Deserialize)]
struct PatchState {
    densities: Vec<f64>,
}

impl FluidPatchObject {
    /// A patch of `fluid` with every open voxel at `density`.
    pub fn new(fluid: impl Into<String>, patch: VoxelPatch, diffusivity: f64, density: f64) -> Self {
        let densities = vec![density; patch.open_count()];
        Self {
            fluid: fluid.into(),
            patch,
            diffusivity,
            densities,
            id: None,
        }
    }

    /// Realized patch, if any.
    pub fn patch_id(&self) -> Option<PatchId> {
        self.id
    }

    /// Total amount of fluid in the patch.
    pub fn amount(&self, volume: Option<&DiffusionVolume>) -> f64 {
        match (volume, self.id) {
            (Some(volume), Some(id)) => volume.patch_densities(id).iter().sum(),
            _ => self.densities.iter().sum(),
        }
    }

    /// Spread `amount` evenly over the open voxels.
    pub fn inject(&mut self, volume: Option<&mut DiffusionVolume>, amount: f64) {
        match (volume, self.id) {
            (Some(volume), Some(id)) => volume.inject(id, amount),
            _ if !self.densities.is_empty() => {
                let share = amount / self.densities.len() as f64;
                for d in &mut self.densities {
                    *d += share;
                }
            }
            _ => {}
        }
    }
}

impl DiffusionModel for FluidPatchObject {
    fn fluid(&self) -> &str {
        &self.fluid
    }

    fn patch(&self) -> &VoxelPatch {
        &self.patch
    }

    fn diffusivity(&self) -> f64 {
        self.diffusivity
    }

    fn add_patch(&mut self, volume: &mut DiffusionVolume) {
        self.id = Some(volume.add_patch(self.patch.clone(), &self.densities));
    }

    fn offer_patch(&self, _local: &Locator, _peer: &ObjectPeer) -> Option<PatchId> {
        self.id
    }

    fn capture(&mut self, volume: &DiffusionVolume) {
        if let Some(id) = self.id {
            self.densities = volume.patch_densities(id);
        }
    }

    fn clear(&mut self) {
        self.id = None;
    }

    fn save(&self) -> Value {
        serde_json::to_value(PatchState {
            densities: self.densities.clone(),
        })
        .unwrap_or(Value::Null)
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        let state: PatchState = serde_json::from_value(state)?;
        self.densities = state.densities;
        self.densities.resize(self.patch.open_count(), 0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsim_core::{BlockPos, Direction};

    fn pipe(x: i32, open: &[Direction], density: f64) -> FluidPatchObject {
        let mut patch = VoxelPatch::shell(BlockPos::new(x, 0, 0), 4);
        for dir in open {
            patch.open_face(*dir);
        }
        FluidPatchObject::new("water", patch, 1.0, density)
    }

    #[test]
    fn joined_pipes_conserve_and_capture_amount() {
        let mut left = pipe(0, &[Direction::East], 1.0);
        let mut right = pipe(1, &[Direction::West], 0.0);
        let total = left.amount(None) + right.amount(None);
        let mut volume = DiffusionVolume::new(4, left.diffusivity());
        left.add_patch(&mut volume);
        right.add_patch(&mut volume);
        volume.connect(left.patch_id().unwrap(), right.patch_id().unwrap());
        volume.build().unwrap();
        for _ in 0..200 {
            volume.step(0.01);
        }
        left.capture(&volume);
        right.capture(&volume);
        left.clear();
        right.clear();
        assert!(right.amount(None) > 0.0);
        assert!((left.amount(None) + right.amount(None) - total).abs() < 1e-9);
    }

    #[test]
    fn compatibility_needs_matching_fluid() {
        let water = pipe(0, &[], 1.0);
        let steam = FluidPatchObject::new("steam", VoxelPatch::shell(BlockPos::new(1, 0, 0), 4), 1.0, 1.0);
        assert!(water.is_compatible_with(&pipe(2, &[], 0.0)));
        assert!(!water.is_compatible_with(&steam));
    }

    #[test]
    fn unrealized_inject_spreads_evenly() {
        let mut p = pipe(0, &[], 0.0);
        p.inject(None, 8.0);
        assert!((p.amount(None) - 8.0).abs() < 1e-9);
    }
}
