//! Per-domain facets of a cell and the negotiation that wires them into
//! solvers.
//!
//! A [`SimulationObject`] pairs a domain model with the relation rules that
//! decide which neighbours it accepts. On every solver rebuild the graph
//! first [`clear`](SimulationObject::clear)s every object, records the
//! object-level connections, lets each model add its primitives to the
//! solver of its subset, and then asks both endpoints of every edge for the
//! primitive they offer the other. Offers are pure lookups over handles
//! created while adding primitives, so repeated calls within one rebuild
//! return the same handle.

use crate::error::CellError;
use crate::solvers::Solvers;
use cellsim_core::{CellId, Domain, Locator, LocatorRelationRuleSet};
use cellsim_solver::{BodyId, Circuit, DiffusionVolume, PatchId, Pin, ThermalSimulator, VoxelPatch};
use serde_json::Value;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;

/// The remote end of an object connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPeer {
    /// Remote cell.
    pub cell: CellId,
    /// Remote cell's locator.
    pub locator: Locator,
}

// ── Domain models ──────────────────────────────────────────────────

/// Electrical behaviour of a cell.
pub trait ElectricalModel: Any + Send {
    /// Add this cell's components to `circuit`. `peers` are the object
    /// connections recorded for this rebuild.
    fn add_components(&mut self, circuit: &mut Circuit, peers: &[ObjectPeer]);

    /// The pin this cell exposes towards `peer`, or `None` to stay
    /// unconnected on that side.
    fn offer_component(&self, local: &Locator, peer: &ObjectPeer) -> Option<Pin>;

    /// Make internal connections once every edge has been negotiated.
    fn build(&mut self, _circuit: &mut Circuit) {}

    /// Drop every component handle.
    fn clear(&mut self);

    /// A pin that may be grounded when the circuit is floating.
    fn ground_candidate(&self) -> Option<Pin> {
        None
    }

    /// Power turned into heat by this cell, in W.
    fn dissipated_power(&self, _circuit: &Circuit) -> f64 {
        0.0
    }

    /// Persistent state.
    fn save(&self) -> Value {
        Value::Null
    }

    /// Restore persistent state.
    fn load(&mut self, _state: Value) -> Result<(), serde_json::Error> {
        Ok(())
    }
}

/// Thermal behaviour of a cell.
pub trait ThermalModel: Any + Send {
    /// Add this cell's bodies to `sim`.
    fn add_bodies(&mut self, sim: &mut ThermalSimulator);

    /// The body exposed towards `peer` and the contact conductance in W/K.
    fn offer_body(&self, local: &Locator, peer: &ObjectPeer) -> Option<(BodyId, f64)>;

    /// Copy evolving state out of `sim` before it is discarded.
    fn capture(&mut self, sim: &ThermalSimulator);

    /// Drop every body handle.
    fn clear(&mut self);

    /// Current temperature in K, read from `sim` when realized.
    fn temperature(&self, sim: Option<&ThermalSimulator>) -> f64;

    /// Add energy in J to the cell.
    fn add_energy(&mut self, sim: Option<&mut ThermalSimulator>, joules: f64);

    /// Persistent state.
    fn save(&self) -> Value {
        Value::Null
    }

    /// Restore persistent state.
    fn load(&mut self, _state: Value) -> Result<(), serde_json::Error> {
        Ok(())
    }
}

/// Diffusion behaviour of a cell.
pub trait DiffusionModel: Any + Send {
    /// Identifier of the diffusing substance.
    fn fluid(&self) -> &str;

    /// The cell's voxel patch.
    fn patch(&self) -> &VoxelPatch;

    /// Diffusivity in voxel faces per second.
    fn diffusivity(&self) -> f64;

    /// Whether this cell may share a volume with `other`. Distinct from
    /// mutual acceptance: incompatible neighbours never join a volume.
    fn is_compatible_with(&self, other: &dyn DiffusionModel) -> bool {
        self.fluid() == other.fluid() && self.patch().resolution() == other.patch().resolution()
    }

    /// Add this cell's patch to `volume`.
    fn add_patch(&mut self, volume: &mut DiffusionVolume);

    /// The patch exposed towards `peer`.
    fn offer_patch(&self, local: &Locator, peer: &ObjectPeer) -> Option<PatchId>;

    /// Copy evolving state out of `volume` before it is discarded.
    fn capture(&mut self, volume: &DiffusionVolume);

    /// Drop the patch handle.
    fn clear(&mut self);

    /// Persistent state.
    fn save(&self) -> Value {
        Value::Null
    }

    /// Restore persistent state.
    fn load(&mut self, _state: Value) -> Result<(), serde_json::Error> {
        Ok(())
    }
}

/// A domain model of one of the three kinds.
pub enum ObjectModel {
    /// Electrical.
    Electrical(Box<dyn ElectricalModel>),
    /// Thermal.
    Thermal(Box<dyn ThermalModel>),
    /// Diffusion.
    Diffusion(Box<dyn DiffusionModel>),
}

impl ObjectModel {
    /// Domain of the model.
    pub fn domain(&self) -> Domain {
        match self {
            ObjectModel::Electrical(_) => Domain::Electrical,
            ObjectModel::Thermal(_) => Domain::Thermal,
            ObjectModel::Diffusion(_) => Domain::Diffusion,
        }
    }

    fn as_any(&self) -> &dyn Any {
        match self {
            ObjectModel::Electrical(m) => &**m,
            ObjectModel::Thermal(m) => &**m,
            ObjectModel::Diffusion(m) => &**m,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            ObjectModel::Electrical(m) => &mut **m,
            ObjectModel::Thermal(m) => &mut **m,
            ObjectModel::Diffusion(m) => &mut **m,
        }
    }

    fn clear(&mut self) {
        match self {
            ObjectModel::Electrical(m) => m.clear(),
            ObjectModel::Thermal(m) => m.clear(),
            ObjectModel::Diffusion(m) => m.clear(),
        }
    }

    fn save(&self) -> Value {
        match self {
            ObjectModel::Electrical(m) => m.save(),
            ObjectModel::Thermal(m) => m.save(),
            ObjectModel::Diffusion(m) => m.save(),
        }
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        match self {
            ObjectModel::Electrical(m) => m.load(state),
            ObjectModel::Thermal(m) => m.load(state),
            ObjectModel::Diffusion(m) => m.load(state),
        }
    }
}

// ── SimulationObject ───────────────────────────────────────────────

/// One domain facet of a cell.
pub struct SimulationObject {
    model: ObjectModel,
    rules: LocatorRelationRuleSet,
    max_connections: Option<usize>,
    connections: Vec<ObjectPeer>,
    realized: Option<usize>,
}

impl SimulationObject {
    /// An electrical object.
    pub fn electrical(model: impl ElectricalModel) -> Self {
        Self::new(ObjectModel::Electrical(Box::new(model)))
    }

    /// A thermal object.
    pub fn thermal(model: impl ThermalModel) -> Self {
        Self::new(ObjectModel::Thermal(Box::new(model)))
    }

    /// A diffusion object.
    pub fn diffusion(model: impl DiffusionModel) -> Self {
        Self::new(ObjectModel::Diffusion(Box::new(model)))
    }

    fn new(model: ObjectModel) -> Self {
        Self {
            model,
            rules: LocatorRelationRuleSet::new(),
            max_connections: None,
            connections: Vec::new(),
            realized: None,
        }
    }

    /// Replace the relation rules.
    pub fn with_rules(mut self, rules: LocatorRelationRuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Cap the number of object connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// The object's domain.
    pub fn domain(&self) -> Domain {
        self.model.domain()
    }

    /// Whether this object, at `local`, accepts a connection to `remote`.
    pub fn accepts_remote(&self, local: &Locator, remote: &Locator) -> bool {
        self.rules.accepts(local, remote)
    }

    /// Object connections recorded by the last rebuild.
    pub fn connections(&self) -> &[ObjectPeer] {
        &self.connections
    }

    /// Index of the realized solver within its domain, if any.
    pub fn realized(&self) -> Option<usize> {
        self.realized
    }

    /// The domain model.
    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    /// The domain model, mutably.
    pub fn model_mut(&mut self) -> &mut ObjectModel {
        &mut self.model
    }

    /// The electrical model, if this is an electrical object.
    pub fn as_electrical(&self) -> Option<&dyn ElectricalModel> {
        match &self.model {
            ObjectModel::Electrical(m) => Some(&**m),
            _ => None,
        }
    }

    /// The thermal model, if this is a thermal object.
    pub fn as_thermal(&self) -> Option<&dyn ThermalModel> {
        match &self.model {
            ObjectModel::Thermal(m) => Some(&**m),
            _ => None,
        }
    }

    /// The diffusion model, if this is a diffusion object.
    pub fn as_diffusion(&self) -> Option<&dyn DiffusionModel> {
        match &self.model {
            ObjectModel::Diffusion(m) => Some(&**m),
            _ => None,
        }
    }

    /// The concrete model, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.model.as_any().downcast_ref::<T>()
    }

    /// The concrete model, mutably, if it is a `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.model.as_any_mut().downcast_mut::<T>()
    }

    /// Drop connections, the realized solver and every primitive handle.
    /// Idempotent.
    pub fn clear(&mut self) {
        self.connections.clear();
        self.realized = None;
        self.model.clear();
    }

    /// # Panics
    ///
    /// Panics when the connection would exceed the configured maximum.
    pub(crate) fn add_connection(&mut self, peer: ObjectPeer) {
        if let Some(max) = self.max_connections {
            assert!(
                self.connections.len() < max,
                "{} object exceeds its {} allowed connections",
                self.domain(),
                max
            );
        }
        self.connections.push(peer);
    }

    /// The model alongside the recorded connections.
    pub(crate) fn parts_mut(&mut self) -> (&mut ObjectModel, &[ObjectPeer]) {
        (&mut self.model, &self.connections)
    }

    pub(crate) fn set_realized(&mut self, index: Option<usize>) {
        self.realized = index;
    }

    pub(crate) fn capture(&mut self, solvers: &Solvers) {
        let Some(index) = self.realized else {
            return;
        };
        match &mut self.model {
            ObjectModel::Electrical(_) => {}
            ObjectModel::Thermal(m) => {
                if let Some(sim) = solvers.thermal(index) {
                    m.capture(sim);
                }
            }
            ObjectModel::Diffusion(m) => {
                if let Some(volume) = solvers.diffusion(index) {
                    m.capture(volume);
                }
            }
        }
    }

    /// Persistent state of the model.
    pub fn save(&self) -> Value {
        self.model.save()
    }

    /// Restore persistent state of the model.
    pub fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        self.model.load(state)
    }
}

impl fmt::Debug for SimulationObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationObject")
            .field("domain", &self.domain())
            .field("connections", &self.connections.len())
            .field("realized", &self.realized)
            .finish()
    }
}

// ── SimulationObjectSet ────────────────────────────────────────────

/// The objects of one cell, at most one per domain.
#[derive(Debug, Default)]
pub struct SimulationObjectSet {
    objects: SmallVec<[SimulationObject; 2]>,
}

impl SimulationObjectSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object.
    pub fn insert(&mut self, object: SimulationObject) -> Result<(), CellError> {
        let domain = object.domain();
        if self.has(domain) {
            return Err(CellError::DuplicateObject(domain));
        }
        self.objects.push(object);
        Ok(())
    }

    /// Whether an object of `domain` is present.
    pub fn has(&self, domain: Domain) -> bool {
        self.objects.iter().any(|o| o.domain() == domain)
    }

    /// The object of `domain`.
    pub fn get(&self, domain: Domain) -> Option<&SimulationObject> {
        self.objects.iter().find(|o| o.domain() == domain)
    }

    /// The object of `domain`, mutably.
    pub fn get_mut(&mut self, domain: Domain) -> Option<&mut SimulationObject> {
        self.objects.iter_mut().find(|o| o.domain() == domain)
    }

    /// Every object.
    pub fn iter(&self) -> impl Iterator<Item = &SimulationObject> {
        self.objects.iter()
    }

    /// Every object, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SimulationObject> {
        self.objects.iter_mut()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Clear every object. Idempotent.
    pub fn clear(&mut self) {
        for object in &mut self.objects {
            object.clear();
        }
    }

    /// Copy evolving primitive state back into every object.
    pub(crate) fn capture(&mut self, solvers: &Solvers) {
        for object in &mut self.objects {
            object.capture(solvers);
        }
    }

    /// Power dissipated by the electrical object, if realized.
    pub fn electrical_power(&self, solvers: &Solvers) -> Option<f64> {
        let object = self.get(Domain::Electrical)?;
        let circuit = solvers.circuit(object.realized()?)?;
        match object.model() {
            ObjectModel::Electrical(m) => Some(m.dissipated_power(circuit)),
            _ => None,
        }
    }

    /// Temperature of the thermal object.
    pub fn temperature(&self, solvers: &Solvers) -> Option<f64> {
        let object = self.get(Domain::Thermal)?;
        let sim = object.realized().and_then(|i| solvers.thermal(i));
        match object.model() {
            ObjectModel::Thermal(m) => Some(m.temperature(sim)),
            _ => None,
        }
    }

    /// Add energy to the thermal object. Returns `false` without one.
    pub fn add_thermal_energy(&mut self, solvers: &mut Solvers, joules: f64) -> bool {
        let Some(object) = self.get_mut(Domain::Thermal) else {
            return false;
        };
        let sim = object.realized().and_then(|i| solvers.thermal_mut(i));
        match object.model_mut() {
            ObjectModel::Thermal(m) => {
                m.add_energy(sim, joules);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ResistorObject, ThermalMassObject};
    use cellsim_core::BlockPos;

    fn peer() -> ObjectPeer {
        ObjectPeer {
            cell: CellId::next(),
            locator: Locator::at(BlockPos::new(0, 0, -1)),
        }
    }

    #[test]
    fn duplicate_domain_is_reported() {
        let mut set = SimulationObjectSet::new();
        set.insert(SimulationObject::electrical(ResistorObject::new(1.0)))
            .unwrap();
        let err = set
            .insert(SimulationObject::electrical(ResistorObject::new(2.0)))
            .unwrap_err();
        assert_eq!(err, CellError::DuplicateObject(Domain::Electrical));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn clear_twice_equals_clear_once() {
        let mut set = SimulationObjectSet::new();
        set.insert(SimulationObject::electrical(ResistorObject::new(1.0)))
            .unwrap();
        set.insert(SimulationObject::thermal(ThermalMassObject::new(10.0, 300.0)))
            .unwrap();
        for object in set.iter_mut() {
            object.add_connection(peer());
            object.set_realized(Some(0));
        }
        set.clear();
        let once: Vec<_> = set
            .iter()
            .map(|o| (o.connections().len(), o.realized()))
            .collect();
        set.clear();
        let twice: Vec<_> = set
            .iter()
            .map(|o| (o.connections().len(), o.realized()))
            .collect();
        assert_eq!(once, twice);
        assert_eq!(once, vec![(0, None), (0, None)]);
    }

    #[test]
    #[should_panic(expected = "allowed connections")]
    fn max_connections_is_enforced() {
        let mut object =
            SimulationObject::electrical(ResistorObject::new(1.0)).with_max_connections(1);
        object.add_connection(peer());
        object.add_connection(peer());
    }

    #[test]
    fn downcast_reaches_concrete_model() {
        let object = SimulationObject::electrical(ResistorObject::new(7.0));
        assert_eq!(object.downcast_ref::<ResistorObject>().map(|r| r.resistance()), Some(7.0));
        assert!(object.downcast_ref::<ThermalMassObject>().is_none());
    }

    #[test]
    fn unrealized_thermal_object_keeps_energy_locally() {
        let mut set = SimulationObjectSet::new();
        set.insert(SimulationObject::thermal(ThermalMassObject::new(10.0, 300.0)))
            .unwrap();
        let mut solvers = Solvers::default();
        assert!(set.add_thermal_energy(&mut solvers, 100.0));
        let t = set.temperature(&solvers).unwrap();
        assert!((t - 310.0).abs() < 1e-9);
        assert_eq!(set.electrical_power(&solvers), None);
    }
}
