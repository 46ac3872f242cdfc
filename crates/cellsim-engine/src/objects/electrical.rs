use crate::object::{ElectricalModel, ObjectPeer};
use cellsim_core::{CellId, Locator, Pole, PoleMap};
use cellsim_solver::{Circuit, ComponentId, Pin};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Smallest resistance a stock part will realize, in Ω.
const MIN_RESISTANCE: f64 = 1e-6;

fn pole_pin(component: ComponentId, pole: Pole) -> Pin {
    match pole {
        Pole::Plus => component.positive(),
        Pole::Minus => component.negative(),
    }
}

// ── Resistor ───────────────────────────────────────────────────────

/// A two-terminal resistive load.
///
/// The terminals sit on the sides named by its [`PoleMap`]; neighbours on
/// any other side are accepted as object connections but left unwired.
#[derive(Debug)]
pub struct ResistorObject {
    resistance: f64,
    poles: PoleMap,
    component: Option<ComponentId>,
}

#[derive(Serialize, Deserialize)]
struct ResistorState {
    resistance: f64,
}

impl ResistorObject {
    /// A resistor with terminals front and back.
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance: resistance.max(MIN_RESISTANCE),
            poles: PoleMap::FRONT_BACK,
            component: None,
        }
    }

    /// Put the terminals on other sides.
    pub fn with_poles(mut self, poles: PoleMap) -> Self {
        self.poles = poles;
        self
    }

    /// Resistance in Ω.
    pub fn resistance(&self) -> f64 {
        self.resistance
    }

    /// Change the resistance, updating `circuit` when realized.
    pub fn set_resistance(&mut self, resistance: f64, circuit: Option<&mut Circuit>) {
        self.resistance = resistance.max(MIN_RESISTANCE);
        if let (Some(circuit), Some(id)) = (circuit, self.component) {
            circuit.set_resistance(id, self.resistance);
        }
    }

    /// Current through the resistor, from the positive terminal.
    pub fn current(&self, circuit: &Circuit) -> f64 {
        self.component.map_or(0.0, |id| circuit.current(id))
    }
}

impl ElectricalModel for ResistorObject {
    fn add_components(&mut self, circuit: &mut Circuit, _peers: &[ObjectPeer]) {
        self.component = Some(circuit.add_resistor(self.resistance));
    }

    fn offer_component(&self, local: &Locator, peer: &ObjectPeer) -> Option<Pin> {
        let pole = self.poles.evaluate(local, &peer.locator)?;
        Some(pole_pin(self.component?, pole))
    }

    fn clear(&mut self) {
        self.component = None;
    }

    fn dissipated_power(&self, circuit: &Circuit) -> f64 {
        self.component.map_or(0.0, |id| circuit.power(id))
    }

    fn save(&self) -> Value {
        serde_json::to_value(ResistorState {
            resistance: self.resistance,
        })
        .unwrap_or(Value::Null)
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        let state: ResistorState = serde_json::from_value(state)?;
        self.resistance = state.resistance.max(MIN_RESISTANCE);
        Ok(())
    }
}

// ── Voltage source ─────────────────────────────────────────────────

/// An ideal source in series with an internal resistance.
///
/// The negative terminal of the source is offered as the ground point of
/// a floating circuit.
#[derive(Debug)]
pub struct VoltageSourceObject {
    potential: f64,
    resistance: f64,
    poles: PoleMap,
    source: Option<ComponentId>,
    series: Option<ComponentId>,
}

#[derive(Serialize, Deserialize)]
struct SourceState {
    potential: f64,
    resistance: f64,
}

impl VoltageSourceObject {
    /// A source of `potential` volts with `resistance` Ω internal
    /// resistance.
    pub fn new(potential: f64, resistance: f64) -> Self {
        Self {
            potential,
            resistance: resistance.max(MIN_RESISTANCE),
            poles: PoleMap::FRONT_BACK,
            source: None,
            series: None,
        }
    }

    /// Put the terminals on other sides.
    pub fn with_poles(mut self, poles: PoleMap) -> Self {
        self.poles = poles;
        self
    }

    /// Open-circuit potential in V.
    pub fn potential(&self) -> f64 {
        self.potential
    }

    /// Change the potential, updating `circuit` when realized.
    pub fn set_potential(&mut self, potential: f64, circuit: Option<&mut Circuit>) {
        self.potential = potential;
        if let (Some(circuit), Some(id)) = (circuit, self.source) {
            circuit.set_potential(id, potential);
        }
    }

    /// Current delivered from the positive terminal.
    pub fn current(&self, circuit: &Circuit) -> f64 {
        self.source.map_or(0.0, |id| circuit.current(id))
    }

    /// Potential across the external terminals.
    pub fn terminal_voltage(&self, circuit: &Circuit) -> f64 {
        match (self.source, self.series) {
            (Some(source), Some(series)) => {
                circuit.pin_potential(series.positive()) - circuit.pin_potential(source.negative())
            }
            _ => 0.0,
        }
    }
}

impl ElectricalModel for VoltageSourceObject {
    fn add_components(&mut self, circuit: &mut Circuit, _peers: &[ObjectPeer]) {
        let source = circuit.add_voltage_source(self.potential);
        let series = circuit.add_resistor(self.resistance);
        circuit.connect(source.positive(), series.negative());
        self.source = Some(source);
        self.series = Some(series);
    }

    fn offer_component(&self, local: &Locator, peer: &ObjectPeer) -> Option<Pin> {
        match self.poles.evaluate(local, &peer.locator)? {
            Pole::Plus => Some(self.series?.positive()),
            Pole::Minus => Some(self.source?.negative()),
        }
    }

    fn clear(&mut self) {
        self.source = None;
        self.series = None;
    }

    fn ground_candidate(&self) -> Option<Pin> {
        self.source.map(ComponentId::negative)
    }

    fn dissipated_power(&self, circuit: &Circuit) -> f64 {
        self.series.map_or(0.0, |id| circuit.power(id))
    }

    fn save(&self) -> Value {
        serde_json::to_value(SourceState {
            potential: self.potential,
            resistance: self.resistance,
        })
        .unwrap_or(Value::Null)
    }

    fn load(&mut self, state: Value) -> Result<(), serde_json::Error> {
        let state: SourceState = serde_json::from_value(state)?;
        self.potential = state.potential;
        self.resistance = state.resistance.max(MIN_RESISTANCE);
        Ok(())
    }
}

// ── Ground ─────────────────────────────────────────────────────────

/// A resistive tie from every neighbour to the ground reference.
#[derive(Debug)]
pub struct GroundObject {
    resistance: f64,
    component: Option<ComponentId>,
}

impl GroundObject {
    /// A ground tie of `resistance` Ω.
    pub fn new(resistance: f64) -> Self {
        Self {
            resistance: resistance.max(MIN_RESISTANCE),
            component: None,
        }
    }

    /// Current flowing into ground.
    pub fn current(&self, circuit: &Circuit) -> f64 {
        self.component.map_or(0.0, |id| circuit.current(id))
    }
}

impl ElectricalModel for GroundObject {
    fn add_components(&mut self, circuit: &mut Circuit, _peers: &[ObjectPeer]) {
        self.component = Some(circuit.add_resistor(self.resistance));
    }

    fn offer_component(&self, _local: &Locator, _peer: &ObjectPeer) -> Option<Pin> {
        self.component.map(ComponentId::positive)
    }

    fn build(&mut self, circuit: &mut Circuit) {
        if let Some(id) = self.component {
            circuit.ground(id.negative());
        }
    }

    fn clear(&mut self) {
        self.component = None;
    }

    fn dissipated_power(&self, circuit: &Circuit) -> f64 {
        self.component.map_or(0.0, |id| circuit.power(id))
    }
}

// ── Wire ───────────────────────────────────────────────────────────

/// A junction joining every neighbour through one resistor each.
///
/// Each neighbour gets a resistor from its side to a shared internal node,
/// so the wire's resistance between two neighbours is twice the per-arm
/// value.
#[derive(Debug)]
pub struct WireObject {
    arm_resistance: f64,
    arms: Vec<(CellId, ComponentId)>,
}

impl WireObject {
    /// A wire whose arms each have `arm_resistance` Ω.
    pub fn new(arm_resistance: f64) -> Self {
        Self {
            arm_resistance: arm_resistance.max(MIN_RESISTANCE),
            arms: Vec::new(),
        }
    }

    /// Number of realized arms.
    pub fn arm_count(&self) -> usize {
        self.arms.len()
    }
}

impl ElectricalModel for WireObject {
    fn add_components(&mut self, circuit: &mut Circuit, peers: &[ObjectPeer]) {
        self.arms = peers
            .iter()
            .map(|p| (p.cell, circuit.add_resistor(self.arm_resistance)))
            .collect();
    }

    fn offer_component(&self, _local: &Locator, peer: &ObjectPeer) -> Option<Pin> {
        self.arms
            .iter()
            .find(|(cell, _)| *cell == peer.cell)
            .map(|(_, id)| id.positive())
    }

    fn build(&mut self, circuit: &mut Circuit) {
        let Some((_, hub)) = self.arms.first() else {
            return;
        };
        let hub = hub.negative();
        for (_, arm) in self.arms.iter().skip(1) {
            circuit.connect(hub, arm.negative());
        }
    }

    fn clear(&mut self) {
        self.arms.clear();
    }

    fn dissipated_power(&self, circuit: &Circuit) -> f64 {
        self.arms.iter().map(|(_, id)| circuit.power(*id)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsim_core::BlockPos;

    fn peer_at(x: i32, y: i32, z: i32) -> ObjectPeer {
        ObjectPeer {
            cell: CellId::next(),
            locator: Locator::at(BlockPos::new(x, y, z)),
        }
    }

    #[test]
    fn resistor_offers_by_pole() {
        let mut circuit = Circuit::new();
        let mut r = ResistorObject::new(2.0);
        r.add_components(&mut circuit, &[]);
        let local = Locator::at(BlockPos::new(0, 0, 0));
        let front = r.offer_component(&local, &peer_at(0, 0, -1)).unwrap();
        let back = r.offer_component(&local, &peer_at(0, 0, 1)).unwrap();
        assert_eq!(front.index, 0);
        assert_eq!(back.index, 1);
        assert!(r.offer_component(&local, &peer_at(1, 0, 0)).is_none());
        // Offers are stable within one build.
        assert_eq!(r.offer_component(&local, &peer_at(0, 0, -1)), Some(front));
    }

    #[test]
    fn cleared_resistor_offers_nothing() {
        let mut circuit = Circuit::new();
        let mut r = ResistorObject::new(2.0);
        r.add_components(&mut circuit, &[]);
        r.clear();
        let local = Locator::at(BlockPos::new(0, 0, 0));
        assert!(r.offer_component(&local, &peer_at(0, 0, -1)).is_none());
    }

    #[test]
    fn source_drives_ground_tie() {
        let mut circuit = Circuit::new();
        let mut source = VoltageSourceObject::new(12.0, 1.0);
        let mut ground = GroundObject::new(5.0);
        source.add_components(&mut circuit, &[]);
        ground.add_components(&mut circuit, &[]);
        ground.build(&mut circuit);
        let local = Locator::at(BlockPos::new(0, 0, 0));
        let plus = source
            .offer_component(&local, &peer_at(0, 0, -1))
            .unwrap();
        let minus = source.offer_component(&local, &peer_at(0, 0, 1)).unwrap();
        let tie = ground.offer_component(&local, &peer_at(0, 0, 0)).unwrap();
        circuit.connect(plus, tie);
        circuit.ground(minus);
        circuit.step();
        assert!((ground.current(&circuit) - 2.0).abs() < 1e-9);
        assert!((source.current(&circuit) - 2.0).abs() < 1e-9);
        assert!((source.dissipated_power(&circuit) - 4.0).abs() < 1e-9);
        assert!((source.terminal_voltage(&circuit) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn wire_joins_its_arms() {
        let mut circuit = Circuit::new();
        let peers = [peer_at(1, 0, 0), peer_at(-1, 0, 0), peer_at(0, 1, 0)];
        let mut wire = WireObject::new(0.5);
        wire.add_components(&mut circuit, &peers);
        wire.build(&mut circuit);
        assert_eq!(wire.arm_count(), 3);
        assert_eq!(circuit.component_count(), 3);
        let local = Locator::at(BlockPos::new(0, 0, 0));
        for p in &peers {
            assert!(wire.offer_component(&local, p).is_some());
        }
        wire.clear();
        assert_eq!(wire.arm_count(), 0);
    }

    #[test]
    fn source_state_survives_save_load() {
        let mut a = VoltageSourceObject::new(24.0, 0.5);
        a.set_potential(30.0, None);
        let mut b = VoltageSourceObject::new(0.0, 1.0);
        b.load(a.save()).unwrap();
        assert_eq!(b.potential(), 30.0);
    }
}
