//! Lumped circuit solved by modified nodal analysis.
//!
//! Components are two-pin primitives. Pins are joined into nets with
//! [`Circuit::connect`], which is idempotent, so both endpoints of a cell
//! edge may connect the pins they offered each other without coordination.
//!
//! A circuit is *floating* when some electrically connected group of nets
//! has no grounded pin. Such groups are solved against an implicit
//! reference (their lowest net held at 0 V) and [`Circuit::step`] reports
//! [`SolveStatus::Unconstrained`].

use crate::error::SingularMatrix;
use crate::linear::DenseSystem;
use cellsim_core::SolveStatus;
use std::fmt;

/// Handle of a component within one [`Circuit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(usize);

impl ComponentId {
    /// Pin `index` (0 or 1) of this component.
    pub fn pin(self, index: usize) -> Pin {
        debug_assert!(index < 2, "components have two pins");
        Pin {
            component: self,
            index,
        }
    }

    /// Positive pin of a voltage source, or the first pin of a resistor.
    pub fn positive(self) -> Pin {
        self.pin(0)
    }

    /// Negative pin of a voltage source, or the second pin of a resistor.
    pub fn negative(self) -> Pin {
        self.pin(1)
    }
}

/// A terminal of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pin {
    /// The owning component.
    pub component: ComponentId,
    /// 0 or 1.
    pub index: usize,
}

impl Pin {
    fn slot(self) -> usize {
        self.component.0 * 2 + self.index
    }
}

#[derive(Clone, Copy, Debug)]
enum ComponentKind {
    Resistor { resistance: f64 },
    VoltageSource { potential: f64 },
}

/// Solved layout of nets, rebuilt after any connectivity change.
#[derive(Default)]
struct Topology {
    /// Unknown index per pin slot; `None` for grounded or reference nets.
    unknown: Vec<Option<usize>>,
    unknown_count: usize,
    floating: bool,
}

/// A circuit of resistors and ideal voltage sources.
#[derive(Default)]
pub struct Circuit {
    components: Vec<ComponentKind>,
    parent: Vec<usize>,
    grounded: Vec<usize>,
    topology: Option<Topology>,
    potentials: Vec<f64>,
    source_currents: Vec<f64>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resistor of `resistance` ohms.
    pub fn add_resistor(&mut self, resistance: f64) -> ComponentId {
        self.push(ComponentKind::Resistor { resistance })
    }

    /// Add an ideal voltage source holding `potential` volts between its
    /// positive (pin 0) and negative (pin 1) terminals.
    pub fn add_voltage_source(&mut self, potential: f64) -> ComponentId {
        self.push(ComponentKind::VoltageSource { potential })
    }

    fn push(&mut self, kind: ComponentKind) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.components.push(kind);
        let base = self.parent.len();
        self.parent.extend([base, base + 1]);
        self.potentials.extend([0.0, 0.0]);
        self.source_currents.push(0.0);
        self.topology = None;
        id
    }

    /// Join two pins into one net. Connecting already joined pins is a no-op.
    pub fn connect(&mut self, a: Pin, b: Pin) {
        let ra = self.find(a.slot());
        let rb = self.find(b.slot());
        if ra != rb {
            self.parent[ra] = rb;
            self.topology = None;
        }
    }

    /// Tie a pin's net to the 0 V reference.
    pub fn ground(&mut self, pin: Pin) {
        let slot = pin.slot();
        if !self.grounded.contains(&slot) {
            self.grounded.push(slot);
            self.topology = None;
        }
    }

    /// Whether any pin is grounded.
    pub fn is_grounded(&self) -> bool {
        !self.grounded.is_empty()
    }

    /// Whether some connected group of nets lacks a ground.
    pub fn is_floating(&mut self) -> bool {
        self.topology().floating
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Change a resistor's resistance. Ignored for other components.
    pub fn set_resistance(&mut self, id: ComponentId, resistance: f64) {
        if let Some(ComponentKind::Resistor { resistance: r }) = self.components.get_mut(id.0) {
            *r = resistance;
        }
    }

    /// Change a voltage source's potential. Ignored for other components.
    pub fn set_potential(&mut self, id: ComponentId, potential: f64) {
        if let Some(ComponentKind::VoltageSource { potential: v }) = self.components.get_mut(id.0)
        {
            *v = potential;
        }
    }

    /// Potential of a pin after the last successful step.
    pub fn pin_potential(&self, pin: Pin) -> f64 {
        self.potentials.get(pin.slot()).copied().unwrap_or(0.0)
    }

    /// Voltage across a component (pin 0 minus pin 1).
    pub fn voltage(&self, id: ComponentId) -> f64 {
        self.pin_potential(id.pin(0)) - self.pin_potential(id.pin(1))
    }

    /// Current through a component. For resistors it flows from pin 0 to
    /// pin 1; for sources it is the current delivered out of the positive
    /// terminal.
    pub fn current(&self, id: ComponentId) -> f64 {
        match self.components.get(id.0) {
            Some(ComponentKind::Resistor { resistance }) => self.voltage(id) / resistance,
            Some(ComponentKind::VoltageSource { .. }) => -self.source_currents[id.0],
            None => 0.0,
        }
    }

    /// Power dissipated by a resistor, or delivered by a source.
    pub fn power(&self, id: ComponentId) -> f64 {
        self.voltage(id) * self.current(id)
    }

    /// Solve the circuit for the current component values.
    pub fn step(&mut self) -> SolveStatus {
        match self.solve() {
            Ok(floating) if floating => SolveStatus::Unconstrained,
            Ok(_) => SolveStatus::Ok,
            Err(_) => SolveStatus::NumericFailure,
        }
    }

    fn solve(&mut self) -> Result<bool, SingularMatrix> {
        let topology = self.topology();
        let floating = topology.floating;
        let n = topology.unknown_count;
        let unknown = topology.unknown.clone();

        let mut sources = Vec::new();
        let mut source_row = vec![None; self.components.len()];
        for (i, kind) in self.components.iter().enumerate() {
            if let ComponentKind::VoltageSource { .. } = kind {
                source_row[i] = Some(n + sources.len());
                sources.push(i);
            }
        }
        let size = n + sources.len();
        if size == 0 {
            return Ok(floating);
        }

        let mut system = DenseSystem::zeros(size);
        for (i, kind) in self.components.iter().enumerate() {
            let (a, b) = (unknown[i * 2], unknown[i * 2 + 1]);
            match *kind {
                ComponentKind::Resistor { resistance } => {
                    if !(resistance.is_finite() && resistance > 0.0) {
                        return Err(SingularMatrix {
                            column: i,
                            pivot: resistance,
                        });
                    }
                    let g = 1.0 / resistance;
                    if let Some(a) = a {
                        system.add(a, a, g);
                    }
                    if let Some(b) = b {
                        system.add(b, b, g);
                    }
                    if let (Some(a), Some(b)) = (a, b) {
                        system.add(a, b, -g);
                        system.add(b, a, -g);
                    }
                }
                ComponentKind::VoltageSource { potential } => {
                    let Some(row) = source_row[i] else { continue };
                    if let Some(a) = a {
                        system.add(a, row, 1.0);
                        system.add(row, a, 1.0);
                    }
                    if let Some(b) = b {
                        system.add(b, row, -1.0);
                        system.add(row, b, -1.0);
                    }
                    system.add_rhs(row, potential);
                }
            }
        }

        let x = system.solve()?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(SingularMatrix {
                column: 0,
                pivot: f64::NAN,
            });
        }
        for (slot, u) in unknown.iter().enumerate() {
            self.potentials[slot] = u.map_or(0.0, |u| x[u]);
        }
        for (k, s) in sources.iter().enumerate() {
            self.source_currents[*s] = x[n + k];
        }
        Ok(floating)
    }

    fn find(&mut self, mut slot: usize) -> usize {
        while self.parent[slot] != slot {
            self.parent[slot] = self.parent[self.parent[slot]];
            slot = self.parent[slot];
        }
        slot
    }

    fn topology(&mut self) -> &Topology {
        if self.topology.is_none() {
            let built = self.build_topology();
            self.topology = Some(built);
        }
        self.topology.get_or_insert_with(Topology::default)
    }

    fn build_topology(&mut self) -> Topology {
        let slots = self.parent.len();
        let roots: Vec<usize> = (0..slots).map(|s| self.find(s)).collect();
        let grounded_roots: Vec<usize> = self.grounded.iter().map(|s| roots[*s]).collect();

        // Group nets joined through components; a group is referenced when
        // it contains a grounded net.
        let mut group: Vec<usize> = (0..slots).collect();
        fn find_group(group: &mut [usize], mut x: usize) -> usize {
            while group[x] != x {
                group[x] = group[group[x]];
                x = group[x];
            }
            x
        }
        for c in 0..self.components.len() {
            let ga = find_group(&mut group, roots[c * 2]);
            let gb = find_group(&mut group, roots[c * 2 + 1]);
            if ga != gb {
                group[ga] = gb;
            }
        }

        let mut referenced: Vec<Option<usize>> = vec![None; slots];
        for root in &grounded_roots {
            let g = find_group(&mut group, *root);
            referenced[g] = Some(*root);
        }

        let mut floating = false;
        for root in roots.iter().copied() {
            let g = find_group(&mut group, root);
            if referenced[g].is_none() {
                // Lowest net of the group becomes its implicit reference.
                referenced[g] = Some(root);
                floating = true;
            }
        }

        let mut unknown_of_root: Vec<Option<usize>> = vec![None; slots];
        let mut unknown_count = 0;
        let mut unknown = Vec::with_capacity(slots);
        for root in roots.iter().copied() {
            let g = find_group(&mut group, root);
            let is_reference =
                grounded_roots.contains(&root) || referenced[g] == Some(root);
            if is_reference {
                unknown.push(None);
                continue;
            }
            let u = *unknown_of_root[root].get_or_insert_with(|| {
                unknown_count += 1;
                unknown_count - 1
            });
            unknown.push(Some(u));
        }

        Topology {
            unknown,
            unknown_count,
            floating,
        }
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("components", &self.components.len())
            .field("grounded", &self.grounded.len())
            .field("built", &self.topology.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Source feeding two series resistors: `+ -> r1 -> r2 -> -`.
    fn divider(v: f64, r1: f64, r2: f64) -> (Circuit, ComponentId, ComponentId, ComponentId) {
        let mut c = Circuit::new();
        let src = c.add_voltage_source(v);
        let a = c.add_resistor(r1);
        let b = c.add_resistor(r2);
        c.connect(src.positive(), a.pin(0));
        c.connect(a.pin(1), b.pin(0));
        c.connect(b.pin(1), src.negative());
        (c, src, a, b)
    }

    #[test]
    fn solves_divider() {
        let (mut c, src, a, b) = divider(10.0, 1.0, 4.0);
        c.ground(src.negative());
        assert!(!c.is_floating());
        assert_eq!(c.step(), SolveStatus::Ok);
        assert!(approx(c.current(a), 2.0));
        assert!(approx(c.voltage(b), 8.0));
        assert!(approx(c.pin_potential(src.positive()), 10.0));
        assert!(approx(c.power(a), 4.0));
        assert!(approx(c.power(src), 20.0));
    }

    #[test]
    fn floating_circuit_still_solves() {
        let (mut c, _src, a, _b) = divider(10.0, 1.0, 4.0);
        assert!(c.is_floating());
        assert_eq!(c.step(), SolveStatus::Unconstrained);
        assert!(approx(c.current(a), 2.0));
    }

    #[test]
    fn connect_is_idempotent() {
        let (mut c, src, a, _b) = divider(5.0, 1.0, 1.0);
        c.connect(src.positive(), a.pin(0));
        c.connect(a.pin(0), src.positive());
        c.ground(src.negative());
        c.ground(src.negative());
        assert_eq!(c.step(), SolveStatus::Ok);
        assert!(approx(c.current(a), 2.5));
    }

    #[test]
    fn shorted_source_is_numeric_failure() {
        let mut c = Circuit::new();
        let src = c.add_voltage_source(1.0);
        c.connect(src.positive(), src.negative());
        c.ground(src.negative());
        assert_eq!(c.step(), SolveStatus::NumericFailure);
    }

    #[test]
    fn zero_resistance_is_numeric_failure() {
        let (mut c, src, a, _b) = divider(5.0, 1.0, 1.0);
        c.ground(src.negative());
        c.set_resistance(a, 0.0);
        assert_eq!(c.step(), SolveStatus::NumericFailure);
    }

    #[test]
    fn set_potential_takes_effect() {
        let (mut c, src, a, _b) = divider(10.0, 1.0, 4.0);
        c.ground(src.negative());
        c.set_potential(src, 5.0);
        assert_eq!(c.step(), SolveStatus::Ok);
        assert!(approx(c.current(a), 1.0));
    }

    #[test]
    fn lone_resistor_is_floating() {
        let mut c = Circuit::new();
        let r = c.add_resistor(10.0);
        assert!(c.is_floating());
        assert_eq!(c.step(), SolveStatus::Unconstrained);
        assert!(approx(c.current(r), 0.0));
    }

    #[test]
    fn empty_circuit_is_ok() {
        let mut c = Circuit::new();
        assert!(!c.is_floating());
        assert_eq!(c.step(), SolveStatus::Ok);
    }
}
