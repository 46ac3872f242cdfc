//! Realized solvers of one graph and the rebuild that produces them.
//!
//! A rebuild clears every object, records object connections between
//! neighbouring cells that accept each other, flood-fills each domain over
//! the cell connections restricted to cells carrying that domain, and
//! realizes one solver per connected subset. Subset membership therefore
//! never spans two graphs.

use crate::cell::Cell;
use crate::object::{ObjectModel, ObjectPeer};
use cellsim_core::{CellId, Domain, SolveStatus};
use cellsim_solver::{Circuit, DiffusionVolume, ThermalSimulator};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// A solver together with the cells it simulates.
#[derive(Debug)]
pub struct Realized<S> {
    solver: S,
    members: Vec<CellId>,
    status: SolveStatus,
}

impl<S> Realized<S> {
    fn new(solver: S, members: Vec<CellId>) -> Self {
        Self {
            solver,
            members,
            status: SolveStatus::Ok,
        }
    }

    /// The solver.
    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Cells simulated by this solver, in discovery order.
    pub fn members(&self) -> &[CellId] {
        &self.members
    }

    /// Status of the most recent build or step.
    pub fn status(&self) -> SolveStatus {
        self.status
    }
}

/// Status of one subset after a rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct SubsetReport {
    /// Domain of the subset.
    pub domain: Domain,
    /// Member cells.
    pub members: Vec<CellId>,
    /// Build status.
    pub status: SolveStatus,
}

/// Outcome of a solver rebuild.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    /// One entry per connected subset, realized or not.
    pub subsets: Vec<SubsetReport>,
}

impl BuildReport {
    /// Worst status over every subset.
    pub fn worst(&self) -> SolveStatus {
        self.subsets
            .iter()
            .fold(SolveStatus::Ok, |acc, s| acc.worst(s.status))
    }

    /// Number of subsets of `domain`.
    pub fn subset_count(&self, domain: Domain) -> usize {
        self.subsets.iter().filter(|s| s.domain == domain).count()
    }
}

/// A solver status that changed during a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Domain of the solver.
    pub domain: Domain,
    /// Index within the domain.
    pub index: usize,
    /// Status before the step.
    pub from: SolveStatus,
    /// Status after the step.
    pub to: SolveStatus,
}

// ── Solvers ────────────────────────────────────────────────────────

/// Every realized solver of one graph.
#[derive(Debug, Default)]
pub struct Solvers {
    circuits: Vec<Realized<Circuit>>,
    thermal: Vec<Realized<ThermalSimulator>>,
    diffusion: Vec<Realized<DiffusionVolume>>,
}

impl Solvers {
    /// Realized circuit `index`.
    pub fn circuit(&self, index: usize) -> Option<&Circuit> {
        self.circuits.get(index).map(|r| &r.solver)
    }

    /// Realized circuit `index`, mutably.
    pub fn circuit_mut(&mut self, index: usize) -> Option<&mut Circuit> {
        self.circuits.get_mut(index).map(|r| &mut r.solver)
    }

    /// Realized thermal simulator `index`.
    pub fn thermal(&self, index: usize) -> Option<&ThermalSimulator> {
        self.thermal.get(index).map(|r| &r.solver)
    }

    /// Realized thermal simulator `index`, mutably.
    pub fn thermal_mut(&mut self, index: usize) -> Option<&mut ThermalSimulator> {
        self.thermal.get_mut(index).map(|r| &mut r.solver)
    }

    /// Realized diffusion volume `index`.
    pub fn diffusion(&self, index: usize) -> Option<&DiffusionVolume> {
        self.diffusion.get(index).map(|r| &r.solver)
    }

    /// Realized diffusion volume `index`, mutably.
    pub fn diffusion_mut(&mut self, index: usize) -> Option<&mut DiffusionVolume> {
        self.diffusion.get_mut(index).map(|r| &mut r.solver)
    }

    /// Every realized circuit.
    pub fn circuits(&self) -> &[Realized<Circuit>] {
        &self.circuits
    }

    /// Every realized thermal simulator.
    pub fn thermal_sims(&self) -> &[Realized<ThermalSimulator>] {
        &self.thermal
    }

    /// Every realized diffusion volume.
    pub fn diffusion_volumes(&self) -> &[Realized<DiffusionVolume>] {
        &self.diffusion
    }

    /// Number of realized solvers of `domain`.
    pub fn count(&self, domain: Domain) -> usize {
        match domain {
            Domain::Electrical => self.circuits.len(),
            Domain::Thermal => self.thermal.len(),
            Domain::Diffusion => self.diffusion.len(),
        }
    }

    /// Member sets of the realized solvers of `domain`.
    pub fn partition(&self, domain: Domain) -> Vec<Vec<CellId>> {
        match domain {
            Domain::Electrical => self.circuits.iter().map(|r| r.members.clone()).collect(),
            Domain::Thermal => self.thermal.iter().map(|r| r.members.clone()).collect(),
            Domain::Diffusion => self.diffusion.iter().map(|r| r.members.clone()).collect(),
        }
    }

    /// Step every solver of `domain` by `dt` and report status changes.
    pub fn step(&mut self, domain: Domain, dt: f64) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        let mut record = |index: usize, from: SolveStatus, to: SolveStatus| {
            if from != to {
                changes.push(StatusChange {
                    domain,
                    index,
                    from,
                    to,
                });
            }
        };
        match domain {
            Domain::Electrical => {
                for (i, r) in self.circuits.iter_mut().enumerate() {
                    let to = r.solver.step();
                    record(i, r.status, to);
                    r.status = to;
                }
            }
            Domain::Thermal => {
                for (i, r) in self.thermal.iter_mut().enumerate() {
                    let to = r.solver.step(dt);
                    record(i, r.status, to);
                    r.status = to;
                }
            }
            Domain::Diffusion => {
                for (i, r) in self.diffusion.iter_mut().enumerate() {
                    let to = r.solver.step(dt);
                    record(i, r.status, to);
                    r.status = to;
                }
            }
        }
        changes
    }

    /// Solvers whose latest status is not `Ok`.
    pub fn failed_count(&self) -> usize {
        let bad = |s: SolveStatus| !s.is_ok();
        self.circuits.iter().filter(|r| bad(r.status)).count()
            + self.thermal.iter().filter(|r| bad(r.status)).count()
            + self.diffusion.iter().filter(|r| bad(r.status)).count()
    }

    /// Rebuild every solver from the current cell connections.
    ///
    /// Callers capture evolving state from the previous solvers first.
    pub(crate) fn rebuild(cells: &mut IndexMap<CellId, Cell>) -> (Solvers, BuildReport) {
        for cell in cells.values_mut() {
            cell.objects_mut().clear();
        }
        record_object_connections(cells);

        let mut solvers = Solvers::default();
        let mut report = BuildReport::default();
        for domain in Domain::ALL {
            for members in flood_fill(cells, domain) {
                let status = match domain {
                    Domain::Electrical => solvers.realize_circuit(cells, members.clone()),
                    Domain::Thermal => solvers.realize_thermal(cells, members.clone()),
                    Domain::Diffusion => solvers.realize_diffusion(cells, members.clone()),
                };
                report.subsets.push(SubsetReport {
                    domain,
                    members,
                    status,
                });
            }
        }
        (solvers, report)
    }

    fn realize_circuit(
        &mut self,
        cells: &mut IndexMap<CellId, Cell>,
        members: Vec<CellId>,
    ) -> SolveStatus {
        let index = self.circuits.len();
        let mut circuit = Circuit::new();
        for id in &members {
            let Some(object) = cells
                .get_mut(id)
                .and_then(|c| c.objects_mut().get_mut(Domain::Electrical))
            else {
                continue;
            };
            if let (ObjectModel::Electrical(m), peers) = object.parts_mut() {
                m.add_components(&mut circuit, peers);
            }
            object.set_realized(Some(index));
        }
        for (a, b) in member_edges(cells, &members, Domain::Electrical) {
            let (Some(ca), Some(cb)) = (cells.get(&a.cell), cells.get(&b.cell)) else {
                continue;
            };
            let (Some(ma), Some(mb)) = (
                ca.objects().get(Domain::Electrical).and_then(|o| o.as_electrical()),
                cb.objects().get(Domain::Electrical).and_then(|o| o.as_electrical()),
            ) else {
                continue;
            };
            if let (Some(pa), Some(pb)) = (
                ma.offer_component(&a.locator, &b),
                mb.offer_component(&b.locator, &a),
            ) {
                circuit.connect(pa, pb);
            }
        }
        let mut candidate = None;
        for id in &members {
            let Some(object) = cells
                .get_mut(id)
                .and_then(|c| c.objects_mut().get_mut(Domain::Electrical))
            else {
                continue;
            };
            if let ObjectModel::Electrical(m) = object.model_mut() {
                m.build(&mut circuit);
                if candidate.is_none() {
                    candidate = m.ground_candidate();
                }
            }
        }

        let mut status = SolveStatus::Ok;
        if circuit.is_floating() {
            if let Some(pin) = candidate {
                debug!(?pin, "grounding floating circuit");
                circuit.ground(pin);
            }
            if circuit.is_floating() {
                warn!(
                    members = members.len(),
                    "circuit has no ground reference; potentials are relative"
                );
                status = SolveStatus::Unconstrained;
            }
        }
        let mut realized = Realized::new(circuit, members);
        realized.status = status;
        self.circuits.push(realized);
        status
    }

    fn realize_thermal(
        &mut self,
        cells: &mut IndexMap<CellId, Cell>,
        members: Vec<CellId>,
    ) -> SolveStatus {
        let index = self.thermal.len();
        let mut sim = ThermalSimulator::new();
        for id in &members {
            let Some(object) = cells
                .get_mut(id)
                .and_then(|c| c.objects_mut().get_mut(Domain::Thermal))
            else {
                continue;
            };
            if let ObjectModel::Thermal(m) = object.model_mut() {
                m.add_bodies(&mut sim);
            }
            object.set_realized(Some(index));
        }
        for (a, b) in member_edges(cells, &members, Domain::Thermal) {
            let (Some(ca), Some(cb)) = (cells.get(&a.cell), cells.get(&b.cell)) else {
                continue;
            };
            let (Some(ma), Some(mb)) = (
                ca.objects().get(Domain::Thermal).and_then(|o| o.as_thermal()),
                cb.objects().get(Domain::Thermal).and_then(|o| o.as_thermal()),
            ) else {
                continue;
            };
            if let (Some((ba, ga)), Some((bb, gb))) =
                (ma.offer_body(&a.locator, &b), mb.offer_body(&b.locator, &a))
            {
                sim.connect(ba, bb, series(ga, gb));
            }
        }
        self.thermal.push(Realized::new(sim, members));
        SolveStatus::Ok
    }

    fn realize_diffusion(
        &mut self,
        cells: &mut IndexMap<CellId, Cell>,
        members: Vec<CellId>,
    ) -> SolveStatus {
        let index = self.diffusion.len();
        let Some(first) = members
            .first()
            .and_then(|id| cells.get(id))
            .and_then(|c| c.objects().get(Domain::Diffusion))
            .and_then(|o| o.as_diffusion())
        else {
            return SolveStatus::ConfigurationError;
        };
        let mut volume = DiffusionVolume::new(first.patch().resolution(), first.diffusivity());
        for id in &members {
            let Some(object) = cells
                .get_mut(id)
                .and_then(|c| c.objects_mut().get_mut(Domain::Diffusion))
            else {
                continue;
            };
            if let ObjectModel::Diffusion(m) = object.model_mut() {
                m.add_patch(&mut volume);
            }
            object.set_realized(Some(index));
        }
        for (a, b) in member_edges(cells, &members, Domain::Diffusion) {
            let (Some(ca), Some(cb)) = (cells.get(&a.cell), cells.get(&b.cell)) else {
                continue;
            };
            let (Some(ma), Some(mb)) = (
                ca.objects().get(Domain::Diffusion).and_then(|o| o.as_diffusion()),
                cb.objects().get(Domain::Diffusion).and_then(|o| o.as_diffusion()),
            ) else {
                continue;
            };
            if let (Some(pa), Some(pb)) =
                (ma.offer_patch(&a.locator, &b), mb.offer_patch(&b.locator, &a))
            {
                volume.connect(pa, pb);
            }
        }
        if let Err(leak) = volume.build() {
            warn!(%leak, members = members.len(), "diffusion volume is not sealed");
            for id in &members {
                if let Some(object) = cells
                    .get_mut(id)
                    .and_then(|c| c.objects_mut().get_mut(Domain::Diffusion))
                {
                    object.set_realized(None);
                }
            }
            return SolveStatus::ConfigurationError;
        }
        self.diffusion.push(Realized::new(volume, members));
        SolveStatus::Ok
    }
}

/// Conductance of two contacts in series.
fn series(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    a * b / (a + b)
}

// ── Topology helpers ───────────────────────────────────────────────

/// Record an object connection for every neighbouring pair whose objects
/// of one domain accept each other.
fn record_object_connections(cells: &mut IndexMap<CellId, Cell>) {
    let mut links: Vec<(Domain, ObjectPeer, ObjectPeer)> = Vec::new();
    for cell in cells.values() {
        for remote_id in cell.connections() {
            if cell.id() >= *remote_id {
                continue;
            }
            let Some(remote) = cells.get(remote_id) else {
                continue;
            };
            for domain in Domain::ALL {
                if objects_accept(cell, remote, domain) {
                    links.push((domain, peer_of(cell), peer_of(remote)));
                }
            }
        }
    }
    for (domain, a, b) in links {
        if let Some(object) = cells
            .get_mut(&a.cell)
            .and_then(|c| c.objects_mut().get_mut(domain))
        {
            object.add_connection(b.clone());
        }
        if let Some(object) = cells
            .get_mut(&b.cell)
            .and_then(|c| c.objects_mut().get_mut(domain))
        {
            object.add_connection(a);
        }
    }
}

fn peer_of(cell: &Cell) -> ObjectPeer {
    ObjectPeer {
        cell: cell.id(),
        locator: cell.locator().clone(),
    }
}

fn objects_accept(a: &Cell, b: &Cell, domain: Domain) -> bool {
    let (Some(oa), Some(ob)) = (a.objects().get(domain), b.objects().get(domain)) else {
        return false;
    };
    oa.accepts_remote(a.locator(), b.locator())
        && ob.accepts_remote(b.locator(), a.locator())
        && compatible(a, b, domain)
}

/// Diffusion objects must also agree on fluid and resolution.
fn compatible(a: &Cell, b: &Cell, domain: Domain) -> bool {
    if domain != Domain::Diffusion {
        return true;
    }
    let (Some(ma), Some(mb)) = (
        a.objects().get(domain).and_then(|o| o.as_diffusion()),
        b.objects().get(domain).and_then(|o| o.as_diffusion()),
    ) else {
        return false;
    };
    ma.is_compatible_with(mb) && mb.is_compatible_with(ma)
}

/// Connected subsets of cells carrying `domain`, following cell
/// connections between carriers.
fn flood_fill(cells: &IndexMap<CellId, Cell>, domain: Domain) -> Vec<Vec<CellId>> {
    let mut visited: IndexSet<CellId> = IndexSet::new();
    let mut subsets = Vec::new();
    for (id, cell) in cells {
        if visited.contains(id) || !cell.objects().has(domain) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::from([*id]);
        visited.insert(*id);
        while let Some(current) = queue.pop_front() {
            members.push(current);
            let Some(cell) = cells.get(&current) else {
                continue;
            };
            for next in cell.connections() {
                if visited.contains(next) {
                    continue;
                }
                let Some(remote) = cells.get(next) else {
                    continue;
                };
                if remote.objects().has(domain) && compatible(cell, remote, domain) {
                    visited.insert(*next);
                    queue.push_back(*next);
                }
            }
        }
        subsets.push(members);
    }
    subsets
}

/// Object edges among `members`, each reported once.
fn member_edges(
    cells: &IndexMap<CellId, Cell>,
    members: &[CellId],
    domain: Domain,
) -> Vec<(ObjectPeer, ObjectPeer)> {
    let mut edges = Vec::new();
    for id in members {
        let Some(cell) = cells.get(id) else {
            continue;
        };
        let Some(object) = cell.objects().get(domain) else {
            continue;
        };
        for peer in object.connections() {
            if *id < peer.cell {
                edges.push((peer_of(cell), peer.clone()));
            }
        }
    }
    edges
}
