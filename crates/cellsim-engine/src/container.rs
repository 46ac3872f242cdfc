//! The host side of cell placement.
//!
//! A [`CellContainer`] owns the spatial layout: it knows which cells are
//! placed where and which of them are candidate neighbours of a cell.
//! Mutual acceptance is decided by the cells themselves, after the scan.
//!
//! For face-mounted cells (locators with a block and a face facet, the
//! face being the normal pointing away from the supporting block) the
//! [`planar_scan`] and [`wrapped_scan`] helpers implement the two usual
//! adjacency schemes over a host [`ContainerLookup`].

use cellsim_core::{BlockPos, CellId, Direction, Locator};

/// A candidate neighbour returned by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborInfo {
    /// The neighbouring cell.
    pub cell: CellId,
    /// Its locator.
    pub locator: Locator,
}

/// Host that places cells.
///
/// Callbacks run on the control thread while the affected graphs are
/// stopped.
pub trait CellContainer: Send + Sync {
    /// Every cell currently placed in this container.
    fn cells(&self) -> Vec<(CellId, Locator)>;

    /// Candidate neighbours of `cell` at `locator`. May include cells of
    /// other containers.
    fn neighbor_scan(&self, cell: CellId, locator: &Locator) -> Vec<NeighborInfo>;

    /// An edge from `cell` to `remote` was recorded.
    fn on_cell_connected(&self, _cell: CellId, _remote: CellId) {}

    /// The edge from `cell` to `remote` was erased.
    fn on_cell_disconnected(&self, _cell: CellId, _remote: CellId) {}

    /// A topology change touching this container has completed.
    fn on_topology_changed(&self) {}

    /// A cell of this container was restored from a save.
    fn on_cell_loaded(&self, _cell: CellId, _locator: &Locator) {}
}

/// Block-indexed view of placed cells.
pub trait ContainerLookup {
    /// Cells whose block facet is `pos`.
    fn cells_at(&self, pos: BlockPos) -> Vec<(CellId, Locator)>;
}

/// Cells on the same face of the block next to `locator` in direction
/// `search`.
///
/// # Panics
///
/// Panics if `locator` lacks a block or face facet.
pub fn planar_scan(
    lookup: &impl ContainerLookup,
    cell: CellId,
    locator: &Locator,
    search: Direction,
) -> Vec<NeighborInfo> {
    let face = locator.require_face();
    let target = locator.require_block().offset(search);
    matching(lookup, cell, target, face)
}

/// Cells mounted around the edge of the supporting block: on the block
/// diagonally below-and-beside `locator`, facing `search`.
///
/// # Panics
///
/// Panics if `locator` lacks a block or face facet.
pub fn wrapped_scan(
    lookup: &impl ContainerLookup,
    cell: CellId,
    locator: &Locator,
    search: Direction,
) -> Vec<NeighborInfo> {
    let face = locator.require_face();
    let target = locator
        .require_block()
        .offset(search)
        .offset(face.opposite());
    matching(lookup, cell, target, search)
}

/// Planar and wrapped scans over every direction perpendicular to the
/// face, deduplicated.
///
/// # Panics
///
/// Panics if `locator` lacks a block or face facet.
pub fn face_scan(
    lookup: &impl ContainerLookup,
    cell: CellId,
    locator: &Locator,
) -> Vec<NeighborInfo> {
    let face = locator.require_face();
    let mut out: Vec<NeighborInfo> = Vec::new();
    for search in Direction::ALL {
        if search == face || search == face.opposite() {
            continue;
        }
        for found in planar_scan(lookup, cell, locator, search)
            .into_iter()
            .chain(wrapped_scan(lookup, cell, locator, search))
        {
            if !out.iter().any(|n| n.cell == found.cell) {
                out.push(found);
            }
        }
    }
    out
}

fn matching(
    lookup: &impl ContainerLookup,
    cell: CellId,
    block: BlockPos,
    face: Direction,
) -> Vec<NeighborInfo> {
    lookup
        .cells_at(block)
        .into_iter()
        .filter(|(id, loc)| *id != cell && loc.face() == Some(face))
        .map(|(cell, locator)| NeighborInfo { cell, locator })
        .collect()
}
