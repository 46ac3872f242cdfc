//! Cell placement keys and the rules that relate them.
//!
//! A [`Locator`] is an ordered set of facets, at most one per
//! [`FacetKind`]. Two cells are considered for connection only when the
//! host reports them adjacent; whether they *accept* each other is then
//! decided by a [`LocatorRelationRuleSet`] evaluated on both locators.

use crate::error::LocatorError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

// ── Direction ──────────────────────────────────────────────────────

/// One of the six axis-aligned directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// -Y
    Down,
    /// +Y
    Up,
    /// -Z
    North,
    /// +Z
    South,
    /// -X
    West,
    /// +X
    East,
}

impl Direction {
    /// All six directions.
    pub const ALL: [Direction; 6] = [
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// The four horizontal directions, clockwise from north.
    pub const HORIZONTAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Unit offset `(dx, dy, dz)`.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
        }
    }

    /// The direction pointing the other way.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }

    /// Whether this direction lies in the horizontal plane.
    pub fn is_horizontal(self) -> bool {
        !matches!(self, Direction::Down | Direction::Up)
    }

    /// Rotate a direction expressed in a north-facing frame into the frame
    /// of `facing`. Vertical directions and vertical facings are left as is.
    pub fn rotate_to(self, facing: Direction) -> Direction {
        let (Some(steps), Some(index)) = (horizontal_index(facing), horizontal_index(self)) else {
            return self;
        };
        Direction::HORIZONTAL[(index + steps) % 4]
    }

    /// Inverse of [`rotate_to`](Self::rotate_to).
    pub fn rotate_from(self, facing: Direction) -> Direction {
        let (Some(steps), Some(index)) = (horizontal_index(facing), horizontal_index(self)) else {
            return self;
        };
        Direction::HORIZONTAL[(index + 4 - steps) % 4]
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

fn horizontal_index(dir: Direction) -> Option<usize> {
    Direction::HORIZONTAL.iter().position(|d| *d == dir)
}

// ── BlockPos ───────────────────────────────────────────────────────

/// Integer block coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The neighbouring position in `dir`.
    pub fn offset(self, dir: Direction) -> BlockPos {
        let (dx, dy, dz) = dir.offset();
        BlockPos::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The direction from `self` to `other` if they are face-adjacent.
    pub fn direction_to(self, other: BlockPos) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| self.offset(*d) == other)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ── Facets ─────────────────────────────────────────────────────────

/// Discriminant of a [`LocatorFacet`], used to keep facets ordered and unique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetKind {
    /// [`LocatorFacet::Block`]
    Block,
    /// [`LocatorFacet::Face`]
    Face,
    /// [`LocatorFacet::Facing`]
    Facing,
}

/// One component of a [`Locator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocatorFacet {
    /// The block the cell occupies.
    Block(BlockPos),
    /// The face of the block the cell is mounted on.
    Face(Direction),
    /// The horizontal orientation of the cell.
    Facing(Direction),
}

impl LocatorFacet {
    /// The kind of this facet.
    pub fn kind(&self) -> FacetKind {
        match self {
            LocatorFacet::Block(_) => FacetKind::Block,
            LocatorFacet::Face(_) => FacetKind::Face,
            LocatorFacet::Facing(_) => FacetKind::Facing,
        }
    }
}

// ── Locator ────────────────────────────────────────────────────────

/// Identity and placement key of a cell.
///
/// Facets are kept sorted by kind so that equality and hashing do not
/// depend on insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    facets: SmallVec<[LocatorFacet; 3]>,
}

impl Locator {
    /// Start building a locator.
    pub fn builder() -> LocatorBuilder {
        LocatorBuilder::default()
    }

    /// A locator with only a block facet.
    pub fn at(pos: BlockPos) -> Locator {
        Locator {
            facets: SmallVec::from_slice(&[LocatorFacet::Block(pos)]),
        }
    }

    /// A locator for a part mounted on `face` of the block at `pos`.
    pub fn at_face(pos: BlockPos, face: Direction) -> Locator {
        Locator {
            facets: SmallVec::from_slice(&[LocatorFacet::Block(pos), LocatorFacet::Face(face)]),
        }
    }

    /// All facets, sorted by kind.
    pub fn facets(&self) -> &[LocatorFacet] {
        &self.facets
    }

    /// The facet of the given kind, if present.
    pub fn get(&self, kind: FacetKind) -> Option<&LocatorFacet> {
        self.facets.iter().find(|f| f.kind() == kind)
    }

    /// The block facet, if present.
    pub fn block(&self) -> Option<BlockPos> {
        match self.get(FacetKind::Block) {
            Some(LocatorFacet::Block(pos)) => Some(*pos),
            _ => None,
        }
    }

    /// The face facet, if present.
    pub fn face(&self) -> Option<Direction> {
        match self.get(FacetKind::Face) {
            Some(LocatorFacet::Face(dir)) => Some(*dir),
            _ => None,
        }
    }

    /// The facing facet, if present.
    pub fn facing(&self) -> Option<Direction> {
        match self.get(FacetKind::Facing) {
            Some(LocatorFacet::Facing(dir)) => Some(*dir),
            _ => None,
        }
    }

    /// The block facet, as a recoverable lookup.
    pub fn try_block(&self) -> Result<BlockPos, LocatorError> {
        self.block()
            .ok_or(LocatorError::MissingFacet(FacetKind::Block))
    }

    /// The block facet.
    ///
    /// # Panics
    ///
    /// Panics if the locator has no block facet. Cell kinds that need one
    /// declare it at construction, so absence is a caller bug.
    pub fn require_block(&self) -> BlockPos {
        match self.block() {
            Some(pos) => pos,
            None => panic!("locator {self} is missing its block facet"),
        }
    }

    /// The face facet.
    ///
    /// # Panics
    ///
    /// Panics if the locator has no face facet.
    pub fn require_face(&self) -> Direction {
        match self.face() {
            Some(dir) => dir,
            None => panic!("locator {self} is missing its face facet"),
        }
    }

    /// The facing facet.
    ///
    /// # Panics
    ///
    /// Panics if the locator has no facing facet.
    pub fn require_facing(&self) -> Direction {
        match self.facing() {
            Some(dir) => dir,
            None => panic!("locator {self} is missing its facing facet"),
        }
    }

    /// Direction from this locator's block to `other`'s block, if both
    /// have blocks and they are face-adjacent.
    pub fn direction_to(&self, other: &Locator) -> Option<Direction> {
        self.block()?.direction_to(other.block()?)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, facet) in self.facets.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match facet {
                LocatorFacet::Block(pos) => write!(f, "block {pos}")?,
                LocatorFacet::Face(dir) => write!(f, "face {dir:?}")?,
                LocatorFacet::Facing(dir) => write!(f, "facing {dir:?}")?,
            }
        }
        f.write_str("]")
    }
}

/// Builder for [`Locator`] that rejects duplicate facet kinds.
#[derive(Clone, Debug, Default)]
pub struct LocatorBuilder {
    facets: SmallVec<[LocatorFacet; 3]>,
}

impl LocatorBuilder {
    /// Add a facet.
    pub fn with(mut self, facet: LocatorFacet) -> Result<Self, LocatorError> {
        let kind = facet.kind();
        if self.facets.iter().any(|f| f.kind() == kind) {
            return Err(LocatorError::DuplicateFacet(kind));
        }
        self.facets.push(facet);
        Ok(self)
    }

    /// Add a block facet.
    pub fn block(self, pos: BlockPos) -> Result<Self, LocatorError> {
        self.with(LocatorFacet::Block(pos))
    }

    /// Add a face facet.
    pub fn face(self, dir: Direction) -> Result<Self, LocatorError> {
        self.with(LocatorFacet::Face(dir))
    }

    /// Add a facing facet.
    pub fn facing(self, dir: Direction) -> Result<Self, LocatorError> {
        self.with(LocatorFacet::Facing(dir))
    }

    /// Finish the locator.
    pub fn build(mut self) -> Locator {
        self.facets.sort_by_key(|f| f.kind());
        Locator {
            facets: self.facets,
        }
    }
}

// ── Relation rules ─────────────────────────────────────────────────

/// Predicate deciding whether a local locator accepts a remote one.
pub trait LocatorRelationRule: Send + Sync {
    /// Whether `local` accepts a connection to `remote`.
    fn accepts(&self, local: &Locator, remote: &Locator) -> bool;
}

impl<F> LocatorRelationRule for F
where
    F: Fn(&Locator, &Locator) -> bool + Send + Sync,
{
    fn accepts(&self, local: &Locator, remote: &Locator) -> bool {
        self(local, remote)
    }
}

/// Conjunction of [`LocatorRelationRule`]s. An empty set accepts everything.
#[derive(Default)]
pub struct LocatorRelationRuleSet {
    rules: Vec<Box<dyn LocatorRelationRule>>,
}

impl LocatorRelationRuleSet {
    /// A rule set that accepts every remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn with(mut self, rule: impl LocatorRelationRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Whether every rule accepts the pair.
    pub fn accepts(&self, local: &Locator, remote: &Locator) -> bool {
        self.rules.iter().all(|r| r.accepts(local, remote))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for LocatorRelationRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorRelationRuleSet")
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Set of directions a cell accepts connections from.
///
/// Evaluated on the block facets: the remote must sit in one of the masked
/// directions. With [`relative`](Self::relative) the mask is expressed in a
/// north-facing frame and rotated by the local facing facet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirectionMask {
    bits: u8,
    relative: bool,
}

impl DirectionMask {
    /// No directions.
    pub const EMPTY: DirectionMask = DirectionMask {
        bits: 0,
        relative: false,
    };

    /// All six directions.
    pub const ALL: DirectionMask = DirectionMask {
        bits: 0b11_1111,
        relative: false,
    };

    /// The four horizontal directions.
    pub const HORIZONTAL: DirectionMask = DirectionMask {
        bits: 0b11_1100,
        relative: false,
    };

    /// Mask of the given directions.
    pub fn of(dirs: &[Direction]) -> DirectionMask {
        DirectionMask {
            bits: dirs.iter().fold(0, |acc, d| acc | d.bit()),
            relative: false,
        }
    }

    /// Interpret this mask in the local facing frame.
    pub fn relative(self) -> DirectionMask {
        DirectionMask {
            relative: true,
            ..self
        }
    }

    /// Whether `dir` is in the mask.
    pub fn contains(self, dir: Direction) -> bool {
        self.bits & dir.bit() != 0
    }
}

impl LocatorRelationRule for DirectionMask {
    fn accepts(&self, local: &Locator, remote: &Locator) -> bool {
        let Some(dir) = local.direction_to(remote) else {
            return false;
        };
        let dir = match (self.relative, local.facing()) {
            (true, Some(facing)) => dir.rotate_from(facing),
            _ => dir,
        };
        self.contains(dir)
    }
}

// ── Poles ──────────────────────────────────────────────────────────

/// Terminal polarity of a two-pin part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pole {
    /// Positive terminal.
    Plus,
    /// Negative terminal.
    Minus,
}

/// Assigns terminals to the two sides of a part.
///
/// Directions are in the north-facing frame and rotated by the local
/// facing facet when it is present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoleMap {
    /// Side carrying the positive terminal.
    pub plus: Direction,
    /// Side carrying the negative terminal.
    pub minus: Direction,
}

impl PoleMap {
    /// Positive side in front, negative side behind.
    pub const FRONT_BACK: PoleMap = PoleMap {
        plus: Direction::North,
        minus: Direction::South,
    };

    /// The pole facing `remote`, or `None` when `remote` is on neither side.
    pub fn evaluate(&self, local: &Locator, remote: &Locator) -> Option<Pole> {
        let dir = local.direction_to(remote)?;
        let dir = match local.facing() {
            Some(facing) => dir.rotate_from(facing),
            None => dir,
        };
        if dir == self.plus {
            Some(Pole::Plus)
        } else if dir == self.minus {
            Some(Pole::Minus)
        } else {
            None
        }
    }

    /// Rule accepting only remotes on one of the two poles.
    pub fn rule(self) -> impl LocatorRelationRule {
        move |local: &Locator, remote: &Locator| self.evaluate(local, remote).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn origin() -> BlockPos {
        BlockPos::new(0, 0, 0)
    }

    #[test]
    fn builder_rejects_duplicate_kind() {
        let err = Locator::builder()
            .block(origin())
            .unwrap()
            .block(BlockPos::new(1, 0, 0))
            .unwrap_err();
        assert_eq!(err, LocatorError::DuplicateFacet(FacetKind::Block));
    }

    #[test]
    fn facet_order_does_not_affect_equality() {
        let a = Locator::builder()
            .facing(Direction::East)
            .unwrap()
            .block(origin())
            .unwrap()
            .build();
        let b = Locator::builder()
            .block(origin())
            .unwrap()
            .facing(Direction::East)
            .unwrap()
            .build();
        assert_eq!(a, b);
        assert_eq!(a.facets()[0].kind(), FacetKind::Block);
    }

    #[test]
    #[should_panic(expected = "missing its face facet")]
    fn require_missing_facet_panics() {
        Locator::at(origin()).require_face();
    }

    #[test]
    fn try_block_reports_missing() {
        let loc = Locator::builder().face(Direction::Up).unwrap().build();
        assert_eq!(
            loc.try_block(),
            Err(LocatorError::MissingFacet(FacetKind::Block))
        );
    }

    #[test]
    fn direction_mask_filters_remote() {
        let local = Locator::at(origin());
        let up = Locator::at(origin().offset(Direction::Up));
        let east = Locator::at(origin().offset(Direction::East));
        let far = Locator::at(BlockPos::new(5, 0, 0));
        let mask = DirectionMask::HORIZONTAL;
        assert!(mask.accepts(&local, &east));
        assert!(!mask.accepts(&local, &up));
        assert!(!mask.accepts(&local, &far));
    }

    #[test]
    fn relative_mask_follows_facing() {
        let local = Locator::builder()
            .block(origin())
            .unwrap()
            .facing(Direction::East)
            .unwrap()
            .build();
        let mask = DirectionMask::of(&[Direction::North]).relative();
        // "Front" of an east-facing part is east.
        assert!(mask.accepts(&local, &Locator::at(origin().offset(Direction::East))));
        assert!(!mask.accepts(&local, &Locator::at(origin().offset(Direction::North))));
    }

    #[test]
    fn pole_map_rotates_with_facing() {
        let local = Locator::builder()
            .block(origin())
            .unwrap()
            .facing(Direction::West)
            .unwrap()
            .build();
        let map = PoleMap::FRONT_BACK;
        let west = Locator::at(origin().offset(Direction::West));
        let east = Locator::at(origin().offset(Direction::East));
        let up = Locator::at(origin().offset(Direction::Up));
        assert_eq!(map.evaluate(&local, &west), Some(Pole::Plus));
        assert_eq!(map.evaluate(&local, &east), Some(Pole::Minus));
        assert_eq!(map.evaluate(&local, &up), None);
    }

    #[test]
    fn empty_rule_set_accepts_all() {
        let set = LocatorRelationRuleSet::new();
        assert!(set.accepts(&Locator::at(origin()), &Locator::at(BlockPos::new(9, 9, 9))));
    }

    #[test]
    fn locator_json_round_trip() {
        let loc = Locator::at_face(BlockPos::new(1, -2, 3), Direction::Down);
        let json = serde_json::to_string(&loc).unwrap();
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }

    fn any_direction() -> impl Strategy<Value = Direction> {
        prop::sample::select(Direction::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn rotation_is_invertible(dir in any_direction(), facing in any_direction()) {
            prop_assert_eq!(dir.rotate_to(facing).rotate_from(facing), dir);
        }

        #[test]
        fn offset_direction_round_trips(x in -100i32..100, y in -100i32..100, z in -100i32..100, dir in any_direction()) {
            let pos = BlockPos::new(x, y, z);
            prop_assert_eq!(pos.direction_to(pos.offset(dir)), Some(dir));
            prop_assert_eq!(pos.offset(dir).direction_to(pos), Some(dir.opposite()));
        }
    }
}
