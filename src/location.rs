use std::num::NonZero;

use strum::VariantArray;

type Coord = usize;
/// A nonzero grid dimension (width or height).
pub type Dimension = NonZero<Coord>;

/// A tile `(x, y)` on the grid. `Location(0, 0)` is the bottom-left corner;
/// input lanes feed column `x = 0` and output lanes drain column `x = width - 1`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Location(pub Coord, pub Coord);

impl Location {
    pub(crate) fn offset_by(self, rhs: (isize, isize)) -> Self {
        Self(self.0.wrapping_add_signed(rhs.0), self.1.wrapping_add_signed(rhs.1))
    }

    pub(crate) fn in_grid(&self, dims: (Dimension, Dimension)) -> bool {
        self.0 < dims.0.get() && self.1 < dims.1.get()
    }
}

/// A cardinal movement direction. [`Up`](Direction::Up) increases `y`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, VariantArray)]
pub enum Direction {
    /// Towards `y + 1`.
    Up,
    /// Towards `y - 1`.
    Down,
    /// Towards `x - 1`.
    Left,
    /// Towards `x + 1`; also the direction all lanes and splitters face.
    Right,
}

impl Direction {
    /// Attempt `range` steps from `location` in this direction and return the
    /// resultant [`Location`]. Steps off the low edge of the grid wrap far out
    /// of bounds and fail any later in-grid check.
    pub fn attempt_from(&self, location: Location, range: usize) -> Location {
        let r = range as isize;
        match self {
            Self::Up => location.offset_by((0, r)),
            Self::Down => location.offset_by((0, -r)),
            Self::Left => location.offset_by((-r, 0)),
            Self::Right => location.offset_by((r, 0)),
        }
    }

    pub(crate) fn letter(&self) -> char {
        match self {
            Self::Up => 'U',
            Self::Down => 'D',
            Self::Left => 'L',
            Self::Right => 'R',
        }
    }
}

/// One half of a splitter pair. The two fragments sit in vertically adjacent
/// tiles and are placed or removed together.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, VariantArray)]
pub enum SplitterSide {
    /// The upper fragment; its partner sits at `y - 1` and its diagonal
    /// output crosses down into the partner's lane.
    Left,
    /// The lower fragment; its partner sits at `y + 1` and its diagonal
    /// output crosses up into the partner's lane.
    Right,
}

impl SplitterSide {
    /// The vertical sense of this fragment's diagonal output move.
    pub fn diagonal_direction(&self) -> Direction {
        match self {
            Self::Left => Direction::Down,
            Self::Right => Direction::Up,
        }
    }

    /// The fragment gating a diagonal move of the given vertical sense, if any.
    pub fn from_diagonal_direction(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Up => Some(Self::Right),
            Direction::Down => Some(Self::Left),
            _ => None,
        }
    }

    pub(crate) fn letter(&self) -> char {
        match self {
            Self::Left => 'l',
            Self::Right => 'r',
        }
    }
}
