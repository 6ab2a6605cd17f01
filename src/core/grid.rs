//! Battlefield Grid Geometry
//!
//! Integer cell coordinates and axis-aligned rectangles on the 10x10 board.
//! Everything here is a pure value type; no state, no I/O.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Width and height of a battlefield, in cells.
pub const GRID_SIZE: i32 = 10;

/// Grid errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Point does not belong to the footprint.
    #[error("point {0} is out of entity boundaries")]
    OutsideFootprint(Vec2),
}

// =============================================================================
// CELL COORDINATE
// =============================================================================

/// A grid cell coordinate. 1-indexed, valid range is [1, GRID_SIZE] on both axes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Vec2 {
    /// Top-left cell of the board.
    pub const MIN: Self = Self { x: 1, y: 1 };

    /// Bottom-right cell of the board.
    pub const MAX: Self = Self { x: GRID_SIZE, y: GRID_SIZE };

    /// Create a new coordinate.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Add the same amount to both components.
    #[inline]
    pub const fn offset(self, amount: i32) -> Self {
        Self { x: self.x + amount, y: self.y + amount }
    }

    /// Swap components (used to rotate a horizontal size into a vertical one).
    #[inline]
    pub const fn transposed(self) -> Self {
        Self { x: self.y, y: self.x }
    }

    /// Check if the cell lies on the board.
    #[inline]
    pub const fn in_bounds(self) -> bool {
        self.x >= 1 && self.x <= GRID_SIZE && self.y >= 1 && self.y <= GRID_SIZE
    }
}

impl fmt::Debug for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec2({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// FOOTPRINT
// =============================================================================

/// Axis-aligned rectangle of cells with inclusive bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Footprint {
    /// Minimum corner (inclusive).
    pub start: Vec2,
    /// Maximum corner (inclusive).
    pub end: Vec2,
}

impl Footprint {
    /// The whole battlefield.
    pub const GRID: Self = Self { start: Vec2::MIN, end: Vec2::MAX };

    /// Create a rectangle from its corners.
    #[inline]
    pub const fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }

    /// Check if two rectangles share at least one cell.
    #[inline]
    pub fn intersects(&self, other: &Footprint) -> bool {
        self.start.x <= other.end.x
            && self.end.x >= other.start.x
            && self.start.y <= other.end.y
            && self.end.y >= other.start.y
    }

    /// Grow the rectangle by `cells` in every direction.
    ///
    /// A one-cell dilation turns `intersects` into a "touches, even diagonally" check.
    #[inline]
    pub const fn dilate(&self, cells: i32) -> Self {
        Self {
            start: self.start.offset(-cells),
            end: self.end.offset(cells),
        }
    }

    /// Check if the rectangle lies fully on the board.
    #[inline]
    pub const fn within_bounds(&self) -> bool {
        self.start.in_bounds() && self.end.in_bounds()
    }

    /// Check if a cell is inside the rectangle.
    #[inline]
    pub const fn contains(&self, point: Vec2) -> bool {
        point.x >= self.start.x
            && point.x <= self.end.x
            && point.y >= self.start.y
            && point.y <= self.end.y
    }

    /// Width and height in cells.
    #[inline]
    pub const fn size(&self) -> Vec2 {
        Vec2 {
            x: self.end.x - self.start.x + 1,
            y: self.end.y - self.start.y + 1,
        }
    }

    /// Number of cells covered.
    #[inline]
    pub const fn area(&self) -> usize {
        let size = self.size();
        (size.x * size.y) as usize
    }

    /// Intersection with the board. May be empty (start > end) if fully off-board.
    pub fn clamp_to_grid(&self) -> Self {
        Self {
            start: Vec2::new(self.start.x.max(1), self.start.y.max(1)),
            end: Vec2::new(self.end.x.min(GRID_SIZE), self.end.y.min(GRID_SIZE)),
        }
    }

    /// Map an absolute cell to a 1-indexed offset inside this rectangle.
    pub fn to_local(&self, point: Vec2) -> Result<Vec2, GridError> {
        if !self.contains(point) {
            return Err(GridError::OutsideFootprint(point));
        }
        Ok(Vec2::new(point.x - self.start.x + 1, point.y - self.start.y + 1))
    }

    /// Iterate covered cells, column by column.
    pub fn cells(&self) -> impl Iterator<Item = Vec2> {
        let Footprint { start, end } = *self;
        (start.x..=end.x).flat_map(move |x| (start.y..=end.y).map(move |y| Vec2::new(x, y)))
    }
}
