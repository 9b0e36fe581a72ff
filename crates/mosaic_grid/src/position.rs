//! Integer grid coordinates.

use serde::{Deserialize, Serialize};

/// A position on the board grid.
///
/// `x` is the column (0-based, left to right) and `y` is the row (0-based,
/// top to bottom, matching the architecture file's line order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column index.
    pub x: u32,
    /// Row index.
    pub y: u32,
}

impl Position {
    /// Creates a position from column and row indices.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Returns the Manhattan distance to another position.
    ///
    /// This is the wirelength estimate used throughout the placer.
    pub fn manhattan(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
