//! Tile and block type tags.
//!
//! A CGRA grid is made of typed tiles. Each placeable block carries an
//! explicit [`BlockKind`] tag set once when the netlist is parsed; legality
//! is a match between the block's kind and the tile's type.

use serde::{Deserialize, Serialize};

/// The type of a tile in the CGRA grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TileType {
    /// A processing-element tile.
    Pe,
    /// A memory tile.
    Mem,
    /// An I/O tile for fixed/special blocks.
    Io,
    /// An unallocated tile reserved for macro resources.
    Macro,
    /// An empty tile with no placeable resource.
    Empty,
}

impl TileType {
    /// Parses a tile type from its architecture-file character code.
    ///
    /// Returns `None` for unknown codes.
    pub fn from_code(code: char) -> Option<TileType> {
        match code {
            'p' => Some(TileType::Pe),
            'm' => Some(TileType::Mem),
            'i' => Some(TileType::Io),
            'u' => Some(TileType::Macro),
            '.' => Some(TileType::Empty),
            _ => None,
        }
    }

    /// Returns the single-character code used in architecture files.
    pub fn code(self) -> char {
        match self {
            TileType::Pe => 'p',
            TileType::Mem => 'm',
            TileType::Io => 'i',
            TileType::Macro => 'u',
            TileType::Empty => '.',
        }
    }
}

impl std::fmt::Display for TileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TileType::Pe => "PE",
            TileType::Mem => "MEM",
            TileType::Io => "IO",
            TileType::Macro => "MACRO",
            TileType::Empty => "empty",
        };
        write!(f, "{name}")
    }
}

/// The kind of a placeable block.
///
/// Set once at parse time from the packed netlist; never re-derived from the
/// block's identifier string afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// A processing-element block, placed on [`TileType::Pe`] tiles.
    Pe,
    /// A memory block, placed on [`TileType::Mem`] tiles.
    Mem,
    /// A fixed/special I/O block, pre-placed on [`TileType::Io`] tiles.
    Io,
    /// A macro block, placed on [`TileType::Macro`] tiles in a separate pass.
    Macro,
    /// A synthetic cluster-proxy node; never occupies a board cell.
    Proxy,
}

impl BlockKind {
    /// Returns the tile type this block kind may occupy.
    ///
    /// Proxy nodes return `None`: they exist only inside reduced netlists.
    pub fn tile_type(self) -> Option<TileType> {
        match self {
            BlockKind::Pe => Some(TileType::Pe),
            BlockKind::Mem => Some(TileType::Mem),
            BlockKind::Io => Some(TileType::Io),
            BlockKind::Macro => Some(TileType::Macro),
            BlockKind::Proxy => None,
        }
    }
}
