//! The CGRA board grid and the cell-legality predicate.

use crate::position::Position;
use crate::tile::{BlockKind, TileType};
use serde::{Deserialize, Serialize};

/// Errors raised while constructing a board.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The tile rows do not all have the same length.
    #[error("ragged board: row {row} has {len} tiles, expected {expected}")]
    RaggedRows {
        /// Index of the offending row.
        row: usize,
        /// Length of the offending row.
        len: usize,
        /// Length of the first row.
        expected: usize,
    },
    /// The board has no rows or no columns.
    #[error("board is empty")]
    Empty,
}

/// Decides whether a block kind may occupy a given cell.
///
/// The placer core consumes this trait rather than a concrete board so the
/// legality rule can be swapped by the embedding toolchain. The default
/// implementation on [`Board`] matches the block kind's tile type against
/// the tile at the cell.
pub trait CellLegality {
    /// Returns `true` if a block of `kind` may be placed at `pos`.
    fn is_cell_legal(&self, kind: BlockKind, pos: Position) -> bool;
}

/// A fixed 2-D grid of typed tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    width: u32,
    height: u32,
    tiles: Vec<TileType>,
}

impl Board {
    /// Builds a board from rows of tile types (row 0 first).
    pub fn from_rows(rows: Vec<Vec<TileType>>) -> Result<Board, BoardError> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(BoardError::Empty);
        }
        let mut tiles = Vec::with_capacity(width * height);
        for (row, r) in rows.into_iter().enumerate() {
            if r.len() != width {
                return Err(BoardError::RaggedRows {
                    row,
                    len: r.len(),
                    expected: width,
                });
            }
            tiles.extend(r);
        }
        Ok(Board {
            width: width as u32,
            height: height as u32,
            tiles,
        })
    }

    /// Returns the board width (columns).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the board height (rows).
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the tile type at `pos`, or `None` if out of bounds.
    pub fn tile_at(&self, pos: Position) -> Option<TileType> {
        if pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some(self.tiles[(pos.y * self.width + pos.x) as usize])
    }

    /// Returns the center position of the board.
    pub fn center(&self) -> Position {
        Position::new(self.width / 2, self.height / 2)
    }

    /// Iterates all positions in scan order (row by row, left to right).
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Position::new(x, y)))
    }

    /// Returns all cells of the given tile type, in scan order.
    pub fn cells_of(&self, ty: TileType) -> Vec<Position> {
        self.positions()
            .filter(|&p| self.tile_at(p) == Some(ty))
            .collect()
    }

    /// Returns the number of cells of the given tile type.
    pub fn count_of(&self, ty: TileType) -> usize {
        self.tiles.iter().filter(|&&t| t == ty).count()
    }
}

impl CellLegality for Board {
    fn is_cell_legal(&self, kind: BlockKind, pos: Position) -> bool {
        match (kind.tile_type(), self.tile_at(pos)) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_3x2() -> Board {
        // p p m
        // i p .
        Board::from_rows(vec![
            vec![TileType::Pe, TileType::Pe, TileType::Mem],
            vec![TileType::Io, TileType::Pe, TileType::Empty],
        ])
        .unwrap()
    }

    #[test]
    fn dimensions_and_lookup() {
        let b = board_3x2();
        assert_eq!(b.width(), 3);
        assert_eq!(b.height(), 2);
        assert_eq!(b.tile_at(Position::new(2, 0)), Some(TileType::Mem));
        assert_eq!(b.tile_at(Position::new(0, 1)), Some(TileType::Io));
        assert_eq!(b.tile_at(Position::new(3, 0)), None);
        assert_eq!(b.tile_at(Position::new(0, 2)), None);
    }

    #[test]
    fn cells_of_scan_order() {
        let b = board_3x2();
        assert_eq!(
            b.cells_of(TileType::Pe),
            vec![Position::new(0, 0), Position::new(1, 0), Position::new(1, 1)]
        );
        assert_eq!(b.count_of(TileType::Pe), 3);
        assert_eq!(b.count_of(TileType::Mem), 1);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Board::from_rows(vec![
            vec![TileType::Pe, TileType::Pe],
            vec![TileType::Pe],
        ])
        .unwrap_err();
        assert!(matches!(err, BoardError::RaggedRows { row: 1, .. }));
    }

    #[test]
    fn empty_board_rejected() {
        assert!(matches!(Board::from_rows(vec![]), Err(BoardError::Empty)));
    }

    #[test]
    fn legality_matches_tile_types() {
        let b = board_3x2();
        assert!(b.is_cell_legal(BlockKind::Pe, Position::new(0, 0)));
        assert!(!b.is_cell_legal(BlockKind::Pe, Position::new(2, 0)));
        assert!(b.is_cell_legal(BlockKind::Mem, Position::new(2, 0)));
        assert!(b.is_cell_legal(BlockKind::Io, Position::new(0, 1)));
        // Nothing is legal on empty tiles, out of bounds, or for proxies.
        assert!(!b.is_cell_legal(BlockKind::Pe, Position::new(2, 1)));
        assert!(!b.is_cell_legal(BlockKind::Pe, Position::new(9, 9)));
        assert!(!b.is_cell_legal(BlockKind::Proxy, Position::new(0, 0)));
    }

    #[test]
    fn center_position() {
        assert_eq!(board_3x2().center(), Position::new(1, 1));
    }
}
