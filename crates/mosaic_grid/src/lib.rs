//! CGRA board model for the Mosaic placement engine.
//!
//! This crate provides the physical vocabulary shared by the placer: grid
//! [`Position`]s, the [`TileType`] of each grid cell, the [`Board`] (a fixed
//! 2-D grid of tiles), and the [`CellLegality`] predicate that decides which
//! block kinds may occupy which cells.

#![warn(missing_docs)]

pub mod board;
pub mod position;
pub mod tile;

pub use board::{Board, BoardError, CellLegality};
pub use position::Position;
pub use tile::{BlockKind, TileType};
