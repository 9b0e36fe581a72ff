//! Error taxonomy for the placement pipeline.
//!
//! Fatal conditions are variants of [`PlaceError`]. Infeasibility of the
//! coarse region annealer is deliberately *not* part of that enum: it is a
//! recoverable value, [`RegionInfeasible`], returned from the annealer's
//! constructor and consumed by the cluster-count retry loop.

use crate::data::BlockId;
use crate::ids::ClusterId;
use mosaic_grid::{Position, TileType};

/// Fatal errors raised by the placement pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    /// The board has fewer cells of a required tile type than the netlist
    /// needs, even under the whole-board fallback.
    #[error("the board has {available} {tile} tiles available, but the netlist requires {required}")]
    CapacityExceeded {
        /// The tile type in shortfall.
        tile: TileType,
        /// Number of cells of that type on the board.
        available: usize,
        /// Number of blocks that need a cell of that type.
        required: usize,
    },

    /// A block that must be clustered has no embedding vector.
    #[error("block {block} has no embedding vector")]
    MissingEmbedding {
        /// The block missing its embedding.
        block: BlockId,
    },

    /// Two blocks ended up on the same cell (placement validation).
    #[error("blocks {a} and {b} are both placed at {pos}")]
    Overlap {
        /// First block.
        a: BlockId,
        /// Second block.
        b: BlockId,
        /// The shared position.
        pos: Position,
    },

    /// A block is placed on a cell its kind may not occupy.
    #[error("block {block} is placed on an incompatible tile at {pos}")]
    IllegalPlacement {
        /// The offending block.
        block: BlockId,
        /// Its assigned position.
        pos: Position,
    },

    /// A block was left without a position after the pipeline finished.
    #[error("block {block} was never assigned a position")]
    Unplaced {
        /// The unplaced block.
        block: BlockId,
    },

    /// An internal invariant was violated; indicates a bug in the placer.
    #[error("internal placer error: {0}")]
    Internal(String),
}

/// The reason a coarse cluster-to-region annealer could not be constructed.
///
/// This is a recoverable signal: the caller reduces the cluster count,
/// relaxes the density factor, and retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionInfeasible {
    /// A single cluster's demand exceeds every region's capacity.
    #[error(
        "cluster {cluster} needs {demand} {tile} cells but the largest region holds {capacity}"
    )]
    RegionOverflow {
        /// The cluster that does not fit.
        cluster: ClusterId,
        /// The tile type in shortfall.
        tile: TileType,
        /// Scaled demand of the cluster.
        demand: usize,
        /// Largest per-region capacity of that type.
        capacity: usize,
    },

    /// The summed demand of all clusters exceeds the board's supply.
    #[error("clusters need {demand} {tile} cells in total but the board holds {capacity}")]
    BoardOverflow {
        /// The tile type in shortfall.
        tile: TileType,
        /// Total demand across clusters.
        demand: usize,
        /// Total board supply of that type.
        capacity: usize,
    },
}
