//! Placement engine for CGRA netlists.
//!
//! This crate takes a packed netlist (blocks with kind tags, embedding
//! vectors, and hyperedge nets) and a board description from `mosaic_grid`
//! and produces a complete, legal [`Placement`]: every placeable block on a
//! distinct cell whose tile type matches the block's kind.
//!
//! # Pipeline
//!
//! 1. **Special blocks** — fixed and IO blocks placed once, up front
//! 2. **Global clustering** — seeded k-means over embeddings plus a coarse
//!    cluster-to-region anneal, with a cluster-count retry loop and a
//!    whole-board fallback
//! 3. **Detailed placement** — one simulated anneal per cluster over its
//!    cell pool, run in parallel against per-job proxy contexts
//! 4. **Refinement** — optional deblocking and macro passes
//!
//! # Usage
//!
//! ```ignore
//! use mosaic_place::{run_pipeline, PlacerOptions};
//!
//! let placement = run_pipeline(&design, &board, &PlacerOptions::default())?;
//! assert_eq!(placement.len(), design.blocks.len());
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod cost;
pub mod data;
pub mod deblock;
pub mod detail;
pub mod error;
pub mod ids;
pub mod macro_place;
pub mod pipeline;
pub mod reduce;
pub mod seed;

pub use cluster::{global_place, GlobalPlacement};
pub use data::{
    Block, BlockId, CellPool, Clustering, Net, PackedDesign, Placement, ReducedNetlist,
};
pub use detail::DetailedPlacer;
pub use error::{PlaceError, RegionInfeasible};
pub use ids::{ClusterId, NetId};
pub use pipeline::{place_special_blocks, run_pipeline, validate_placement, PlacerOptions};
pub use reduce::reduce_for_cluster;
pub use seed::derive_seed;
