//! Optional placement pass for macro blocks.
//!
//! Handles blocks bound to macro (unallocated) and memory tiles that the
//! main pipeline left unplaced, annealing them over the board's remaining
//! cells of those types with the finalized placement as immutable context.
//! Disabled by default; the step budget is deliberately small since macro
//! blocks are few and coarse.

use crate::data::{BlockId, CellPool, Clustering, PackedDesign, Placement};
use crate::detail::DetailedPlacer;
use crate::error::PlaceError;
use crate::ids::ClusterId;
use crate::reduce::reduce_for_cluster;
use crate::seed::derive_seed;
use mosaic_grid::{Board, Position, TileType};
use std::collections::BTreeSet;

/// Move proposals per temperature step for the macro pass.
const MACRO_STEPS: usize = 30;
/// Stage salt for the macro pass seed.
const MACRO_SALT: u64 = 0x6d61_6372_6f00_0000;

const MACRO_TYPES: [TileType; 2] = [TileType::Macro, TileType::Mem];

/// Places the design's unplaced macro and memory blocks.
///
/// `finalized` is the completed non-macro placement; its blocks and cells
/// are immutable here. Returns only the newly placed blocks.
pub fn place_macros(
    design: &PackedDesign,
    board: &Board,
    finalized: &Placement,
    seed: u64,
) -> Result<Placement, PlaceError> {
    let targets: BTreeSet<BlockId> = design
        .blocks
        .values()
        .filter(|b| {
            b.kind
                .tile_type()
                .is_some_and(|ty| MACRO_TYPES.contains(&ty))
                && !finalized.contains(&b.id)
        })
        .map(|b| b.id.clone())
        .collect();
    if targets.is_empty() {
        return Ok(Placement::new());
    }

    let occupied: BTreeSet<Position> = finalized.iter().map(|(_, p)| p).collect();
    let mut cells = CellPool::new();
    for ty in MACRO_TYPES {
        for pos in board.cells_of(ty) {
            if !occupied.contains(&pos) {
                cells.insert(ty, pos);
            }
        }
    }

    log::info!(
        "macro pass: {} blocks over {} free cells",
        targets.len(),
        cells.len()
    );

    let cluster = ClusterId::from_raw(0);
    let clustering = Clustering::single(cluster, targets.clone());
    let reduced = reduce_for_cluster(&design.nets, &clustering, finalized, cluster);

    let mut placer = DetailedPlacer::new(
        &targets,
        design,
        &cells,
        reduced,
        finalized,
        derive_seed(seed, MACRO_SALT),
    )?;
    placer.steps = MACRO_STEPS;
    placer.anneal();
    Ok(placer.into_state())
}
