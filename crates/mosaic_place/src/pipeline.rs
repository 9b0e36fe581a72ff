//! The placement pipeline: special blocks, clustering, parallel detailed
//! annealing, optional refinement passes, and final validation.

use crate::cluster::{global_place, GlobalPlacement};
use crate::data::{BlockId, PackedDesign, Placement};
use crate::deblock;
use crate::detail::DetailedPlacer;
use crate::error::PlaceError;
use crate::macro_place;
use crate::reduce::reduce_for_cluster;
use crate::seed::derive_seed;
use mosaic_grid::{BlockKind, Board, CellLegality, Position, TileType};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Stage salt for per-cluster detailed-anneal seeds.
const DETAIL_SALT: u64 = 0x6465_7461_696c_0000;
/// Step-budget multiplier applied under the whole-board fallback.
const FALLBACK_STEP_MULTIPLIER: usize = 5;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PlacerOptions {
    /// Cluster count override; `None` uses the size heuristic.
    pub num_clusters: Option<usize>,
    /// Base seed; every randomized stage derives its own seed from it.
    pub seed: u64,
    /// Enables the deblocking refinement pass.
    pub deblock: bool,
    /// Minimum cluster count for deblocking to be worthwhile.
    pub deblock_threshold: usize,
    /// Enables the macro placement pass.
    pub macros: bool,
}

impl Default for PlacerOptions {
    fn default() -> Self {
        Self {
            num_clusters: None,
            seed: 0,
            deblock: false,
            deblock_threshold: 2,
            macros: false,
        }
    }
}

/// Sizes a worker pool for `jobs` independent jobs.
pub(crate) fn worker_count(jobs: usize) -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(jobs)
        .max(1)
}

/// Places fixed and IO blocks before any annealing.
///
/// Blocks carrying an explicit position keep it (after a legality check);
/// remaining IO blocks are assigned IO cells in scan order. The result is
/// immutable for the rest of the pipeline.
pub fn place_special_blocks(
    design: &PackedDesign,
    board: &Board,
) -> Result<Placement, PlaceError> {
    let mut placed = Placement::new();
    let mut taken: std::collections::BTreeSet<Position> = Default::default();

    for block in design.blocks.values() {
        if let Some(pos) = block.fixed {
            if !board.is_cell_legal(block.kind, pos) {
                return Err(PlaceError::IllegalPlacement {
                    block: block.id.clone(),
                    pos,
                });
            }
            if let Some(prev) = placed.iter().find(|&(_, p)| p == pos) {
                return Err(PlaceError::Overlap {
                    a: prev.0.clone(),
                    b: block.id.clone(),
                    pos,
                });
            }
            placed.insert(block.id.clone(), pos);
            taken.insert(pos);
        }
    }

    let io_cells: Vec<Position> = board
        .cells_of(TileType::Io)
        .into_iter()
        .filter(|p| !taken.contains(p))
        .collect();
    let unfixed_io: Vec<&BlockId> = design
        .blocks_of_kind(BlockKind::Io)
        .filter(|b| b.fixed.is_none())
        .map(|b| &b.id)
        .collect();
    if io_cells.len() < unfixed_io.len() {
        return Err(PlaceError::CapacityExceeded {
            tile: TileType::Io,
            available: io_cells.len(),
            required: unfixed_io.len(),
        });
    }
    for (block, cell) in unfixed_io.into_iter().zip(io_cells) {
        placed.insert(block.clone(), cell);
    }
    Ok(placed)
}

/// Runs the full placement pipeline and returns the validated placement.
pub fn run_pipeline(
    design: &PackedDesign,
    board: &Board,
    options: &PlacerOptions,
) -> Result<Placement, PlaceError> {
    let fixed = place_special_blocks(design, board)?;
    let global = global_place(design, board, &fixed, options.num_clusters, options.seed)?;

    let mut movable = anneal_clusters(design, &global, &fixed, options)?;

    if options.deblock && global.clustering.len() > options.deblock_threshold {
        movable = deblock::refine(design, board, &movable, &fixed, options.seed)?;
    }

    let mut result = fixed;
    result.merge(movable);

    if options.macros {
        let macros = macro_place::place_macros(design, board, &result, options.seed)?;
        result.merge(macros);
    }

    validate_placement(design, board, &result, options.macros)?;
    Ok(result)
}

/// Anneals every cluster on a worker pool and merges the results.
fn anneal_clusters(
    design: &PackedDesign,
    global: &GlobalPlacement,
    fixed: &Placement,
    options: &PlacerOptions,
) -> Result<Placement, PlaceError> {
    let jobs: Vec<_> = global.clustering.clusters().collect();
    if jobs.is_empty() {
        return Ok(Placement::new());
    }

    let workers = worker_count(jobs.len());
    log::info!(
        "annealing {} clusters on {} workers{}",
        jobs.len(),
        workers,
        if global.fallback { " (fallback budget)" } else { "" }
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| PlaceError::Internal(e.to_string()))?;

    let results: Result<Vec<Placement>, PlaceError> = pool.install(|| {
        jobs.into_par_iter()
            .map(|(id, blocks)| {
                // Each job gets a private context: the fixed blocks plus
                // every other cluster collapsed to its centroid.
                let mut context = fixed.clone();
                for (&other, &centroid) in &global.centroids {
                    if other != id {
                        context.insert(BlockId::proxy(other), centroid);
                    }
                }
                let reduced = reduce_for_cluster(&design.nets, &global.clustering, fixed, id);
                let cells = global
                    .cluster_cells
                    .get(&id)
                    .ok_or_else(|| PlaceError::Internal(format!("no cells for cluster {id}")))?;
                let mut placer = DetailedPlacer::new(
                    blocks,
                    design,
                    cells,
                    reduced,
                    &context,
                    derive_seed(options.seed, DETAIL_SALT ^ u64::from(id.as_raw())),
                )?;
                if global.fallback {
                    placer.steps *= FALLBACK_STEP_MULTIPLIER;
                }
                placer.anneal();
                Ok(placer.into_state())
            })
            .collect()
    });

    let mut merged = Placement::new();
    for part in results? {
        merged.merge(part);
    }
    Ok(merged)
}

/// Checks that the placement is complete, overlap-free, and legal.
pub fn validate_placement(
    design: &PackedDesign,
    board: &Board,
    placement: &Placement,
    macros_expected: bool,
) -> Result<(), PlaceError> {
    let mut occupant: BTreeMap<Position, &BlockId> = BTreeMap::new();
    for (block, pos) in placement.iter() {
        if let Some(prev) = occupant.insert(pos, block) {
            return Err(PlaceError::Overlap {
                a: prev.clone(),
                b: block.clone(),
                pos,
            });
        }
    }

    for block in design.blocks.values() {
        let placeable = match block.kind {
            BlockKind::Pe | BlockKind::Mem | BlockKind::Io => true,
            BlockKind::Macro => macros_expected,
            BlockKind::Proxy => false,
        };
        if !placeable {
            continue;
        }
        let pos = placement
            .get(&block.id)
            .ok_or_else(|| PlaceError::Unplaced {
                block: block.id.clone(),
            })?;
        if !board.is_cell_legal(block.kind, pos) {
            return Err(PlaceError::IllegalPlacement {
                block: block.id.clone(),
                pos,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Block;

    /// An IO column on the left, PE everywhere else.
    fn io_pe_board(width: u32, height: u32) -> Board {
        let rows = (0..height)
            .map(|_| {
                let mut row = vec![TileType::Pe; width as usize];
                row[0] = TileType::Io;
                row
            })
            .collect();
        Board::from_rows(rows).unwrap()
    }

    fn block(id: &str, kind: BlockKind, emb: Option<&[f64]>) -> Block {
        Block {
            id: BlockId::new(id),
            kind,
            embedding: emb.map(<[f64]>::to_vec),
            fixed: None,
        }
    }

    fn small_design() -> PackedDesign {
        let mut d = PackedDesign::new();
        d.add_block(block("i0", BlockKind::Io, None));
        for i in 0..4 {
            d.add_block(block(&format!("p{i}"), BlockKind::Pe, Some(&[i as f64, 0.0])));
        }
        d.add_net(vec![BlockId::new("i0"), BlockId::new("p0")], 1.0);
        d.add_net(vec![BlockId::new("p0"), BlockId::new("p1")], 2.0);
        d.add_net(vec![BlockId::new("p2"), BlockId::new("p3")], 1.0);
        d
    }

    #[test]
    fn full_run_is_complete_and_legal() {
        let board = io_pe_board(5, 4);
        let design = small_design();
        let placement = run_pipeline(&design, &board, &PlacerOptions::default()).unwrap();

        assert_eq!(placement.len(), 5);
        let cells: std::collections::BTreeSet<Position> =
            placement.iter().map(|(_, p)| p).collect();
        assert_eq!(cells.len(), 5);
        assert_eq!(
            board.tile_at(placement.get(&BlockId::new("i0")).unwrap()),
            Some(TileType::Io)
        );
        for i in 0..4 {
            let pos = placement.get(&BlockId::new(format!("p{i}"))).unwrap();
            assert_eq!(board.tile_at(pos), Some(TileType::Pe));
        }
    }

    #[test]
    fn fixed_blocks_keep_their_positions() {
        // A heavy net pulling the fixed block toward the movable blocks
        // must not dislodge it, and its cell must stay exclusively its own.
        let board = io_pe_board(5, 4);
        let mut design = small_design();
        design.add_block(Block {
            id: BlockId::new("p9"),
            kind: BlockKind::Pe,
            embedding: Some(vec![9.0, 0.0]),
            fixed: Some(Position::new(4, 3)),
        });
        design.add_net(vec![BlockId::new("p9"), BlockId::new("p0")], 3.0);

        for seed in [0, 7] {
            let options = PlacerOptions {
                seed,
                ..Default::default()
            };
            let placement = run_pipeline(&design, &board, &options).unwrap();
            assert_eq!(
                placement.get(&BlockId::new("p9")),
                Some(Position::new(4, 3))
            );
            let on_fixed_cell = placement
                .iter()
                .filter(|&(_, p)| p == Position::new(4, 3))
                .count();
            assert_eq!(on_fixed_cell, 1);
        }
    }

    #[test]
    fn deterministic_for_a_seed() {
        let board = io_pe_board(6, 6);
        let design = small_design();
        let options = PlacerOptions {
            seed: 11,
            ..Default::default()
        };
        let one = run_pipeline(&design, &board, &options).unwrap();
        let two = run_pipeline(&design, &board, &options).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn tight_board_succeeds_through_fallback() {
        // Exactly as many PE cells as PE blocks: clustering with headroom
        // cannot fit, so the run must complete via the fallback path.
        let board = Board::from_rows(vec![
            vec![TileType::Io, TileType::Pe, TileType::Pe],
            vec![TileType::Empty, TileType::Pe, TileType::Pe],
        ])
        .unwrap();
        let design = small_design();
        let options = PlacerOptions {
            num_clusters: Some(1),
            ..Default::default()
        };
        let placement = run_pipeline(&design, &board, &options).unwrap();
        assert_eq!(placement.len(), 5);
    }

    #[test]
    fn io_overflow_is_a_capacity_error() {
        let board = Board::from_rows(vec![vec![TileType::Io, TileType::Pe]]).unwrap();
        let mut design = PackedDesign::new();
        design.add_block(block("i0", BlockKind::Io, None));
        design.add_block(block("i1", BlockKind::Io, None));
        let err = place_special_blocks(&design, &board).unwrap_err();
        assert!(matches!(
            err,
            PlaceError::CapacityExceeded {
                tile: TileType::Io,
                available: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn fixed_block_on_wrong_tile_is_illegal() {
        let board = io_pe_board(3, 3);
        let mut design = PackedDesign::new();
        design.add_block(Block {
            id: BlockId::new("p0"),
            kind: BlockKind::Pe,
            embedding: None,
            fixed: Some(Position::new(0, 0)),
        });
        let err = place_special_blocks(&design, &board).unwrap_err();
        assert!(matches!(err, PlaceError::IllegalPlacement { .. }));
    }

    #[test]
    fn validation_rejects_overlap() {
        let board = io_pe_board(3, 3);
        let mut design = PackedDesign::new();
        design.add_block(block("p0", BlockKind::Pe, None));
        design.add_block(block("p1", BlockKind::Pe, None));
        let mut placement = Placement::new();
        placement.insert(BlockId::new("p0"), Position::new(1, 1));
        placement.insert(BlockId::new("p1"), Position::new(1, 1));
        let err = validate_placement(&design, &board, &placement, false).unwrap_err();
        assert!(matches!(err, PlaceError::Overlap { .. }));
    }

    #[test]
    fn validation_rejects_missing_blocks() {
        let board = io_pe_board(3, 3);
        let mut design = PackedDesign::new();
        design.add_block(block("p0", BlockKind::Pe, None));
        let err = validate_placement(&design, &board, &Placement::new(), false).unwrap_err();
        assert!(matches!(err, PlaceError::Unplaced { .. }));
    }

    #[test]
    fn deblock_pass_preserves_legality() {
        let board = io_pe_board(8, 8);
        let mut design = PackedDesign::new();
        design.add_block(block("i0", BlockKind::Io, None));
        for i in 0..12 {
            design.add_block(block(
                &format!("p{i:02}"),
                BlockKind::Pe,
                Some(&[(i % 4) as f64, (i / 4) as f64]),
            ));
            if i > 0 {
                design.add_net(
                    vec![
                        BlockId::new(format!("p{:02}", i - 1)),
                        BlockId::new(format!("p{i:02}")),
                    ],
                    1.0,
                );
            }
        }
        let options = PlacerOptions {
            num_clusters: Some(3),
            deblock: true,
            deblock_threshold: 2,
            ..Default::default()
        };
        let placement = run_pipeline(&design, &board, &options).unwrap();
        validate_placement(&design, &board, &placement, false).unwrap();
    }

    #[test]
    fn macro_pass_places_macro_blocks() {
        let board = Board::from_rows(vec![
            vec![TileType::Io, TileType::Pe, TileType::Macro],
            vec![TileType::Empty, TileType::Pe, TileType::Macro],
        ])
        .unwrap();
        let mut design = PackedDesign::new();
        design.add_block(block("p0", BlockKind::Pe, Some(&[0.0])));
        design.add_block(block("u0", BlockKind::Macro, None));
        let options = PlacerOptions {
            macros: true,
            ..Default::default()
        };
        let placement = run_pipeline(&design, &board, &options).unwrap();
        let pos = placement.get(&BlockId::new("u0")).unwrap();
        assert_eq!(board.tile_at(pos), Some(TileType::Macro));
    }

    #[test]
    fn worker_count_never_exceeds_jobs() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        assert!(worker_count(4) <= 4);
    }
}
