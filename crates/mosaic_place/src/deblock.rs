//! Deblocking refinement over a 2x2 grid of board boxes.
//!
//! After the per-cluster anneals, cluster boundaries can leave locally poor
//! assignments. This pass splits the board into a fixed 2x2 grid of
//! rectangular boxes (each roughly a quadrant), treats each occupied box as
//! a cluster of the blocks currently inside it, and re-anneals every box
//! over its own cells with the rest of the board collapsed to per-box proxy
//! centroids. Box jobs are independent and run in parallel.

use crate::data::{BlockId, CellPool, Clustering, PackedDesign, Placement};
use crate::detail::DetailedPlacer;
use crate::error::PlaceError;
use crate::ids::ClusterId;
use crate::reduce::reduce_for_cluster;
use crate::seed::derive_seed;
use mosaic_grid::{Board, Position};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Boxes per axis: the board splits into a `BOX_GRID` x `BOX_GRID` grid.
const BOX_GRID: u32 = 2;
/// Stage salt mixed into every per-box seed.
const DEBLOCK_SALT: u64 = 0x6465_626c_6f63_6b00;

fn box_width(board: &Board) -> u32 {
    (board.width() / BOX_GRID).max(1)
}

fn box_height(board: &Board) -> u32 {
    (board.height() / BOX_GRID).max(1)
}

/// Returns the box a position falls into (row-major over the box grid).
fn box_of(board: &Board, pos: Position) -> ClusterId {
    let bx = (pos.x / box_width(board)).min(BOX_GRID - 1);
    let by = (pos.y / box_height(board)).min(BOX_GRID - 1);
    ClusterId::from_raw(by * BOX_GRID + bx)
}

/// Returns a box's origin and extent; the last row/column absorbs the
/// board's remainder.
fn box_bounds(board: &Board, id: ClusterId) -> (Position, u32, u32) {
    let (bw, bh) = (box_width(board), box_height(board));
    let bx = id.as_raw() % BOX_GRID;
    let by = id.as_raw() / BOX_GRID;
    let origin = Position::new(bx * bw, by * bh);
    let width = if bx + 1 == BOX_GRID { board.width() - origin.x } else { bw };
    let height = if by + 1 == BOX_GRID { board.height() - origin.y } else { bh };
    (origin, width, height)
}

/// Re-anneals every occupied 2x2 box and returns the refined placement.
///
/// `placement` holds the movable blocks' current positions; `fixed` is the
/// immutable context (pre-placed and special blocks). Blocks never leave
/// their box, so the result stays bijective and legal if the input was.
pub fn refine(
    design: &PackedDesign,
    board: &Board,
    placement: &Placement,
    fixed: &Placement,
    seed: u64,
) -> Result<Placement, PlaceError> {
    let mut members: BTreeMap<ClusterId, BTreeSet<BlockId>> = BTreeMap::new();
    for (block, pos) in placement.iter() {
        members
            .entry(box_of(board, pos))
            .or_default()
            .insert(block.clone());
    }
    if members.is_empty() {
        return Ok(Placement::new());
    }
    let boxes = Clustering::new(members);

    // Proxy centroid per box: the mean of its blocks' current positions.
    let mut centroids: BTreeMap<ClusterId, Position> = BTreeMap::new();
    for (id, blocks) in boxes.clusters() {
        let (mut sx, mut sy) = (0u64, 0u64);
        for b in blocks {
            let p = placement
                .get(b)
                .ok_or_else(|| PlaceError::Unplaced { block: b.clone() })?;
            sx += u64::from(p.x);
            sy += u64::from(p.y);
        }
        let n = blocks.len() as u64;
        centroids.insert(id, Position::new((sx / n) as u32, (sy / n) as u32));
    }

    let occupied: BTreeSet<Position> = fixed.iter().map(|(_, p)| p).collect();
    log::info!("deblocking {} occupied boxes", boxes.len());

    let jobs: Vec<(ClusterId, BTreeSet<BlockId>)> = boxes
        .clusters()
        .map(|(id, blocks)| (id, blocks.clone()))
        .collect();
    let workers = crate::pipeline::worker_count(jobs.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| PlaceError::Internal(e.to_string()))?;

    let results: Result<Vec<Placement>, PlaceError> = pool.install(|| {
        jobs.into_par_iter()
            .map(|(id, blocks)| {
                let mut context = fixed.clone();
                for (&other, &centroid) in &centroids {
                    if other != id {
                        context.insert(BlockId::proxy(other), centroid);
                    }
                }
                let reduced = reduce_for_cluster(&design.nets, &boxes, fixed, id);
                let cells = box_cells(board, id, &occupied);
                let mut placer = DetailedPlacer::new(
                    &blocks,
                    design,
                    &cells,
                    reduced,
                    &context,
                    derive_seed(seed, DEBLOCK_SALT ^ u64::from(id.as_raw())),
                )?;
                placer.anneal();
                Ok(placer.into_state())
            })
            .collect()
    });

    let mut refined = Placement::new();
    for part in results? {
        refined.merge(part);
    }
    Ok(refined)
}

/// Collects the free board cells inside one box, grouped by tile type.
fn box_cells(board: &Board, id: ClusterId, occupied: &BTreeSet<Position>) -> CellPool {
    let (origin, width, height) = box_bounds(board, id);
    let mut cells = CellPool::new();
    for dy in 0..height {
        for dx in 0..width {
            let pos = Position::new(origin.x + dx, origin.y + dy);
            if occupied.contains(&pos) {
                continue;
            }
            if let Some(ty) = board.tile_at(pos) {
                cells.insert(ty, pos);
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Block;
    use mosaic_grid::{BlockKind, TileType};

    fn pe_board(width: u32, height: u32) -> Board {
        Board::from_rows(vec![vec![TileType::Pe; width as usize]; height as usize]).unwrap()
    }

    fn pe_design(ids: &[&str]) -> PackedDesign {
        let mut d = PackedDesign::new();
        for id in ids {
            d.add_block(Block {
                id: BlockId::new(*id),
                kind: BlockKind::Pe,
                embedding: None,
                fixed: None,
            });
        }
        d
    }

    #[test]
    fn boxes_are_board_quadrants() {
        let board = pe_board(8, 8);
        assert_eq!(box_of(&board, Position::new(0, 0)), ClusterId::from_raw(0));
        assert_eq!(box_of(&board, Position::new(3, 3)), ClusterId::from_raw(0));
        assert_eq!(box_of(&board, Position::new(4, 0)), ClusterId::from_raw(1));
        assert_eq!(box_of(&board, Position::new(0, 4)), ClusterId::from_raw(2));
        assert_eq!(box_of(&board, Position::new(7, 7)), ClusterId::from_raw(3));
    }

    #[test]
    fn box_bounds_invert_box_of() {
        // Odd dimensions: the last row/column of boxes absorbs the slack.
        let board = pe_board(7, 5);
        for pos in board.positions() {
            let id = box_of(&board, pos);
            let (origin, width, height) = box_bounds(&board, id);
            assert!(origin.x <= pos.x && pos.x < origin.x + width);
            assert!(origin.y <= pos.y && pos.y < origin.y + height);
        }
        let total: u32 = (0..BOX_GRID * BOX_GRID)
            .map(|i| {
                let (_, w, h) = box_bounds(&board, ClusterId::from_raw(i));
                w * h
            })
            .sum();
        assert_eq!(total, 35);
    }

    #[test]
    fn blocks_stay_inside_their_box() {
        let board = pe_board(4, 4);
        let design = pe_design(&["a", "b", "c"]);
        let mut placement = Placement::new();
        placement.insert(BlockId::new("a"), Position::new(0, 0));
        placement.insert(BlockId::new("b"), Position::new(1, 1));
        placement.insert(BlockId::new("c"), Position::new(3, 2));

        let refined = refine(&design, &board, &placement, &Placement::new(), 0).unwrap();
        assert_eq!(refined.len(), 3);
        for (block, pos) in refined.iter() {
            let before = placement.get(block).unwrap();
            assert_eq!(box_of(&board, pos), box_of(&board, before));
        }
        let cells: BTreeSet<Position> = refined.iter().map(|(_, p)| p).collect();
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn fixed_cells_are_not_reassigned() {
        // A heavy net pulls "a" toward the fixed block's cell; the box pool
        // must withhold that cell so "a" settles next to it instead.
        let board = pe_board(4, 4);
        let mut design = pe_design(&["a"]);
        design.add_net(vec![BlockId::new("a"), BlockId::new("b")], 5.0);
        let mut placement = Placement::new();
        placement.insert(BlockId::new("a"), Position::new(0, 0));
        let mut fixed = Placement::new();
        fixed.insert(BlockId::new("b"), Position::new(1, 1));

        let refined = refine(&design, &board, &placement, &fixed, 0).unwrap();
        assert_eq!(refined.len(), 1);
        assert_ne!(refined.get(&BlockId::new("a")), Some(Position::new(1, 1)));
    }

    #[test]
    fn empty_placement_is_a_no_op() {
        let board = pe_board(4, 4);
        let design = pe_design(&[]);
        let refined =
            refine(&design, &board, &Placement::new(), &Placement::new(), 0).unwrap();
        assert!(refined.is_empty());
    }

    #[test]
    fn deterministic_for_a_seed() {
        let board = pe_board(4, 4);
        let mut design = pe_design(&["a", "b", "c", "d"]);
        design.add_net(vec![BlockId::new("a"), BlockId::new("b")], 1.0);
        design.add_net(vec![BlockId::new("c"), BlockId::new("d")], 2.0);
        let mut placement = Placement::new();
        placement.insert(BlockId::new("a"), Position::new(0, 0));
        placement.insert(BlockId::new("b"), Position::new(1, 0));
        placement.insert(BlockId::new("c"), Position::new(2, 2));
        placement.insert(BlockId::new("d"), Position::new(3, 3));

        let one = refine(&design, &board, &placement, &Placement::new(), 5).unwrap();
        let two = refine(&design, &board, &placement, &Placement::new(), 5).unwrap();
        assert_eq!(one, two);
    }
}
