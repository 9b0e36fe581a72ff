//! Per-cluster detailed placement by simulated annealing.
//!
//! Starting from a deterministic initial assignment of the cluster's blocks
//! to its candidate cells, repeatedly proposes relocations into empty cells
//! and swaps between occupied cells, accepting each move with the
//! Metropolis criterion under a geometrically decreasing temperature.
//! Each instance is fully self-contained (own RNG, own copies of the fixed
//! context), so cluster jobs run in parallel without shared state.

use crate::cost;
use crate::data::{BlockId, CellPool, PackedDesign, Placement, ReducedNetlist};
use crate::error::PlaceError;
use mosaic_grid::{Position, TileType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const COOLING_RATE: f64 = 0.95;
const MIN_TEMPERATURE: f64 = 0.01;
const MOVES_PER_TEMP_MULTIPLIER: usize = 10;

/// Simulated-annealing placer for one cluster (or deblock box, or the
/// whole board under fallback).
#[derive(Debug)]
pub struct DetailedPlacer {
    netlist: ReducedNetlist,
    /// Working assignment for the movable blocks.
    state: BTreeMap<BlockId, Position>,
    /// Immutable positions: fixed blocks plus other clusters' proxies.
    context: BTreeMap<BlockId, Position>,
    /// Candidate cells per tile type.
    pool: BTreeMap<TileType, Vec<Position>>,
    tile_of: HashMap<BlockId, TileType>,
    movable: Vec<BlockId>,
    occupancy: HashMap<Position, BlockId>,
    /// Move proposals per temperature step.
    pub steps: usize,
    rng: StdRng,
}

impl DetailedPlacer {
    /// Builds a placer for `blocks` over the cluster's `pool`.
    ///
    /// The initial assignment pairs blocks with cells in identifier/scan
    /// order, so construction is deterministic. Fails with
    /// [`PlaceError::CapacityExceeded`] if the pool cannot hold the blocks
    /// of some tile type.
    pub fn new(
        blocks: &BTreeSet<BlockId>,
        design: &PackedDesign,
        pool: &CellPool,
        netlist: ReducedNetlist,
        context: &Placement,
        seed: u64,
    ) -> Result<Self, PlaceError> {
        let mut by_type: BTreeMap<TileType, Vec<BlockId>> = BTreeMap::new();
        let mut tile_of = HashMap::new();
        for block in blocks {
            let kind = design
                .block(block)
                .map(|b| b.kind)
                .ok_or_else(|| PlaceError::Internal(format!("unknown block {block}")))?;
            let ty = kind.tile_type().ok_or_else(|| {
                PlaceError::Internal(format!("block {block} has no placeable tile type"))
            })?;
            by_type.entry(ty).or_default().push(block.clone());
            tile_of.insert(block.clone(), ty);
        }

        let mut state = BTreeMap::new();
        let mut occupancy = HashMap::new();
        let mut cells_by_type = BTreeMap::new();
        for (ty, group) in &by_type {
            let cells: Vec<Position> = pool.cells_of(*ty).collect();
            if cells.len() < group.len() {
                return Err(PlaceError::CapacityExceeded {
                    tile: *ty,
                    available: cells.len(),
                    required: group.len(),
                });
            }
            for (block, &cell) in group.iter().zip(cells.iter()) {
                state.insert(block.clone(), cell);
                occupancy.insert(cell, block.clone());
            }
            cells_by_type.insert(*ty, cells);
        }

        let movable: Vec<BlockId> = blocks.iter().cloned().collect();
        let steps = (MOVES_PER_TEMP_MULTIPLIER * movable.len()).max(10);
        Ok(Self {
            netlist,
            state,
            context: context.clone().into_map(),
            pool: cells_by_type,
            tile_of,
            movable,
            occupancy,
            steps,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Runs the annealing schedule to completion.
    pub fn anneal(&mut self) {
        let n = self.movable.len();
        if n < 2 && self.pool.values().map(Vec::len).sum::<usize>() <= n {
            return;
        }

        let mut temperature = (n.max(1) as f64).sqrt() * 2.0;
        while temperature > MIN_TEMPERATURE {
            let mut accepted = 0usize;
            for _ in 0..self.steps {
                if self.propose(temperature) {
                    accepted += 1;
                }
            }
            temperature *= COOLING_RATE;
            if (accepted as f64 / self.steps as f64) < 0.001 {
                break;
            }
        }
    }

    /// Returns the current total cost of the working state.
    pub fn current_cost(&self) -> f64 {
        cost::total_cost(&self.netlist, |b| self.position_of(b))
    }

    /// Consumes the placer, returning the final block positions.
    pub fn into_state(self) -> Placement {
        self.state.into_iter().collect()
    }

    fn position_of(&self, block: &BlockId) -> Option<Position> {
        self.state
            .get(block)
            .or_else(|| self.context.get(block))
            .copied()
    }

    /// Proposes one move; returns `true` if it was accepted.
    fn propose(&mut self, temperature: f64) -> bool {
        let block = self.movable[self.rng.gen_range(0..self.movable.len())].clone();
        let ty = self.tile_of[&block];
        let cells = &self.pool[&ty];
        let target = cells[self.rng.gen_range(0..cells.len())];
        let current = self.state[&block];
        if target == current {
            return false;
        }

        let occupant = self.occupancy.get(&target).cloned();
        let before = match &occupant {
            Some(other) => self.pair_cost(&block, other),
            None => self.incident_cost(&block),
        };

        self.apply(&block, current, occupant.as_ref(), target);

        let after = match &occupant {
            Some(other) => self.pair_cost(&block, other),
            None => self.incident_cost(&block),
        };

        let delta = after - before;
        if delta < 0.0 || self.rng.gen::<f64>() < (-delta / temperature).exp() {
            true
        } else {
            // Reject: undo the move.
            self.apply(&block, target, occupant.as_ref(), current);
            false
        }
    }

    /// Moves `block` from `from` to `to`, swapping with `other` if present.
    fn apply(&mut self, block: &BlockId, from: Position, other: Option<&BlockId>, to: Position) {
        self.state.insert(block.clone(), to);
        self.occupancy.remove(&from);
        self.occupancy.insert(to, block.clone());
        if let Some(other) = other {
            self.state.insert(other.clone(), from);
            self.occupancy.insert(from, other.clone());
        }
    }

    fn incident_cost(&self, block: &BlockId) -> f64 {
        cost::block_cost(&self.netlist, block, |b| self.position_of(b))
    }

    fn pair_cost(&self, a: &BlockId, b: &BlockId) -> f64 {
        cost::pair_cost(&self.netlist, a, b, |id| self.position_of(id))
    }
}
