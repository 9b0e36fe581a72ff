//! Coarse cluster-to-region annealing.
//!
//! The board is partitioned into a small grid of rectangular regions, one
//! candidate region per cluster. Construction checks feasibility (scaled
//! cluster demand against region capacity) and returns [`RegionInfeasible`]
//! instead of panicking; annealing then swaps cluster/region assignments to
//! minimize weighted inter-cluster distance; `squeeze` finally converts the
//! assignment into disjoint per-cluster cell pools and centroids.

use crate::data::{CellPool, Clustering, PackedDesign, Placement};
use crate::error::RegionInfeasible;
use crate::ids::ClusterId;
use mosaic_grid::{Board, Position, TileType};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

const COOLING_RATE: f64 = 0.95;
const MIN_TEMPERATURE: f64 = 0.01;
const MOVES_PER_TEMP_MULTIPLIER: usize = 10;

/// The tile types managed by the clustered pipeline.
const POOLED_TYPES: [TileType; 2] = [TileType::Pe, TileType::Mem];

#[derive(Debug, Clone)]
struct Region {
    origin: Position,
    width: u32,
    height: u32,
    capacity: BTreeMap<TileType, usize>,
}

impl Region {
    fn center(&self) -> Position {
        Position::new(self.origin.x + self.width / 2, self.origin.y + self.height / 2)
    }
}

/// Assigns clusters to coarse board regions by simulated annealing.
#[derive(Debug)]
pub struct RegionAnnealer<'a> {
    board: &'a Board,
    demands: BTreeMap<ClusterId, BTreeMap<TileType, usize>>,
    affinity: BTreeMap<(ClusterId, ClusterId), f64>,
    regions: Vec<Region>,
    assignment: BTreeMap<ClusterId, usize>,
    factor: u32,
    /// Cells already taken by fixed blocks; never handed to a pool.
    occupied: BTreeSet<Position>,
}

impl<'a> RegionAnnealer<'a> {
    /// Attempts to construct an annealer for the given clustering.
    ///
    /// `factor` scales each cluster's demanded region capacity in quarters
    /// (6 = 1.5x headroom, 4 = exact fit). Cells under `fixed` blocks are
    /// excluded from every capacity count and pool. Returns
    /// [`RegionInfeasible`] when the board cannot hold the clusters at this
    /// density; the caller is expected to retry with fewer clusters and a
    /// relaxed factor.
    pub fn try_new(
        clustering: &'a Clustering,
        design: &PackedDesign,
        board: &'a Board,
        fixed: &Placement,
        factor: u32,
    ) -> Result<Self, RegionInfeasible> {
        let demands = cluster_demands(clustering, design);
        let occupied: BTreeSet<Position> = fixed.iter().map(|(_, p)| p).collect();

        // Whole-board supply check first, on unscaled demand.
        for ty in POOLED_TYPES {
            let demand: usize = demands.values().map(|d| d.get(&ty).copied().unwrap_or(0)).sum();
            let capacity = board.count_of(ty)
                - occupied
                    .iter()
                    .filter(|&&p| board.tile_at(p) == Some(ty))
                    .count();
            if demand > capacity {
                return Err(RegionInfeasible::BoardOverflow {
                    tile: ty,
                    demand,
                    capacity,
                });
            }
        }

        let regions = partition_regions(board, clustering.len(), &occupied);

        // Greedy initial assignment: biggest clusters first, each into the
        // emptiest region that fits its scaled demand.
        let mut order: Vec<ClusterId> = demands.keys().copied().collect();
        order.sort_by_key(|cid| {
            std::cmp::Reverse(demands[cid].values().sum::<usize>())
        });
        let mut taken = vec![false; regions.len()];
        let mut assignment = BTreeMap::new();
        for cid in order {
            let fit = regions
                .iter()
                .enumerate()
                .find(|&(i, region)| !taken[i] && fits(&demands[&cid], region, factor));
            match fit {
                Some((i, _)) => {
                    taken[i] = true;
                    assignment.insert(cid, i);
                }
                None => {
                    let (tile, demand) = worst_demand(&demands[&cid], factor);
                    let capacity = regions
                        .iter()
                        .map(|r| r.capacity.get(&tile).copied().unwrap_or(0))
                        .max()
                        .unwrap_or(0);
                    return Err(RegionInfeasible::RegionOverflow {
                        cluster: cid,
                        tile,
                        demand,
                        capacity,
                    });
                }
            }
        }

        Ok(Self {
            board,
            affinity: cluster_affinity(clustering, design),
            demands,
            regions,
            assignment,
            factor,
            occupied,
        })
    }

    /// Refines the cluster-to-region assignment with simulated annealing.
    pub fn anneal(&mut self, rng: &mut StdRng) {
        let k = self.assignment.len();
        if k < 2 {
            return;
        }
        let clusters: Vec<ClusterId> = self.assignment.keys().copied().collect();
        let mut temperature = (k as f64).sqrt() * 2.0;
        let moves_per_temp = (MOVES_PER_TEMP_MULTIPLIER * k).max(10);
        let mut current_cost = self.cost();

        while temperature > MIN_TEMPERATURE {
            let mut accepted = 0;
            for _ in 0..moves_per_temp {
                let cid = clusters[rng.gen_range(0..clusters.len())];
                let from = self.assignment[&cid];
                let to = rng.gen_range(0..self.regions.len());
                if to == from {
                    continue;
                }
                let other = self.cluster_in_region(to);

                // Both endpoints must stay feasible after the move.
                if !fits(&self.demands[&cid], &self.regions[to], self.factor) {
                    continue;
                }
                if let Some(o) = other {
                    if !fits(&self.demands[&o], &self.regions[from], self.factor) {
                        continue;
                    }
                }

                self.apply(cid, other, from, to);
                let new_cost = self.cost();
                let delta = new_cost - current_cost;
                if delta < 0.0 || rng.gen::<f64>() < (-delta / temperature).exp() {
                    current_cost = new_cost;
                    accepted += 1;
                } else {
                    self.apply(cid, other, to, from);
                }
            }
            temperature *= COOLING_RATE;
            if (accepted as f64 / moves_per_temp as f64) < 0.001 {
                break;
            }
        }
    }

    /// Converts the region assignment into disjoint per-cluster cell pools
    /// and a centroid per cluster.
    ///
    /// Each cluster first receives exactly its demanded cells (nearest to
    /// its region center), then remaining cells are distributed as slack up
    /// to the scaled demand.
    pub fn squeeze(&self) -> (BTreeMap<ClusterId, CellPool>, BTreeMap<ClusterId, Position>) {
        let mut available: BTreeMap<TileType, BTreeSet<Position>> = POOLED_TYPES
            .iter()
            .map(|&ty| {
                let cells = self
                    .board
                    .cells_of(ty)
                    .into_iter()
                    .filter(|p| !self.occupied.contains(p))
                    .collect();
                (ty, cells)
            })
            .collect();

        let mut pools: BTreeMap<ClusterId, CellPool> =
            self.assignment.keys().map(|&cid| (cid, CellPool::new())).collect();

        // Pass 1: guaranteed demand.
        for (&cid, &region) in &self.assignment {
            let center = self.regions[region].center();
            for ty in POOLED_TYPES {
                let need = self.demands[&cid].get(&ty).copied().unwrap_or(0);
                take_nearest(&mut available, &mut pools, cid, ty, center, need);
            }
        }

        // Pass 2: slack up to the scaled demand, while cells remain.
        for (&cid, &region) in &self.assignment {
            let center = self.regions[region].center();
            for ty in POOLED_TYPES {
                let need = self.demands[&cid].get(&ty).copied().unwrap_or(0);
                let slack = scaled(need, self.factor).saturating_sub(need);
                take_nearest(&mut available, &mut pools, cid, ty, center, slack);
            }
        }

        let centroids = pools
            .iter()
            .map(|(&cid, pool)| {
                let center = self.regions[self.assignment[&cid]].center();
                (cid, pool_centroid(pool).unwrap_or(center))
            })
            .collect();
        (pools, centroids)
    }

    /// Returns the region index a cluster is assigned to (for tests).
    #[cfg(test)]
    pub(crate) fn region_of(&self, cluster: ClusterId) -> Option<usize> {
        self.assignment.get(&cluster).copied()
    }

    fn cluster_in_region(&self, region: usize) -> Option<ClusterId> {
        self.assignment
            .iter()
            .find(|(_, &r)| r == region)
            .map(|(&cid, _)| cid)
    }

    fn apply(&mut self, cid: ClusterId, other: Option<ClusterId>, from: usize, to: usize) {
        self.assignment.insert(cid, to);
        if let Some(o) = other {
            self.assignment.insert(o, from);
        }
    }

    fn cost(&self) -> f64 {
        let mut total = 0.0;
        for (&(a, b), &w) in &self.affinity {
            let ca = self.regions[self.assignment[&a]].center();
            let cb = self.regions[self.assignment[&b]].center();
            total += w * ca.manhattan(cb) as f64;
        }
        total
    }
}

fn scaled(demand: usize, factor: u32) -> usize {
    (demand * factor as usize).div_ceil(4)
}

fn fits(demand: &BTreeMap<TileType, usize>, region: &Region, factor: u32) -> bool {
    POOLED_TYPES.iter().all(|ty| {
        let need = scaled(demand.get(ty).copied().unwrap_or(0), factor);
        need <= region.capacity.get(ty).copied().unwrap_or(0)
    })
}

fn worst_demand(demand: &BTreeMap<TileType, usize>, factor: u32) -> (TileType, usize) {
    POOLED_TYPES
        .iter()
        .map(|&ty| (ty, scaled(demand.get(&ty).copied().unwrap_or(0), factor)))
        .max_by_key(|&(_, d)| d)
        .unwrap_or((TileType::Pe, 0))
}

fn cluster_demands(
    clustering: &Clustering,
    design: &PackedDesign,
) -> BTreeMap<ClusterId, BTreeMap<TileType, usize>> {
    let mut demands = BTreeMap::new();
    for (cid, members) in clustering.clusters() {
        let mut demand: BTreeMap<TileType, usize> = BTreeMap::new();
        for block in members {
            if let Some(ty) = design
                .block(block)
                .and_then(|b| b.kind.tile_type())
                .filter(|ty| POOLED_TYPES.contains(ty))
            {
                *demand.entry(ty).or_insert(0) += 1;
            }
        }
        demands.insert(cid, demand);
    }
    demands
}

fn cluster_affinity(
    clustering: &Clustering,
    design: &PackedDesign,
) -> BTreeMap<(ClusterId, ClusterId), f64> {
    let mut affinity: BTreeMap<(ClusterId, ClusterId), f64> = BTreeMap::new();
    for net in &design.nets {
        let touched: BTreeSet<ClusterId> = net
            .blocks
            .iter()
            .filter_map(|b| clustering.cluster_of(b))
            .collect();
        let touched: Vec<ClusterId> = touched.into_iter().collect();
        for i in 0..touched.len() {
            for j in (i + 1)..touched.len() {
                *affinity.entry((touched[i], touched[j])).or_insert(0.0) += net.weight;
            }
        }
    }
    affinity
}

fn partition_regions(board: &Board, k: usize, occupied: &BTreeSet<Position>) -> Vec<Region> {
    let k = k.max(1);
    let cols = (k as f64).sqrt().ceil() as u32;
    let rows = (k as u32).div_ceil(cols);
    let box_w = (board.width() / cols).max(1);
    let box_h = (board.height() / rows).max(1);

    let mut regions = Vec::new();
    for j in 0..rows {
        for i in 0..cols {
            let origin = Position::new(i * box_w, j * box_h);
            // The last row/column absorbs the remainder.
            let width = if i + 1 == cols { board.width() - origin.x } else { box_w };
            let height = if j + 1 == rows { board.height() - origin.y } else { box_h };
            let mut capacity: BTreeMap<TileType, usize> = BTreeMap::new();
            for y in origin.y..origin.y + height {
                for x in origin.x..origin.x + width {
                    let pos = Position::new(x, y);
                    if occupied.contains(&pos) {
                        continue;
                    }
                    if let Some(ty) = board.tile_at(pos) {
                        *capacity.entry(ty).or_insert(0) += 1;
                    }
                }
            }
            regions.push(Region {
                origin,
                width,
                height,
                capacity,
            });
        }
    }
    regions
}

fn take_nearest(
    available: &mut BTreeMap<TileType, BTreeSet<Position>>,
    pools: &mut BTreeMap<ClusterId, CellPool>,
    cid: ClusterId,
    ty: TileType,
    center: Position,
    count: usize,
) {
    if count == 0 {
        return;
    }
    let Some(cells) = available.get_mut(&ty) else {
        return;
    };
    let mut sorted: Vec<Position> = cells.iter().copied().collect();
    sorted.sort_by_key(|&p| (p.manhattan(center), p));
    for p in sorted.into_iter().take(count) {
        cells.remove(&p);
        if let Some(pool) = pools.get_mut(&cid) {
            pool.insert(ty, p);
        }
    }
}

fn pool_centroid(pool: &CellPool) -> Option<Position> {
    let mut sum_x: u64 = 0;
    let mut sum_y: u64 = 0;
    let mut n: u64 = 0;
    for (_, p) in pool.iter() {
        sum_x += p.x as u64;
        sum_y += p.y as u64;
        n += 1;
    }
    (n > 0).then(|| Position::new((sum_x / n) as u32, (sum_y / n) as u32))
}
