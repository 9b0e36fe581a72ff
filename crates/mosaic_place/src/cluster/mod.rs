//! Global placement: clustering blocks and assigning them board regions.
//!
//! Runs seeded k-means over embedding vectors, then anneals a coarse
//! cluster-to-region assignment. When the region annealer reports
//! infeasibility the cluster count is decremented and the density factor
//! relaxed; at zero clusters the whole netlist becomes a single cluster
//! with deterministically pre-assigned scan-order cell pools (the
//! whole-board fallback).

mod kmeans;
mod region;

pub use region::RegionAnnealer;

use crate::data::{BlockId, CellPool, Clustering, PackedDesign, Placement};
use crate::error::PlaceError;
use crate::ids::ClusterId;
use crate::seed::derive_seed;
use mosaic_grid::{Board, BlockKind, Position, TileType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};

/// Initial per-cluster density factor, in quarters (6 = 1.5x headroom).
const INITIAL_PLACE_FACTOR: u32 = 6;
/// Relaxed factor used for every retry after the first infeasibility.
const RELAXED_PLACE_FACTOR: u32 = 4;
/// Heuristic divisor for the default cluster count.
const BLOCKS_PER_CLUSTER: usize = 40;

/// The result of global placement.
#[derive(Debug, Clone)]
pub struct GlobalPlacement {
    /// The partition of placeable blocks into clusters.
    pub clustering: Clustering,
    /// One centroid per cluster, used as the cluster's proxy position.
    pub centroids: BTreeMap<ClusterId, Position>,
    /// Disjoint candidate cell pools per cluster.
    pub cluster_cells: BTreeMap<ClusterId, CellPool>,
    /// Whether the whole-board fallback was taken.
    pub fallback: bool,
}

/// Clusters the design's placeable blocks and assigns each cluster a region.
///
/// Blocks carrying an explicit fixed position are not placeable here: they
/// stay out of the clustering, and the cells under `fixed` are withheld
/// from every pool. `requested` overrides the heuristic cluster count
/// `ceil(n/40) + 1`. Returns [`PlaceError::CapacityExceeded`] when even
/// the whole-board fallback cannot fit the netlist.
pub fn global_place(
    design: &PackedDesign,
    board: &Board,
    fixed: &Placement,
    requested: Option<usize>,
    seed: u64,
) -> Result<GlobalPlacement, PlaceError> {
    let placeable: BTreeSet<BlockId> = design
        .blocks
        .values()
        .filter(|b| matches!(b.kind, BlockKind::Pe | BlockKind::Mem) && b.fixed.is_none())
        .map(|b| b.id.clone())
        .collect();
    let n = placeable.len();
    if n == 0 {
        return Ok(GlobalPlacement {
            clustering: Clustering::new(BTreeMap::new()),
            centroids: BTreeMap::new(),
            cluster_cells: BTreeMap::new(),
            fallback: false,
        });
    }

    let mut num_clusters = requested
        .unwrap_or_else(|| n.div_ceil(BLOCKS_PER_CLUSTER) + 1)
        .min(n);
    let mut factor = INITIAL_PLACE_FACTOR;

    let points = if num_clusters > 0 {
        Some(embedding_points(design, &placeable)?)
    } else {
        None
    };

    while num_clusters > 0 {
        let points = points.as_ref().expect("points exist while clustering");
        let mut rng = StdRng::seed_from_u64(derive_seed(seed, num_clusters as u64));
        let clustering = kmeans::cluster_blocks(points, num_clusters, &mut rng);

        let sizes = clustering.sizes();
        let (mean, std) = mean_std(&sizes);
        log::info!(
            "trying {} clusters (size mean {:.1}, std {:.1})",
            clustering.len(),
            mean,
            std
        );

        match RegionAnnealer::try_new(&clustering, design, board, fixed, factor) {
            Ok(mut annealer) => {
                let mut anneal_rng =
                    StdRng::seed_from_u64(derive_seed(seed, 0x7265_6769_6f6e));
                annealer.anneal(&mut anneal_rng);
                let (cluster_cells, centroids) = annealer.squeeze();
                return Ok(GlobalPlacement {
                    clustering,
                    centroids,
                    cluster_cells,
                    fallback: false,
                });
            }
            Err(infeasible) => {
                log::warn!(
                    "clustering at {num_clusters} clusters is infeasible ({infeasible}); retrying"
                );
                num_clusters -= 1;
                factor = RELAXED_PLACE_FACTOR;
            }
        }
    }

    whole_board_fallback(design, board, fixed, placeable)
}

/// Builds the single-cluster fallback with deterministic scan-order pools.
fn whole_board_fallback(
    design: &PackedDesign,
    board: &Board,
    fixed: &Placement,
    placeable: BTreeSet<BlockId>,
) -> Result<GlobalPlacement, PlaceError> {
    log::warn!("clustering infeasible at every count; falling back to whole-board annealing");

    let cluster = ClusterId::from_raw(0);
    let mut pool = CellPool::new();
    let occupied: BTreeSet<Position> = fixed.iter().map(|(_, p)| p).collect();
    let free_cells = |ty: TileType| -> Vec<Position> {
        board
            .cells_of(ty)
            .into_iter()
            .filter(|p| !occupied.contains(p))
            .collect()
    };
    let required = |kind: BlockKind| -> usize {
        design
            .blocks
            .values()
            .filter(|b| b.kind == kind && b.fixed.is_none())
            .count()
    };

    let pe_required = required(BlockKind::Pe);
    let pe_cells = free_cells(TileType::Pe);
    if pe_cells.len() < pe_required {
        return Err(PlaceError::CapacityExceeded {
            tile: TileType::Pe,
            available: pe_cells.len(),
            required: pe_required,
        });
    }
    log::info!(
        "using {} of {} available PE tiles",
        pe_required,
        pe_cells.len()
    );
    for pos in pe_cells.into_iter().take(pe_required) {
        pool.insert(TileType::Pe, pos);
    }

    let mem_required = required(BlockKind::Mem);
    let mem_cells = free_cells(TileType::Mem);
    if mem_cells.len() < mem_required {
        return Err(PlaceError::CapacityExceeded {
            tile: TileType::Mem,
            available: mem_cells.len(),
            required: mem_required,
        });
    }
    log::info!(
        "using {} of {} available MEM tiles",
        mem_required,
        mem_cells.len()
    );
    for pos in mem_cells {
        pool.insert(TileType::Mem, pos);
    }

    let mut centroids = BTreeMap::new();
    centroids.insert(cluster, board.center());
    let mut cluster_cells = BTreeMap::new();
    cluster_cells.insert(cluster, pool);

    Ok(GlobalPlacement {
        clustering: Clustering::single(cluster, placeable),
        centroids,
        cluster_cells,
        fallback: true,
    })
}

fn embedding_points(
    design: &PackedDesign,
    placeable: &BTreeSet<BlockId>,
) -> Result<BTreeMap<BlockId, Vec<f64>>, PlaceError> {
    placeable
        .iter()
        .map(|id| {
            let block = design
                .block(id)
                .ok_or_else(|| PlaceError::Internal(format!("unknown block {id}")))?;
            let emb = block
                .embedding
                .clone()
                .ok_or_else(|| PlaceError::MissingEmbedding { block: id.clone() })?;
            Ok((id.clone(), emb))
        })
        .collect()
}

fn mean_std(sizes: &[usize]) -> (f64, f64) {
    if sizes.is_empty() {
        return (0.0, 0.0);
    }
    let n = sizes.len() as f64;
    let mean = sizes.iter().sum::<usize>() as f64 / n;
    let var = sizes
        .iter()
        .map(|&s| (s as f64 - mean) * (s as f64 - mean))
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}
