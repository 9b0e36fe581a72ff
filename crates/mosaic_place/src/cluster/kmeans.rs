//! Seeded k-means over block embedding vectors.
//!
//! A plain Lloyd iteration, deterministic for a given RNG state: blocks are
//! visited in identifier order, ties break toward the lowest cluster index,
//! and empty clusters are reseeded to the point farthest from its center.

use crate::data::{BlockId, Clustering};
use crate::ids::ClusterId;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};

const MAX_ITERATIONS: usize = 100;

/// Partitions blocks into at most `k` clusters by embedding proximity.
///
/// Empty clusters are dropped from the result, so the returned clustering
/// may have fewer than `k` clusters for degenerate inputs.
pub(crate) fn cluster_blocks(
    points: &BTreeMap<BlockId, Vec<f64>>,
    k: usize,
    rng: &mut StdRng,
) -> Clustering {
    let blocks: Vec<&BlockId> = points.keys().collect();
    let vectors: Vec<&[f64]> = points.values().map(Vec::as_slice).collect();
    let n = blocks.len();
    let k = k.min(n).max(1);

    // Initial centers: k distinct points chosen by the seeded RNG.
    let mut picked: Vec<usize> = rand::seq::index::sample(rng, n, k).into_vec();
    picked.sort_unstable();
    let mut centers: Vec<Vec<f64>> = picked.iter().map(|&i| vectors[i].to_vec()).collect();

    let mut assignment = vec![0usize; n];
    for _ in 0..MAX_ITERATIONS {
        // Assignment step.
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let best = nearest_center(v, &centers);
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }

        // Update step.
        let dim = vectors[0].len();
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, v) in vectors.iter().enumerate() {
            let c = assignment[i];
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(v.iter()) {
                *s += x;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Reseed an empty cluster to the point farthest from its
                // current center, keeping all k clusters populated.
                let far = farthest_point(&vectors, &assignment, &centers);
                centers[c] = vectors[far].to_vec();
                assignment[far] = c;
                changed = true;
            } else {
                for (j, s) in sums[c].iter().enumerate() {
                    centers[c][j] = s / counts[c] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let mut members: BTreeMap<ClusterId, BTreeSet<BlockId>> = BTreeMap::new();
    for (i, block) in blocks.iter().enumerate() {
        members
            .entry(ClusterId::from_raw(assignment[i] as u32))
            .or_default()
            .insert((*block).clone());
    }
    members.retain(|_, set| !set.is_empty());
    Clustering::new(members)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_center(point: &[f64], centers: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, center) in centers.iter().enumerate() {
        let d = squared_distance(point, center);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn farthest_point(vectors: &[&[f64]], assignment: &[usize], centers: &[Vec<f64>]) -> usize {
    let mut worst = 0;
    let mut worst_d = -1.0;
    for (i, v) in vectors.iter().enumerate() {
        let d = squared_distance(v, &centers[assignment[i]]);
        if d > worst_d {
            worst_d = d;
            worst = i;
        }
    }
    worst
}
