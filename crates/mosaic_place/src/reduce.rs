//! Netlist reduction against a clustering.
//!
//! Collapses the full netlist to the view seen by one cluster's annealer:
//! the cluster's own blocks stay, every other cluster shrinks to a single
//! proxy node, and fixed blocks (members of no cluster) stay as themselves.
//! This bounds the per-cluster problem to `cluster size + neighboring
//! clusters + connected fixed blocks`, independent of total netlist size.

use crate::data::{BlockId, Clustering, Net, Placement, ReducedNetlist};
use crate::ids::ClusterId;
use std::collections::BTreeMap;

/// Reduces the netlist for one target cluster.
///
/// Hyperedges contribute driver-to-member pairwise edges at the net's
/// weight. Multiple original connections that collapse onto the same node
/// pair aggregate by summation. Edges that do not touch the target cluster,
/// and edges whose endpoints collapse to the same node, are dropped.
pub fn reduce_for_cluster(
    nets: &[Net],
    clustering: &Clustering,
    fixed: &Placement,
    target: ClusterId,
) -> ReducedNetlist {
    let node_for = |block: &BlockId| -> Option<(BlockId, bool)> {
        if let Some(c) = clustering.cluster_of(block) {
            if c == target {
                Some((block.clone(), true))
            } else {
                Some((BlockId::proxy(c), false))
            }
        } else if fixed.contains(block) {
            Some((block.clone(), false))
        } else {
            None
        }
    };

    let mut edges: BTreeMap<(BlockId, BlockId), f64> = BTreeMap::new();
    for net in nets {
        let Some((driver, sinks)) = net.blocks.split_first() else {
            continue;
        };
        let Some((a, a_in_target)) = node_for(driver) else {
            continue;
        };
        for sink in sinks {
            let Some((b, b_in_target)) = node_for(sink) else {
                continue;
            };
            if a == b || !(a_in_target || b_in_target) {
                continue;
            }
            let key = if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            *edges.entry(key).or_insert(0.0) += net.weight;
        }
    }
    ReducedNetlist::from_edges(edges)
}
