//! Core placement data structures.
//!
//! Defines the packed design consumed by the pipeline: blocks (with an
//! explicit kind tag, an optional embedding vector, and an optional fixed
//! position), hyperedge nets, clusterings, per-cluster cell pools, reduced
//! pairwise netlists, and the final [`Placement`] map.

use crate::ids::{ClusterId, NetId};
use mosaic_grid::{BlockKind, Position, TileType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A block identifier from the packed netlist.
///
/// Identifiers are opaque strings; the block's type lives in the explicit
/// [`BlockKind`] tag on [`Block`], not in the identifier's spelling. The one
/// synthetic form is the cluster proxy, produced by [`BlockId::proxy`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(String);

impl BlockId {
    /// Creates a block identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the synthetic proxy identifier for a cluster (`x<cluster>`).
    ///
    /// Proxy identifiers only ever appear inside reduced netlists and the
    /// per-job fixed-position context; never in the final placement.
    pub fn proxy(cluster: ClusterId) -> Self {
        Self(format!("x{cluster}"))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A placeable (or fixed) block in the packed design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// The block's identifier.
    pub id: BlockId,
    /// The block's kind, set once at parse time.
    pub kind: BlockKind,
    /// The learned spatial embedding vector, if any.
    pub embedding: Option<Vec<f64>>,
    /// A pre-assigned position, if the block is fixed.
    pub fixed: Option<Position>,
}

/// A net in the packed design: a hyperedge over block identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The unique ID of this net.
    pub id: NetId,
    /// The blocks connected by this net; the first entry is the driver.
    pub blocks: Vec<BlockId>,
    /// The net's weight in the placement cost.
    pub weight: f64,
}

/// The packed design: all blocks plus the netlist connecting them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackedDesign {
    /// All blocks, keyed by identifier.
    pub blocks: BTreeMap<BlockId, Block>,
    /// All nets.
    pub nets: Vec<Net>,
}

impl PackedDesign {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block, replacing any previous block with the same identifier.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.insert(block.id.clone(), block);
    }

    /// Adds a net over the given blocks and returns its ID.
    pub fn add_net(&mut self, blocks: Vec<BlockId>, weight: f64) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        self.nets.push(Net { id, blocks, weight });
        id
    }

    /// Returns the block with the given identifier, if present.
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Returns the number of blocks of the given kind.
    pub fn count_kind(&self, kind: BlockKind) -> usize {
        self.blocks.values().filter(|b| b.kind == kind).count()
    }

    /// Iterates blocks of the given kind in identifier order.
    pub fn blocks_of_kind(&self, kind: BlockKind) -> impl Iterator<Item = &Block> {
        self.blocks.values().filter(move |b| b.kind == kind)
    }

    /// Drops nets that cannot influence placement.
    ///
    /// A net is kept only if it connects at least two distinct blocks that
    /// exist in the design.
    pub fn prune_nets(&mut self) {
        let blocks = &self.blocks;
        self.nets.retain(|net| {
            let distinct: BTreeSet<&BlockId> = net
                .blocks
                .iter()
                .filter(|b| blocks.contains_key(*b))
                .collect();
            distinct.len() >= 2
        });
    }
}

/// A partition of placeable blocks into named clusters.
#[derive(Debug, Clone)]
pub struct Clustering {
    members: BTreeMap<ClusterId, BTreeSet<BlockId>>,
    by_block: HashMap<BlockId, ClusterId>,
}

impl Clustering {
    /// Creates a clustering from cluster membership sets.
    pub fn new(members: BTreeMap<ClusterId, BTreeSet<BlockId>>) -> Self {
        let mut by_block = HashMap::new();
        for (&cid, set) in &members {
            for b in set {
                by_block.insert(b.clone(), cid);
            }
        }
        Self { members, by_block }
    }

    /// Creates a single-cluster partition containing the given blocks.
    pub fn single(cluster: ClusterId, blocks: BTreeSet<BlockId>) -> Self {
        let mut members = BTreeMap::new();
        members.insert(cluster, blocks);
        Self::new(members)
    }

    /// Returns the cluster a block belongs to, if any.
    pub fn cluster_of(&self, block: &BlockId) -> Option<ClusterId> {
        self.by_block.get(block).copied()
    }

    /// Returns the members of a cluster.
    pub fn members(&self, cluster: ClusterId) -> Option<&BTreeSet<BlockId>> {
        self.members.get(&cluster)
    }

    /// Iterates clusters in ID order.
    pub fn clusters(&self) -> impl Iterator<Item = (ClusterId, &BTreeSet<BlockId>)> {
        self.members.iter().map(|(&cid, set)| (cid, set))
    }

    /// Returns the number of clusters.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if there are no clusters.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the cluster sizes in ID order.
    pub fn sizes(&self) -> Vec<usize> {
        self.members.values().map(BTreeSet::len).collect()
    }
}

/// The candidate board cells assigned to one cluster, grouped by tile type.
#[derive(Debug, Clone, Default)]
pub struct CellPool {
    cells: BTreeMap<TileType, BTreeSet<Position>>,
}

impl CellPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell of the given type to the pool.
    pub fn insert(&mut self, ty: TileType, pos: Position) {
        self.cells.entry(ty).or_default().insert(pos);
    }

    /// Returns the cells of the given type.
    pub fn cells_of(&self, ty: TileType) -> impl Iterator<Item = Position> + '_ {
        self.cells.get(&ty).into_iter().flatten().copied()
    }

    /// Returns the number of cells of the given type.
    pub fn count_of(&self, ty: TileType) -> usize {
        self.cells.get(&ty).map(BTreeSet::len).unwrap_or(0)
    }

    /// Iterates all cells in the pool with their types.
    pub fn iter(&self) -> impl Iterator<Item = (TileType, Position)> + '_ {
        self.cells
            .iter()
            .flat_map(|(&ty, set)| set.iter().map(move |&p| (ty, p)))
    }

    /// Returns the total number of cells in the pool.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeSet::len).sum()
    }

    /// Returns `true` if the pool has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A reduced netlist: pairwise weighted edges over a bounded node set.
///
/// Produced by the netlist reducer for one cluster (or deblock box). Nodes
/// are the cluster's own blocks, fixed blocks with connections into the
/// cluster, and one proxy node per connected external cluster.
#[derive(Debug, Clone, Default)]
pub struct ReducedNetlist {
    edges: BTreeMap<(BlockId, BlockId), f64>,
    adjacency: HashMap<BlockId, Vec<(BlockId, f64)>>,
}

impl ReducedNetlist {
    /// Builds a reduced netlist from canonicalized (a < b) weighted edges.
    pub fn from_edges(edges: BTreeMap<(BlockId, BlockId), f64>) -> Self {
        let mut adjacency: HashMap<BlockId, Vec<(BlockId, f64)>> = HashMap::new();
        for ((a, b), &w) in &edges {
            adjacency.entry(a.clone()).or_default().push((b.clone(), w));
            adjacency.entry(b.clone()).or_default().push((a.clone(), w));
        }
        Self { edges, adjacency }
    }

    /// Returns the weight of the edge between `a` and `b`, if present.
    pub fn edge_weight(&self, a: &BlockId, b: &BlockId) -> Option<f64> {
        let key = if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.edges.get(&key).copied()
    }

    /// Returns the neighbors of a node with edge weights.
    pub fn neighbors(&self, block: &BlockId) -> &[(BlockId, f64)] {
        self.adjacency.get(block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates all edges in canonical order.
    pub fn edges(&self) -> impl Iterator<Item = (&BlockId, &BlockId, f64)> {
        self.edges.iter().map(|((a, b), &w)| (a, b, w))
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterates all nodes touched by at least one edge.
    pub fn nodes(&self) -> impl Iterator<Item = &BlockId> {
        self.adjacency.keys()
    }
}

/// A mapping from block identifiers to board positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    positions: BTreeMap<BlockId, Position>,
}

impl Placement {
    /// Creates an empty placement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a block to a position.
    pub fn insert(&mut self, block: BlockId, pos: Position) {
        self.positions.insert(block, pos);
    }

    /// Returns the position of a block, if placed.
    pub fn get(&self, block: &BlockId) -> Option<Position> {
        self.positions.get(block).copied()
    }

    /// Returns `true` if the block has a position.
    pub fn contains(&self, block: &BlockId) -> bool {
        self.positions.contains_key(block)
    }

    /// Merges another placement into this one.
    ///
    /// Per-cluster results have disjoint key sets by construction, so merge
    /// order does not matter; later entries win on (unexpected) overlap.
    pub fn merge(&mut self, other: Placement) {
        self.positions.extend(other.positions);
    }

    /// Iterates placed blocks in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockId, Position)> {
        self.positions.iter().map(|(b, &p)| (b, p))
    }

    /// Returns the number of placed blocks.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no block is placed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Consumes the placement, returning the underlying map.
    pub fn into_map(self) -> BTreeMap<BlockId, Position> {
        self.positions
    }
}

impl FromIterator<(BlockId, Position)> for Placement {
    fn from_iter<T: IntoIterator<Item = (BlockId, Position)>>(iter: T) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pe(id: &str) -> Block {
        Block {
            id: BlockId::new(id),
            kind: BlockKind::Pe,
            embedding: None,
            fixed: None,
        }
    }

    #[test]
    fn proxy_identifier_format() {
        assert_eq!(BlockId::proxy(ClusterId::from_raw(3)).as_str(), "x3");
    }

    #[test]
    fn add_and_count_blocks() {
        let mut d = PackedDesign::new();
        d.add_block(pe("p1"));
        d.add_block(pe("p2"));
        d.add_block(Block {
            id: BlockId::new("m1"),
            kind: BlockKind::Mem,
            embedding: None,
            fixed: None,
        });
        assert_eq!(d.count_kind(BlockKind::Pe), 2);
        assert_eq!(d.count_kind(BlockKind::Mem), 1);
        assert_eq!(d.blocks_of_kind(BlockKind::Pe).count(), 2);
    }

    #[test]
    fn prune_drops_degenerate_nets() {
        let mut d = PackedDesign::new();
        d.add_block(pe("a"));
        d.add_block(pe("b"));
        d.add_net(vec![BlockId::new("a"), BlockId::new("b")], 1.0);
        d.add_net(vec![BlockId::new("a")], 1.0);
        d.add_net(vec![BlockId::new("a"), BlockId::new("a")], 1.0);
        d.add_net(vec![BlockId::new("a"), BlockId::new("ghost")], 1.0);
        d.prune_nets();
        assert_eq!(d.nets.len(), 1);
        assert_eq!(d.nets[0].blocks.len(), 2);
    }

    #[test]
    fn clustering_reverse_lookup() {
        let mut members = BTreeMap::new();
        members.insert(
            ClusterId::from_raw(0),
            [BlockId::new("a"), BlockId::new("b")].into_iter().collect(),
        );
        members.insert(
            ClusterId::from_raw(1),
            [BlockId::new("c")].into_iter().collect(),
        );
        let c = Clustering::new(members);
        assert_eq!(c.len(), 2);
        assert_eq!(c.cluster_of(&BlockId::new("b")), Some(ClusterId::from_raw(0)));
        assert_eq!(c.cluster_of(&BlockId::new("c")), Some(ClusterId::from_raw(1)));
        assert_eq!(c.cluster_of(&BlockId::new("z")), None);
        assert_eq!(c.sizes(), vec![2, 1]);
    }

    #[test]
    fn cell_pool_grouping() {
        let mut pool = CellPool::new();
        pool.insert(TileType::Pe, Position::new(0, 0));
        pool.insert(TileType::Pe, Position::new(1, 0));
        pool.insert(TileType::Mem, Position::new(2, 0));
        assert_eq!(pool.count_of(TileType::Pe), 2);
        assert_eq!(pool.count_of(TileType::Mem), 1);
        assert_eq!(pool.count_of(TileType::Io), 0);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn reduced_netlist_adjacency() {
        let mut edges = BTreeMap::new();
        edges.insert((BlockId::new("a"), BlockId::new("b")), 1.0);
        edges.insert((BlockId::new("a"), BlockId::new("x1")), 2.0);
        let r = ReducedNetlist::from_edges(edges);
        assert_eq!(r.edge_count(), 2);
        assert_eq!(r.edge_weight(&BlockId::new("b"), &BlockId::new("a")), Some(1.0));
        assert_eq!(r.neighbors(&BlockId::new("a")).len(), 2);
        assert_eq!(r.neighbors(&BlockId::new("b")).len(), 1);
        assert!(r.edge_weight(&BlockId::new("b"), &BlockId::new("x1")).is_none());
    }

    #[test]
    fn placement_merge_is_order_independent() {
        let mut left = Placement::new();
        left.insert(BlockId::new("a"), Position::new(0, 0));
        let mut right = Placement::new();
        right.insert(BlockId::new("b"), Position::new(1, 1));

        let mut ab = left.clone();
        ab.merge(right.clone());
        let mut ba = right;
        ba.merge(left);
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn placement_serde_roundtrip() {
        let mut p = Placement::new();
        p.insert(BlockId::new("p1"), Position::new(4, 2));
        let json = serde_json::to_string(&p).unwrap();
        let back: Placement = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
