//! Dependency graph primitives for schedule construction.
//!
//! [`Graph`] is a small adjacency-list graph over [`NodeId`]s with a
//! direction flag in the type. The schedule builder uses a [`DiGraph`] for
//! `before`/`after` constraints and set membership projection, and an
//! [`UnGraph`] for recording reported ambiguity pairs.
//!
//! Edge membership is tracked in a `HashSet` over packed node-pair keys
//! (canonicalized for undirected graphs), so `contains_edge` stays O(1) no
//! matter how dense the adjacency lists get.
//!
//! Cycle detection runs Tarjan's strongly-connected-components algorithm in
//! an **iterative** formulation: an explicit frame stack with per-frame
//! neighbor cursors replaces recursion, so pathological schedules cannot
//! overflow the call stack. [`DiGraph::iter_sccs`] is lazy and yields one
//! component per step, in reverse topological order of the condensation.

use std::collections::{HashMap, HashSet};

/// Identifies a schedule graph node: either a system or a system set.
///
/// The derived ordering places all systems before all sets, each group in
/// registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// A system, by registration index.
    System(usize),
    /// A named set, by registration index.
    Set(usize),
}

impl NodeId {
    /// Returns `true` for a system node.
    #[inline]
    pub fn is_system(self) -> bool {
        matches!(self, NodeId::System(_))
    }

    /// The registration index, whichever variant.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            NodeId::System(i) | NodeId::Set(i) => i,
        }
    }

    /// Packs the node into a u64 for edge-set keys.
    #[inline]
    fn pack(self) -> u64 {
        match self {
            NodeId::System(i) => i as u64,
            NodeId::Set(i) => (1 << 63) | i as u64,
        }
    }
}

/// An adjacency-list graph over [`NodeId`]s.
///
/// `DIRECTED` selects edge semantics at compile time; see [`DiGraph`] and
/// [`UnGraph`].
pub struct Graph<const DIRECTED: bool> {
    nodes: Vec<NodeId>,
    indices: HashMap<NodeId, usize>,
    adjacency: Vec<Vec<NodeId>>,
    edges: HashSet<(u64, u64)>,
}

/// A directed graph.
pub type DiGraph = Graph<true>;
/// An undirected graph.
pub type UnGraph = Graph<false>;

impl<const DIRECTED: bool> Default for Graph<DIRECTED> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            indices: HashMap::new(),
            adjacency: Vec::new(),
            edges: HashSet::new(),
        }
    }
}

impl<const DIRECTED: bool> Graph<DIRECTED> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn edge_key(a: NodeId, b: NodeId) -> (u64, u64) {
        let (a, b) = (a.pack(), b.pack());
        if DIRECTED || a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Number of nodes.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if `node` is present.
    #[inline]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.indices.contains_key(&node)
    }

    /// The nodes, in current index order.
    #[inline]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The internal index of `node`.
    ///
    /// ## Panics
    /// Panics if the node is absent; callers only index nodes they added.
    pub fn to_index(&self, node: NodeId) -> usize {
        self.indices
            .get(&node)
            .copied()
            .unwrap_or_else(|| panic!("node {node:?} is not in the graph"))
    }

    /// Adds `node` if absent.
    pub fn add_node(&mut self, node: NodeId) {
        if !self.indices.contains_key(&node) {
            self.indices.insert(node, self.nodes.len());
            self.nodes.push(node);
            self.adjacency.push(Vec::new());
        }
    }

    /// Removes `node` and every edge touching it.
    ///
    /// ## Behavior
    /// The last node is swap-moved into the vacated index, so node indices
    /// are **not stable** across removal; anything caching indices must be
    /// rebuilt. The node → index map is kept consistent.
    pub fn remove_node(&mut self, node: NodeId) {
        let Some(index) = self.indices.remove(&node) else {
            return;
        };
        self.nodes.swap_remove(index);
        self.adjacency.swap_remove(index);
        if index < self.nodes.len() {
            self.indices.insert(self.nodes[index], index);
        }
        for neighbors in &mut self.adjacency {
            neighbors.retain(|&n| n != node);
        }
        self.edges
            .retain(|&(a, b)| a != node.pack() && b != node.pack());
    }

    /// Adds an edge (both nodes are added if absent). Parallel edges are
    /// collapsed.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) {
        if !self.edges.insert(Self::edge_key(a, b)) {
            return;
        }
        self.add_node(a);
        self.add_node(b);
        let ai = self.to_index(a);
        self.adjacency[ai].push(b);
        if !DIRECTED && a != b {
            let bi = self.to_index(b);
            self.adjacency[bi].push(a);
        }
    }

    /// Removes the edge between `a` and `b`, if present.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) {
        if !self.edges.remove(&Self::edge_key(a, b)) {
            return;
        }
        if let Some(&ai) = self.indices.get(&a) {
            self.adjacency[ai].retain(|&n| n != b);
        }
        if !DIRECTED {
            if let Some(&bi) = self.indices.get(&b) {
                self.adjacency[bi].retain(|&n| n != a);
            }
        }
    }

    /// Returns `true` if the edge is present (either orientation for
    /// undirected graphs).
    #[inline]
    pub fn contains_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.edges.contains(&Self::edge_key(a, b))
    }

    /// Iterates `node`'s neighbors (successors for directed graphs).
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.indices
            .get(&node)
            .map(|&i| self.adjacency[i].as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// Iterates all edges as `(from, to)` pairs (one orientation per
    /// undirected edge).
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes.iter().enumerate().flat_map(move |(i, &from)| {
            self.adjacency[i]
                .iter()
                .filter(move |&&to| DIRECTED || Self::edge_key(from, to) == (from.pack(), to.pack()))
                .map(move |&to| (from, to))
        })
    }
}

impl DiGraph {
    /// Lazily yields strongly connected components, one per iterator step,
    /// in reverse topological order of the condensation.
    pub fn iter_sccs(&self) -> TarjanScc<'_> {
        let n = self.nodes.len();
        TarjanScc {
            graph: self,
            counter: 0,
            node_index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            frames: Vec::new(),
            next_root: 0,
        }
    }
}

struct Frame {
    node: usize,
    cursor: usize,
}

/// Iterator state for the iterative Tarjan walk. See
/// [`DiGraph::iter_sccs`].
pub struct TarjanScc<'g> {
    graph: &'g DiGraph,
    counter: usize,
    node_index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    frames: Vec<Frame>,
    next_root: usize,
}

impl TarjanScc<'_> {
    fn visit(&mut self, v: usize) {
        self.node_index[v] = Some(self.counter);
        self.lowlink[v] = self.counter;
        self.counter += 1;
        self.on_stack[v] = true;
        self.stack.push(v);
        self.frames.push(Frame { node: v, cursor: 0 });
    }
}

impl Iterator for TarjanScc<'_> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.frames.is_empty() {
                while self.next_root < self.graph.nodes.len()
                    && self.node_index[self.next_root].is_some()
                {
                    self.next_root += 1;
                }
                if self.next_root >= self.graph.nodes.len() {
                    return None;
                }
                self.visit(self.next_root);
            }

            while let Some(frame_index) = self.frames.len().checked_sub(1) {
                let v = self.frames[frame_index].node;
                let neighbors = &self.graph.adjacency[v];

                // Resume the neighbor walk where this frame left off.
                let mut descended = false;
                while self.frames[frame_index].cursor < neighbors.len() {
                    let w = self.graph.to_index(neighbors[self.frames[frame_index].cursor]);
                    self.frames[frame_index].cursor += 1;
                    if self.node_index[w].is_none() {
                        self.visit(w);
                        descended = true;
                        break;
                    }
                    if self.on_stack[w] {
                        let w_index = self.node_index[w]
                            .unwrap_or_else(|| unreachable!("visited node has an index"));
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                }
                if descended {
                    continue;
                }

                self.frames.pop();
                let v_index = self.node_index[v]
                    .unwrap_or_else(|| unreachable!("visited node has an index"));
                if let Some(parent) = self.frames.last() {
                    let p = parent.node;
                    self.lowlink[p] = self.lowlink[p].min(self.lowlink[v]);
                }
                if self.lowlink[v] == v_index {
                    let mut scc = Vec::new();
                    while let Some(top) = self.stack.pop() {
                        self.on_stack[top] = false;
                        scc.push(self.graph.nodes[top]);
                        if top == v {
                            break;
                        }
                    }
                    return Some(scc);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys(i: usize) -> NodeId {
        NodeId::System(i)
    }

    #[test]
    fn node_ordering_places_systems_first() {
        assert!(NodeId::System(100) < NodeId::Set(0));
        assert!(NodeId::System(1) < NodeId::System(2));
        assert!(NodeId::Set(1) < NodeId::Set(2));
    }

    #[test]
    fn undirected_edges_are_orientation_free() {
        let mut graph = UnGraph::new();
        graph.add_edge(sys(0), sys(1));
        assert!(graph.contains_edge(sys(1), sys(0)));
        graph.remove_edge(sys(1), sys(0));
        assert!(!graph.contains_edge(sys(0), sys(1)));
        assert_eq!(graph.neighbors(sys(0)).count(), 0);
    }

    #[test]
    fn remove_node_swaps_and_stays_consistent() {
        let mut graph = DiGraph::new();
        for i in 0..4 {
            graph.add_node(sys(i));
        }
        graph.add_edge(sys(0), sys(3));
        graph.add_edge(sys(3), sys(1));
        graph.remove_node(sys(0));
        assert_eq!(graph.node_count(), 3);
        assert!(!graph.contains_edge(sys(0), sys(3)));
        assert!(graph.contains_edge(sys(3), sys(1)));
        // Every surviving node still resolves through the index map.
        for &node in graph.nodes() {
            let index = graph.to_index(node);
            assert_eq!(graph.nodes()[index], node);
        }
    }

    #[test]
    fn sccs_group_mutual_reachability() {
        // 1 <-> 2, 2 <-> 3, 4 <-> 5, 6 -> 2.
        let mut graph = DiGraph::new();
        for i in 1..=6 {
            graph.add_node(sys(i));
        }
        graph.add_edge(sys(1), sys(2));
        graph.add_edge(sys(2), sys(1));
        graph.add_edge(sys(2), sys(3));
        graph.add_edge(sys(3), sys(2));
        graph.add_edge(sys(4), sys(5));
        graph.add_edge(sys(5), sys(4));
        graph.add_edge(sys(6), sys(2));

        let mut sccs: Vec<Vec<usize>> = graph
            .iter_sccs()
            .map(|scc| {
                let mut ids: Vec<usize> = scc.into_iter().map(NodeId::index).collect();
                ids.sort_unstable();
                ids
            })
            .collect();

        // Reverse topological: {1,2,3} must precede {6}, which points into it.
        let pos_123 = sccs.iter().position(|s| s == &vec![1, 2, 3]);
        let pos_6 = sccs.iter().position(|s| s == &vec![6]);
        assert!(pos_123.is_some() && pos_6.is_some());
        assert!(pos_123 < pos_6);

        sccs.sort();
        assert_eq!(sccs, vec![vec![1, 2, 3], vec![4, 5], vec![6]]);
    }

    #[test]
    fn sccs_singletons_in_reverse_topological_order() {
        let mut graph = DiGraph::new();
        graph.add_edge(sys(0), sys(1));
        graph.add_edge(sys(1), sys(2));
        let order: Vec<Vec<NodeId>> = graph.iter_sccs().collect();
        assert_eq!(
            order,
            vec![vec![sys(2)], vec![sys(1)], vec![sys(0)]]
        );
    }
}
