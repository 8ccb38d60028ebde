//! Dependency-Order Traversal
//!
//! A correlation must not follow a rule before the rules feeding its start
//! class have run — except inside a cycle, where some rule has to go first.
//! The order is computed by condensing the view into its strongly connected
//! components (a DAG), sorting the condensation topologically, and visiting
//! each component's lines together. Every line is visited at most once.
//!
//! Neighbourhood searches use a breadth-first order instead, so callers can
//! spread outward level by level.

use super::{LineId, NodeId};
use super::views::Graph;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

impl Graph {
    /// Lines of the view in dependency-sound order: grouped by strongly
    /// connected component of their source node, components in topological
    /// order, ties within a component by line insertion id.
    ///
    /// When a visitor sees line `F -> T`, every line into `F` from outside
    /// `F`'s component has already been seen.
    pub fn traversal(&self) -> Vec<LineId> {
        let mut condensed = DiGraphMap::<NodeId, ()>::new();
        for node in self.node_ids() {
            condensed.add_node(node);
        }
        for line in self.line_ids() {
            let ld = self.data().line(line);
            condensed.add_edge(ld.source, ld.target, ());
        }
        // Tarjan emits components in reverse topological order.
        let components = tarjan_scc(&condensed);
        let mut rank = vec![usize::MAX; self.data().node_count()];
        for (i, component) in components.iter().rev().enumerate() {
            for &node in component {
                rank[node] = i;
            }
        }
        let mut lines = self.line_ids();
        lines.sort_by_key(|&line| (rank[self.data().line(line).source], line));
        lines
    }

    /// Visit every line in dependency order. See [`Graph::traversal`].
    pub fn traverse<F: FnMut(LineId)>(&self, mut visit: F) {
        for line in self.traversal() {
            visit(line);
        }
    }

    /// Lines of the view in breadth-first order from `start`: grouped by BFS
    /// level of their source node, ties by line insertion id. Lines whose
    /// source is unreachable from `start` are omitted.
    pub fn bfs_traversal(&self, start: NodeId) -> Vec<LineId> {
        let level = self.bfs_levels(start, usize::MAX);
        let mut lines: Vec<LineId> = self
            .line_ids()
            .into_iter()
            .filter(|&line| level[self.data().line(line).source].is_some())
            .collect();
        lines.sort_by_key(|&line| (level[self.data().line(line).source], line));
        lines
    }

    /// Visit lines outward from `start` in breadth-first order.
    pub fn traverse_neighbours<F: FnMut(LineId)>(&self, start: NodeId, mut visit: F) {
        for line in self.bfs_traversal(start) {
            visit(line);
        }
    }
}
