//! Graph Views
//!
//! A [`Graph`] is an immutable shape over the shared [`Data`] catalogue plus
//! the mutable per-request state (results, query counts, errors) of the
//! nodes and lines it contains. The subgraph constructors here never touch
//! the catalogue; they select which lines a correlation will follow.

use super::{Data, LineId, LineState, NodeId, NodeState};
use crate::model::ClassRef;
use std::collections::HashSet;
use std::sync::Arc;

/// A view over [`Data`]: a subset of nodes and lines with per-request state.
pub struct Graph {
    data: Arc<Data>,
    nodes: Vec<Option<NodeState>>,
    lines: Vec<Option<LineState>>,
}

/// An edge of the view: all parallel lines sharing one (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRef {
    pub source: NodeId,
    pub target: NodeId,
    pub lines: Vec<LineId>,
}

impl Graph {
    /// An empty view: no nodes, no lines.
    pub fn empty(data: Arc<Data>) -> Self {
        let nodes = (0..data.node_count()).map(|_| None).collect();
        let lines = (0..data.line_count()).map(|_| None).collect();
        Graph { data, nodes, lines }
    }

    /// The view containing every node and line of the catalogue.
    pub fn full(data: Arc<Data>) -> Self {
        let mut g = Graph::empty(data);
        for line in 0..g.data.line_count() {
            g.add_line(line);
        }
        for node in 0..g.data.node_count() {
            g.add_node(node);
        }
        g
    }

    pub fn data(&self) -> &Arc<Data> {
        &self.data
    }

    /// Bring a node into the view (idempotent).
    pub fn add_node(&mut self, node: NodeId) {
        if self.nodes[node].is_none() {
            self.nodes[node] = Some(NodeState::for_class(self.data.class(node)));
        }
    }

    /// Bring a line and its endpoints into the view (idempotent).
    pub fn add_line(&mut self, line: LineId) {
        if self.lines[line].is_none() {
            self.lines[line] = Some(LineState::default());
        }
        let ld = self.data.line(line);
        let (source, target) = (ld.source, ld.target);
        self.add_node(source);
        self.add_node(target);
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.get(node).is_some_and(Option::is_some)
    }

    pub fn contains_line(&self, line: LineId) -> bool {
        self.lines.get(line).is_some_and(Option::is_some)
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeState> {
        self.nodes.get(node)?.as_ref()
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeState> {
        self.nodes.get_mut(node)?.as_mut()
    }

    pub fn line(&self, line: LineId) -> Option<&LineState> {
        self.lines.get(line)?.as_ref()
    }

    pub fn line_mut(&mut self, line: LineId) -> Option<&mut LineState> {
        self.lines.get_mut(line)?.as_mut()
    }

    pub fn class(&self, node: NodeId) -> &ClassRef {
        self.data.class(node)
    }

    /// Nodes in the view, ascending id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&n| self.nodes[n].is_some())
            .collect()
    }

    /// Lines in the view, ascending (insertion) id order.
    pub fn line_ids(&self) -> Vec<LineId> {
        (0..self.lines.len())
            .filter(|&l| self.lines[l].is_some())
            .collect()
    }

    /// Node id for a rendered `domain:class` name, if the node is in view.
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        let id = self.data.node_id_by_name(name)?;
        self.contains_node(id).then_some(id)
    }

    /// Node state for a rendered `domain:class` name.
    pub fn state_by_name(&self, name: &str) -> Option<&NodeState> {
        self.node(self.node_by_name(name)?)
    }

    /// Lines leaving `node` that are in this view, insertion order.
    pub fn lines_from(&self, node: NodeId) -> Vec<LineId> {
        self.data
            .lines_from(node)
            .iter()
            .copied()
            .filter(|&l| self.contains_line(l))
            .collect()
    }

    /// Edges of the view: parallel lines grouped by endpoint pair, ordered by
    /// first line insertion.
    pub fn edges(&self) -> Vec<EdgeRef> {
        let mut edges: Vec<EdgeRef> = Vec::new();
        let mut index: std::collections::HashMap<(NodeId, NodeId), usize> =
            std::collections::HashMap::new();
        for line in self.line_ids() {
            let ld = self.data.line(line);
            let key = (ld.source, ld.target);
            if let Some(&i) = index.get(&key) {
                edges[i].lines.push(line);
            } else {
                index.insert(key, edges.len());
                edges.push(EdgeRef {
                    source: ld.source,
                    target: ld.target,
                    lines: vec![line],
                });
            }
        }
        edges
    }

    /// Subgraph induced by all simple paths from `start` to any goal.
    /// Self-loops on path nodes are kept; other cycles are excluded.
    pub fn all_paths(&self, start: NodeId, goals: &[NodeId]) -> Graph {
        let goal_set: HashSet<NodeId> = goals.iter().copied().collect();
        let mut out = Graph::empty(self.data.clone());
        let mut on_path = vec![false; self.data.node_count()];
        let mut path = vec![start];
        on_path[start] = true;
        self.collect_paths(start, &goal_set, &mut on_path, &mut path, &mut out);
        // Self-loops ride along on any node that made it into the view.
        for node in out.node_ids() {
            for &line in self.data.lines_from(node) {
                if self.contains_line(line) && self.data.line(line).target == node {
                    out.add_line(line);
                }
            }
        }
        out
    }

    fn collect_paths(
        &self,
        node: NodeId,
        goals: &HashSet<NodeId>,
        on_path: &mut Vec<bool>,
        path: &mut Vec<NodeId>,
        out: &mut Graph,
    ) {
        if goals.contains(&node) {
            out.add_node(path[0]);
            for pair in path.windows(2) {
                for &line in self.data.lines_from(pair[0]) {
                    if self.contains_line(line) && self.data.line(line).target == pair[1] {
                        out.add_line(line);
                    }
                }
            }
        }
        for &line in self.data.lines_from(node) {
            if !self.contains_line(line) {
                continue;
            }
            let next = self.data.line(line).target;
            if next == node || on_path[next] {
                continue; // self-loops handled at the end; no revisits
            }
            on_path[next] = true;
            path.push(next);
            self.collect_paths(next, goals, on_path, path, out);
            path.pop();
            on_path[next] = false;
        }
    }

    /// Subgraph of only the minimum-hop paths from `start` to the goals.
    pub fn shortest_paths(&self, start: NodeId, goals: &[NodeId]) -> Graph {
        let dist = self.bfs_levels(start, usize::MAX);
        let mut out = Graph::empty(self.data.clone());
        out.add_node(start);
        let mut pending: Vec<NodeId> = goals
            .iter()
            .copied()
            .filter(|&g| dist[g].is_some())
            .collect();
        let mut visited: HashSet<NodeId> = HashSet::new();
        while let Some(target) = pending.pop() {
            if !visited.insert(target) || target == start {
                continue;
            }
            let dt = match dist[target] {
                Some(d) => d,
                None => continue,
            };
            for &line in self.data.lines_into(target) {
                if !self.contains_line(line) {
                    continue;
                }
                let source = self.data.line(line).source;
                if source != target && dist[source] == Some(dt - 1) {
                    out.add_line(line);
                    pending.push(source);
                }
            }
        }
        out
    }

    /// Subgraph reached by breadth-first search from `start`, including every
    /// line whose source lies within `depth - 1` hops.
    pub fn neighbourhood(&self, start: NodeId, depth: usize) -> Graph {
        let mut out = Graph::empty(self.data.clone());
        out.add_node(start);
        let level = self.bfs_levels(start, depth);
        for (node, lvl) in level.iter().enumerate() {
            match lvl {
                Some(l) if *l < depth => {}
                _ => continue,
            }
            for &line in self.data.lines_from(node) {
                if self.contains_line(line) {
                    out.add_line(line);
                }
            }
        }
        out
    }

    /// BFS hop counts from `start` over lines in this view, capped at
    /// `max_depth`. `None` for unreached nodes.
    pub(crate) fn bfs_levels(&self, start: NodeId, max_depth: usize) -> Vec<Option<usize>> {
        let mut level: Vec<Option<usize>> = vec![None; self.data.node_count()];
        if !self.contains_node(start) {
            return level;
        }
        level[start] = Some(0);
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let l = match level[node] {
                Some(l) if l < max_depth => l,
                _ => continue,
            };
            for &line in self.data.lines_from(node) {
                if !self.contains_line(line) {
                    continue;
                }
                let next = self.data.line(line).target;
                if level[next].is_none() {
                    level[next] = Some(l + 1);
                    queue.push_back(next);
                }
            }
        }
        level
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_ids().len())
            .field("lines", &self.line_ids().len())
            .finish()
    }
}
