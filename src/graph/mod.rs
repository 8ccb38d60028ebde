//! Rule Graph
//!
//! [`Data`] is the canonical catalogue built once from the configured rule
//! set: a directed multigraph whose nodes are classes and whose lines are
//! rules. Node and line ids are dense integers assigned at insertion and
//! never change; rules can be added but never removed.
//!
//! Per correlation request the engine derives a [`Graph`] view: a subset of
//! the catalogue's nodes and lines carrying per-request state (accumulated
//! results, query counts, recorded errors). Views are built by
//! [`Graph::all_paths`], [`Graph::shortest_paths`], [`Graph::neighbourhood`]
//! and [`Graph::full`], and walked in dependency order by
//! [`Graph::traversal`].

mod traverse;
mod views;

pub use views::{EdgeRef, Graph};

use crate::model::{Class, ClassRef, Query};
use crate::rules::Rule;
use crate::unique::ObjectSet;
use std::collections::{BTreeMap, HashMap};

/// Dense node identifier: index into [`Data`]'s node arena.
pub type NodeId = usize;

/// Dense line identifier: index into [`Data`]'s line arena.
pub type LineId = usize;

/// One line of the multigraph: a rule applied from one start class to one
/// goal class. A rule with several start or goal classes owns several lines.
#[derive(Debug, Clone)]
pub struct LineData {
    pub rule: Rule,
    pub source: NodeId,
    pub target: NodeId,
}

/// Canonical class/rule catalogue. All graphs derived from the same `Data`
/// share stable node and line ids.
#[derive(Debug, Default)]
pub struct Data {
    nodes: Vec<ClassRef>,
    lines: Vec<LineData>,
    node_ids: HashMap<String, NodeId>,
    out: Vec<Vec<LineId>>,
    inc: Vec<Vec<LineId>>,
}

impl Data {
    pub fn new() -> Self {
        Data::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut d = Data::new();
        for r in rules {
            d.add_rule(r);
        }
        d
    }

    /// Add a rule, fanning out one line per (start, goal) class pair.
    /// Endpoint nodes are created on demand.
    pub fn add_rule(&mut self, rule: Rule) {
        let starts: Vec<ClassRef> = rule.start().to_vec();
        let goals: Vec<ClassRef> = rule.goal().to_vec();
        for start in &starts {
            for goal in &goals {
                let source = self.node_for(start);
                let target = self.node_for(goal);
                let id = self.lines.len();
                self.lines.push(LineData {
                    rule: rule.clone(),
                    source,
                    target,
                });
                self.out[source].push(id);
                self.inc[target].push(id);
            }
        }
    }

    /// Node for a class, created if necessary. Idempotent: classes rendering
    /// the same `domain:class` string share one node.
    pub fn node_for(&mut self, class: &ClassRef) -> NodeId {
        let name = class.full_name();
        if let Some(&id) = self.node_ids.get(&name) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(class.clone());
        self.out.push(Vec::new());
        self.inc.push(Vec::new());
        self.node_ids.insert(name, id);
        id
    }

    /// Node id for a class, if it is in the catalogue.
    pub fn node_id(&self, class: &ClassRef) -> Option<NodeId> {
        self.node_id_by_name(&class.full_name())
    }

    /// Node id for a rendered `domain:class` name.
    pub fn node_id_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_ids.get(name).copied()
    }

    pub fn class(&self, node: NodeId) -> &ClassRef {
        &self.nodes[node]
    }

    pub fn line(&self, line: LineId) -> &LineData {
        &self.lines[line]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lines leaving a node, in insertion order.
    pub fn lines_from(&self, node: NodeId) -> &[LineId] {
        &self.out[node]
    }

    /// Lines entering a node, in insertion order.
    pub fn lines_into(&self, node: NodeId) -> &[LineId] {
        &self.inc[node]
    }

    pub fn classes(&self) -> &[ClassRef] {
        &self.nodes
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.lines.iter().map(|l| &l.rule)
    }
}

/// Count of objects produced by one query. `count` is `None` until the query
/// has been evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCount {
    pub query: Query,
    pub count: Option<usize>,
}

/// Map of [`QueryCount`] keyed by the query's rendered string.
///
/// On a line, a query's count is what that line's rule produced. On a node,
/// counts accumulate across all lines that led here, so the node total equals
/// the sum of its incoming line counts (dedup of the result set happens
/// separately).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCounts(BTreeMap<String, QueryCount>);

impl QueryCounts {
    pub fn new() -> Self {
        QueryCounts::default()
    }

    pub fn has(&self, query: &Query) -> bool {
        self.0.contains_key(&query.to_string())
    }

    /// Recorded count for a query, if it has been evaluated.
    pub fn count(&self, query: &Query) -> Option<usize> {
        self.0.get(&query.to_string()).and_then(|qc| qc.count)
    }

    /// Record a query with its evaluated count, or `None` for a query that
    /// was attempted but not evaluated. Replaces any previous record.
    pub fn record(&mut self, query: Query, count: Option<usize>) {
        self.0.insert(query.to_string(), QueryCount { query, count });
    }

    /// Accumulate a count onto a query, starting from zero if new.
    pub fn add(&mut self, query: Query, count: usize) {
        let entry = self
            .0
            .entry(query.to_string())
            .or_insert(QueryCount { query, count: None });
        entry.count = Some(entry.count.unwrap_or(0) + count);
    }

    /// Total of all evaluated counts.
    pub fn total(&self) -> usize {
        self.0.values().filter_map(|qc| qc.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryCount> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-request state of one node: the accumulated result set, the queries
/// that led here with their counts, and any errors recorded against it.
#[derive(Debug)]
pub struct NodeState {
    pub result: ObjectSet,
    pub queries: QueryCounts,
    pub errors: Vec<String>,
}

impl NodeState {
    pub(crate) fn for_class(class: &ClassRef) -> Self {
        NodeState {
            result: ObjectSet::new(class.clone()),
            queries: QueryCounts::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

/// Per-request state of one line: the queries its rule produced with their
/// counts, and any errors recorded against it.
#[derive(Debug, Default)]
pub struct LineState {
    pub queries: QueryCounts,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{rule, rule_multi, MockDomain};
    use crate::model::Domain;

    fn classes(d: &MockDomain, names: &[&str]) -> Vec<ClassRef> {
        names.iter().map(|n| d.class(n).unwrap()).collect()
    }

    #[test]
    fn test_add_rule_fans_out_start_times_goal() {
        let d = MockDomain::new("mock");
        let r = rule_multi(
            "r",
            classes(&d, &["a", "b"]),
            classes(&d, &["x", "y", "z"]),
        );
        let data = Data::with_rules([r]);
        assert_eq!(6, data.line_count());
        assert_eq!(5, data.node_count());
    }

    #[test]
    fn test_node_for_is_idempotent() {
        let d = MockDomain::new("mock");
        let mut data = Data::new();
        let a1 = data.node_for(&d.class("a").unwrap());
        let b = data.node_for(&d.class("b").unwrap());
        let a2 = data.node_for(&d.class("a").unwrap());
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(2, data.node_count());
    }

    #[test]
    fn test_line_ids_are_dense_and_stable() {
        let d = MockDomain::new("mock");
        let (a, b, c) = (
            d.class("a").unwrap(),
            d.class("b").unwrap(),
            d.class("c").unwrap(),
        );
        let mut data = Data::new();
        data.add_rule(rule("ab", a.clone(), b.clone()));
        data.add_rule(rule("bc", b.clone(), c.clone()));
        data.add_rule(rule("ab2", a, b));
        assert_eq!(3, data.line_count());
        assert_eq!("ab", data.line(0).rule.name());
        assert_eq!("bc", data.line(1).rule.name());
        // Parallel line shares endpoints with line 0.
        assert_eq!(data.line(0).source, data.line(2).source);
        assert_eq!(data.line(0).target, data.line(2).target);
    }

    #[test]
    fn test_query_counts_accumulate_on_add() {
        let d = MockDomain::new("mock");
        let q = crate::mock::query(&d.class("c").unwrap(), &[serde_json::json!(1)]);
        let mut counts = QueryCounts::new();
        assert!(!counts.has(&q));
        counts.add(q.clone(), 2);
        counts.add(q.clone(), 3);
        assert_eq!(Some(5), counts.count(&q));
        assert_eq!(5, counts.total());
        assert_eq!(1, counts.len());
    }

    #[test]
    fn test_query_counts_record_replaces() {
        let d = MockDomain::new("mock");
        let q = crate::mock::query(&d.class("c").unwrap(), &[]);
        let mut counts = QueryCounts::new();
        counts.record(q.clone(), None);
        assert!(counts.has(&q));
        assert_eq!(None, counts.count(&q));
        assert_eq!(0, counts.total());
        counts.record(q.clone(), Some(7));
        assert_eq!(Some(7), counts.count(&q));
    }
}
