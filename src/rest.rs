//! Correlation Requests and Response Graphs
//!
//! Wire-neutral request/response types for a correlation service, plus the
//! conversion from an engine [`Graph`] to its serializable form. An HTTP
//! layer maps these to routes; the engine itself never sees a socket.
//!
//! Response graphs are pruned: nodes with no results are dropped, as are
//! edges that lead to an empty node. Query counts are sorted by count
//! descending, then by query string, so the most productive queries lead.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::graph::{Graph, QueryCounts};
use crate::model::{Class, ClassRef, Constraint, Domain, Object};
use serde::{Deserialize, Serialize};

/// Starting point for a correlation. The start set is the union of the
/// results of each query and the objects given inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Start {
    /// Class of the starting objects, e.g. `k8s:Pod`.
    pub class: String,

    /// Queries for starting objects; each must return the start class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,

    /// Starting objects given inline, serialized in their class' form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<Object>,

    /// Constraint applied to every query of the correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

/// Search for paths from a start class to a set of goal classes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalsRequest {
    pub start: Start,
    /// Goal class names, e.g. `log:application`.
    #[serde(default)]
    pub goals: Vec<String>,
}

/// Spread outward from a start class up to a depth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighboursRequest {
    pub start: Start,
    pub depth: usize,
}

/// Response shaping options.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    /// Include per-rule query details on edges.
    pub with_rules: bool,
}

/// A query with the count of objects it produced; -1 if it was not
/// evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCountInfo {
    pub query: String,
    pub count: i64,
}

/// One rule followed along an edge, with the queries it generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<QueryCountInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A node of the response graph: results found for one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Full class name in `domain:class` form.
    pub class: String,
    /// Queries that produced results for this class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<QueryCountInfo>,
    /// Count of results after deduplication.
    pub count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A directed edge of the response graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub start: String,
    pub goal: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleInfo>,
}

/// Graph resulting from a correlation search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphInfo {
    pub nodes: Vec<NodeInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeInfo>,
}

/// Domain listing entry: its stores and any store construction error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stores: Vec<crate::model::StoreConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn query_counts(counts: &QueryCounts) -> Vec<QueryCountInfo> {
    let mut out: Vec<QueryCountInfo> = counts
        .iter()
        .map(|qc| QueryCountInfo {
            query: qc.query.to_string(),
            count: qc.count.map_or(-1, |c| c as i64),
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
    out
}

impl GraphInfo {
    /// Convert a correlation result graph, pruning empty nodes and the
    /// edges that lead to them.
    pub fn from_graph(graph: &Graph, options: GraphOptions) -> GraphInfo {
        let mut nodes = Vec::new();
        for id in graph.node_ids() {
            let Some(state) = graph.node(id) else { continue };
            if state.is_empty() {
                continue;
            }
            nodes.push(NodeInfo {
                class: graph.class(id).full_name(),
                queries: query_counts(&state.queries),
                count: state.result.len(),
                errors: state.errors.clone(),
            });
        }
        let mut edges = Vec::new();
        for edge in graph.edges() {
            let goal_empty = graph.node(edge.target).map_or(true, |n| n.is_empty());
            if goal_empty {
                continue;
            }
            let mut info = EdgeInfo {
                start: graph.class(edge.source).full_name(),
                goal: graph.class(edge.target).full_name(),
                rules: Vec::new(),
            };
            if options.with_rules {
                for line in edge.lines {
                    let Some(state) = graph.line(line) else { continue };
                    if state.queries.total() == 0 && state.errors.is_empty() {
                        continue;
                    }
                    info.rules.push(RuleInfo {
                        name: graph.data().line(line).rule.name().to_string(),
                        queries: query_counts(&state.queries),
                        errors: state.errors.clone(),
                    });
                }
            }
            edges.push(info);
        }
        GraphInfo { nodes, edges }
    }
}

impl DomainInfo {
    /// Listing of every domain an engine knows, with store status.
    pub fn from_engine(engine: &Engine) -> Vec<DomainInfo> {
        engine
            .domains()
            .iter()
            .map(|d| DomainInfo {
                name: d.name().to_string(),
                stores: engine.store_configs(d.name()).to_vec(),
                errors: engine
                    .store_error(d.name())
                    .map(|e| vec![e.to_string()])
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// Resolve a request's start set: the class, the objects from inline data
/// plus the start queries, and the constraint.
async fn start_objects(
    engine: &Engine,
    start: &Start,
) -> Result<(ClassRef, Vec<Object>, Option<Constraint>)> {
    let class = engine.class(&start.class)?;
    let mut objects = start.objects.clone();
    for query_string in &start.queries {
        let query = engine.query(query_string)?;
        if query.class().full_name() != class.full_name() {
            return Err(Error::InvalidQuery(format!(
                "start query {query} is not for class {}",
                class.full_name()
            )));
        }
        engine
            .get(&query, start.constraint.as_ref(), &mut objects)
            .await?;
    }
    Ok((class, objects, start.constraint.clone()))
}

/// Serve a goals request: seed the start set, search towards the goals,
/// return the pruned response graph.
pub async fn goals(
    engine: &Engine,
    request: &GoalsRequest,
    options: GraphOptions,
) -> Result<GraphInfo> {
    let (class, objects, constraint) = start_objects(engine, &request.start).await?;
    let goals: Vec<ClassRef> = request
        .goals
        .iter()
        .map(|g| engine.class(g))
        .collect::<Result<_>>()?;
    let graph = engine
        .goals(&class, objects, &goals, constraint.as_ref())
        .await?;
    Ok(GraphInfo::from_graph(&graph, options))
}

/// Serve a neighbours request.
pub async fn neighbours(
    engine: &Engine,
    request: &NeighboursRequest,
    options: GraphOptions,
) -> Result<GraphInfo> {
    let (class, objects, constraint) = start_objects(engine, &request.start).await?;
    let graph = engine
        .neighbours(&class, objects, request.depth, constraint.as_ref())
        .await?;
    Ok(GraphInfo::from_graph(&graph, options))
}
