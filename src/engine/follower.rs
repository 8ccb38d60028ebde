//! Correlation Follower
//!
//! Per-request traversal state. For each line `F -> T` the follower applies
//! the line's rule to every object accumulated at `F`, deduplicates the
//! resulting queries, executes the ones the goal node has not counted yet
//! (in parallel, bounded by the engine's fan-out), records `query -> count`
//! on both the line and the goal node, and merges the surviving objects into
//! the goal node's result.
//!
//! Rule and store failures are recorded against the line and the traversal
//! moves on; only cancellation aborts.

use super::{Engine, Interrupt};
use crate::error::{Error, Result};
use crate::graph::{Graph, LineId};
use crate::model::{Class, ClassRef, Constraint, Object, Query};
use crate::unique::UniqueList;
use futures_util::stream::{self, StreamExt};

/// Stateful traversal callback for one correlation request.
pub struct Follower<'e> {
    engine: &'e Engine,
    constraint: Option<Constraint>,
    interrupt: Interrupt,
}

impl<'e> Follower<'e> {
    pub(super) fn new(
        engine: &'e Engine,
        constraint: Option<Constraint>,
        interrupt: Interrupt,
    ) -> Self {
        Follower {
            engine,
            constraint,
            interrupt,
        }
    }

    /// Follow one line. Returns an error only on cancellation.
    pub async fn visit(&self, graph: &mut Graph, line: LineId) -> Result<()> {
        self.interrupt.check()?;

        let (source, target, rule) = {
            let ld = graph.data().line(line);
            (ld.source, ld.target, ld.rule.clone())
        };
        let goal_class = graph.data().class(target).clone();
        let goal_name = goal_class.full_name();

        let objects: Vec<Object> = graph
            .node(source)
            .map(|n| n.result.list().to_vec())
            .unwrap_or_default();
        if objects.is_empty() {
            return Ok(());
        }

        // Apply the rule to every start object, deduplicating queries by
        // their rendered string. Queries for a sibling goal class belong to
        // a parallel line of the same rule and are not ours to run.
        let mut batch: UniqueList<Query> = UniqueList::new();
        let mut apply_errors: Vec<String> = Vec::new();
        for object in &objects {
            match rule.apply(object) {
                Ok(query) => {
                    if query.class().full_name() == goal_name {
                        batch.insert(query.to_string(), query);
                    }
                }
                Err(Error::NoQuery) => {}
                Err(e) => {
                    tracing::debug!(rule = rule.name(), error = %e, "rule application failed");
                    apply_errors.push(e.to_string());
                }
            }
        }
        if !apply_errors.is_empty() {
            if let Some(state) = graph.line_mut(line) {
                state.errors.append(&mut apply_errors);
            }
        }

        // Queries the goal node has already counted are not re-run; the line
        // records the known count and the node's tally accumulates it.
        let mut known: Vec<(Query, usize)> = Vec::new();
        let mut fresh: Vec<Query> = Vec::new();
        for query in batch.into_items() {
            match graph.node(target).and_then(|n| n.queries.count(&query)) {
                Some(count) => known.push((query, count)),
                None => fresh.push(query),
            }
        }

        let mut fetched: Vec<(Query, Result<Vec<Object>>)> = stream::iter(fresh)
            .map(|query| async move {
                let result = self.fetch(&query).await;
                (query, result)
            })
            .buffer_unordered(self.engine.fan_out())
            .collect()
            .await;
        // Completion order is arbitrary; keep the records deterministic.
        fetched.sort_by(|a, b| a.0.to_string().cmp(&b.0.to_string()));

        for (query, result) in fetched {
            match result {
                Ok(objects) => {
                    let accepted = self.accept(&goal_class, objects);
                    let count = accepted.len();
                    tracing::debug!(
                        rule = rule.name(),
                        query = %query,
                        count,
                        "query evaluated"
                    );
                    if let Some(state) = graph.line_mut(line) {
                        state.queries.record(query.clone(), Some(count));
                    }
                    if let Some(node) = graph.node_mut(target) {
                        node.queries.add(query, count);
                        node.result.extend(accepted);
                    }
                }
                Err(e) => {
                    tracing::warn!(rule = rule.name(), query = %query, error = %e, "query failed");
                    if let Some(state) = graph.line_mut(line) {
                        state.queries.record(query.clone(), None);
                        state.errors.push(format!("{query}: {e}"));
                    }
                    if let Some(node) = graph.node_mut(target) {
                        node.queries.record(query, None);
                    }
                }
            }
        }

        for (query, count) in known {
            if let Some(state) = graph.line_mut(line) {
                state.queries.record(query.clone(), Some(count));
            }
            if let Some(node) = graph.node_mut(target) {
                node.queries.add(query, count);
            }
        }

        Ok(())
    }

    /// Run one query against its domain's store, bounded by the per-query
    /// timeout when the constraint carries one.
    async fn fetch(&self, query: &Query) -> Result<Vec<Object>> {
        let store = self.engine.store(&query.domain_name())?;
        let mut out: Vec<Object> = Vec::new();
        let get = store.get(query, self.constraint.as_ref(), &mut out);
        match self.constraint.as_ref().and_then(|c| c.timeout) {
            Some(timeout) => tokio::time::timeout(timeout, get)
                .await
                .map_err(|_| Error::Store(format!("query timed out after {timeout:?}")))??,
            None => get.await?,
        }
        Ok(out)
    }

    /// Constraint filtering on the engine side: drop time-tagged objects
    /// outside the window (objects without timestamps always pass), then
    /// enforce the per-query limit.
    fn accept(&self, class: &ClassRef, objects: Vec<Object>) -> Vec<Object> {
        let Some(constraint) = &self.constraint else {
            return objects;
        };
        let mut accepted: Vec<Object> = objects
            .into_iter()
            .filter(|o| class.timestamp(o).map_or(true, |t| constraint.allows(t)))
            .collect();
        if let Some(limit) = constraint.limit {
            accepted.truncate(limit);
        }
        accepted
    }
}
