//! Engine lookups, store dispatch, and correlation traversal.

use chrono::{TimeZone, Utc};
use correlate::engine::Interrupt;
use correlate::mock::{self, MockDomain};
use correlate::model::{
    Appender, Class, ClassRef, Constraint, Domain, DomainRef, Object, Query, Store, StoreConfig,
    StoreRef,
};
use correlate::{Engine, Error, Graph};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn mock_engine() -> Engine {
    let d = MockDomain::new("mock");
    Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .build()
}

fn classes(names: &[&str]) -> Vec<ClassRef> {
    let d = MockDomain::new("mock");
    names.iter().map(|n| d.class(n).expect("open domain")).collect()
}

fn result_set(graph: &Graph, class: &str) -> BTreeSet<String> {
    graph
        .state_by_name(class)
        .map(|n| n.result.list().iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

fn objs(values: &[i64]) -> Vec<Object> {
    values.iter().map(|v| json!(v)).collect()
}

#[test]
fn test_engine_class_lookup() {
    let engine = mock_engine();
    for (name, want, err) in [
        ("mock:foo", Some("mock:foo"), ""),
        ("foo.mock", Some("mock:foo"), ""),
        ("x:", None, "invalid class name"),
        (":x", None, "invalid class name"),
        ("x", None, "invalid class name"),
        ("", None, "invalid class name"),
        ("bad:foo", None, "domain not found: bad"),
    ] {
        match engine.class(name) {
            Ok(class) => {
                assert_eq!(want, Some(class.full_name().as_str()), "{name}");
            }
            Err(e) => {
                assert!(want.is_none(), "{name}: unexpected error {e}");
                assert!(e.to_string().contains(err), "{name}: {e}");
            }
        }
    }
}

#[test]
fn test_engine_domains_in_registration_order() {
    let engine = Engine::builder()
        .domain(Arc::new(MockDomain::new("a")))
        .domain(Arc::new(MockDomain::new("b")))
        .domain(Arc::new(MockDomain::new("c")))
        .build();
    let names: Vec<&str> = engine.domains().iter().map(|d| d.name()).collect();
    assert_eq!(vec!["a", "b", "c"], names);
}

#[test]
fn test_engine_query_round_trip() {
    let engine = mock_engine();
    let q = engine.query("mock:c:[1,2]").expect("valid query");
    assert_eq!("mock:c:[1,2]", q.to_string());
    assert_eq!(q, engine.query(&q.to_string()).expect("round trip"));
    assert!(matches!(
        engine.query("bad:c:[]"),
        Err(Error::DomainNotFound(_))
    ));
    assert!(matches!(engine.query("mock"), Err(Error::InvalidQuery(_))));
}

#[tokio::test]
async fn test_engine_get_dispatches_to_store() {
    let engine = mock_engine();
    let q = engine.query("mock:c:[1,2,3]").expect("valid query");
    let mut out: Vec<Object> = Vec::new();
    engine.get(&q, None, &mut out).await.expect("store get");
    assert_eq!(objs(&[1, 2, 3]), out);
}

#[tokio::test]
async fn test_engine_get_without_store_is_unavailable() {
    let engine = Engine::builder()
        .domain(Arc::new(MockDomain::new("mock")))
        .build();
    let q = engine.query("mock:c:[]").expect("valid query");
    let mut out: Vec<Object> = Vec::new();
    let err = engine.get(&q, None, &mut out).await.unwrap_err();
    assert!(matches!(err, Error::StoreUnavailable { .. }), "{err}");
}

#[tokio::test]
async fn test_failed_store_reports_lazily() {
    // Construction fails at build time but only surfaces on first use.
    let engine = Engine::builder()
        .domain(Arc::new(MockDomain::new("mock")))
        .store(StoreConfig::new().with("domain", "mock").with("fail", "boom"))
        .expect("config is well-formed")
        .build();
    assert_eq!(Some("store error: boom"), engine.store_error("mock"));
    let q = engine.query("mock:c:[]").expect("valid query");
    let mut out: Vec<Object> = Vec::new();
    let err = engine.get(&q, None, &mut out).await.unwrap_err();
    assert!(err.to_string().contains("boom"), "{err}");
}

#[test]
fn test_store_for_unknown_domain_is_fatal() {
    let err = Engine::builder()
        .domain(Arc::new(MockDomain::new("mock")))
        .store(StoreConfig::new().with("domain", "nope"))
        .unwrap_err();
    assert!(matches!(err, Error::DomainNotFound(_)), "{err}");
}

/// Linear chain with fan-out: a -> b emits [1,2]; two b -> c rules pass
/// objects through, one shifted by 10; c -> z passes through.
fn chain_engine() -> Engine {
    let d = MockDomain::new("mock");
    let c = classes(&["a", "b", "c", "z"]);
    let (a, b, cc, z) = (c[0].clone(), c[1].clone(), c[2].clone(), c[3].clone());
    Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .rule({
            let b = b.clone();
            mock::apply_rule("ab", a, b.clone(), move |_| {
                Ok(mock::query(&b, &[json!(1), json!(2)]))
            })
        })
        .rule({
            let cc2 = cc.clone();
            mock::apply_rule("bc1", b.clone(), cc.clone(), move |o| {
                Ok(mock::query(&cc2, &[o.clone()]))
            })
        })
        .rule({
            let cc2 = cc.clone();
            mock::apply_rule("bc2", b, cc.clone(), move |o| {
                let n = o.as_i64().ok_or(Error::NoQuery)?;
                Ok(mock::query(&cc2, &[json!(n + 10)]))
            })
        })
        .rule({
            let z2 = z.clone();
            mock::apply_rule("cz", cc, z, move |o| Ok(mock::query(&z2, &[o.clone()])))
        })
        .build()
}

#[tokio::test]
async fn test_follower_traverses_chain_and_fan_out() {
    let engine = chain_engine();
    let mut graph = engine.graph();
    let a = engine.class("mock:a").expect("class");
    engine
        .goal_search(&mut graph, &a, objs(&[0]), None, &Interrupt::none())
        .await
        .expect("traversal");

    assert_eq!(result_set(&graph, "mock:a"), to_set(&objs(&[0])));
    assert_eq!(result_set(&graph, "mock:b"), to_set(&objs(&[1, 2])));
    assert_eq!(result_set(&graph, "mock:c"), to_set(&objs(&[1, 2, 11, 12])));
    assert_eq!(result_set(&graph, "mock:z"), to_set(&objs(&[1, 2, 11, 12])));

    // Per-line query counts: ab ran one query yielding 2 objects; bc1/bc2
    // one query per start object; cz one per accumulated object.
    for line in graph.line_ids() {
        let state = graph.line(line).expect("line in view");
        let rule = graph.data().line(line).rule.name().to_string();
        match rule.as_str() {
            "ab" => {
                assert_eq!(1, state.queries.len());
                assert_eq!(2, state.queries.total());
            }
            "bc1" | "bc2" => {
                assert_eq!(2, state.queries.len());
                assert_eq!(2, state.queries.total());
            }
            "cz" => {
                assert_eq!(4, state.queries.len());
                assert_eq!(4, state.queries.total());
            }
            other => panic!("unexpected rule {other}"),
        }
        assert!(state.errors.is_empty(), "{rule}: {:?}", state.errors);
    }

    // Node totals are the sums of incoming line counts.
    let c_node = graph.state_by_name("mock:c").expect("node c");
    assert_eq!(4, c_node.queries.total());
    assert!(c_node.queries.total() >= c_node.result.len());
}

fn to_set(objects: &[Object]) -> BTreeSet<String> {
    objects.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_duplicate_query_not_rerun_counts_accumulate() {
    // Two lines produce the same query; the store runs once, the goal node's
    // count for the query is the sum of both lines' counts, and the result
    // holds the object exactly once.
    let d = MockDomain::new("mock");
    let c = classes(&["a", "b"]);
    let (a, b) = (c[0].clone(), c[1].clone());
    let q = mock::query(&b, &[json!(42)]);
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .rule(mock::query_rule("ab1", a.clone(), q.clone()))
        .rule(mock::query_rule("ab2", a, q.clone()))
        .build();

    let graph = engine
        .goals(&engine.class("mock:a").expect("class"), objs(&[0]), &[b], None)
        .await
        .expect("search");

    assert_eq!(result_set(&graph, "mock:b"), to_set(&objs(&[42])));
    let node = graph.state_by_name("mock:b").expect("node b");
    assert_eq!(Some(2), node.queries.count(&q));
    for line in graph.line_ids() {
        let state = graph.line(line).expect("line state");
        assert_eq!(Some(1), state.queries.count(&q));
    }
}

#[tokio::test]
async fn test_cycle_terminates_and_populates_downstream() {
    // a -> b -> c -> a cycle with an exit c -> d.
    let d = MockDomain::new("mock");
    let cl = classes(&["a", "b", "c", "d"]);
    let pass = |goal: ClassRef| {
        move |o: &Object| Ok(mock::query(&goal, &[o.clone()]))
    };
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .rule(mock::apply_rule("ab", cl[0].clone(), cl[1].clone(), pass(cl[1].clone())))
        .rule(mock::apply_rule("bc", cl[1].clone(), cl[2].clone(), pass(cl[2].clone())))
        .rule(mock::apply_rule("ca", cl[2].clone(), cl[0].clone(), pass(cl[0].clone())))
        .rule(mock::apply_rule("cd", cl[2].clone(), cl[3].clone(), pass(cl[3].clone())))
        .build();

    let mut graph = engine.graph();
    let order = graph.traversal();
    assert_eq!(4, order.len());

    engine
        .goal_search(
            &mut graph,
            &engine.class("mock:a").expect("class"),
            objs(&[1]),
            None,
            &Interrupt::none(),
        )
        .await
        .expect("traversal terminates");

    assert_eq!(result_set(&graph, "mock:d"), to_set(&objs(&[1])));
    // Every line was followed exactly once: each recorded its single query.
    for line in graph.line_ids() {
        assert_eq!(1, graph.line(line).expect("state").queries.len());
    }
}

#[tokio::test]
async fn test_constraint_time_window_filters_objects() {
    let d = MockDomain::new("mock");
    let cl = classes(&["a", "c"]);
    let (a, c) = (cl[0].clone(), cl[1].clone());
    let early = json!({"name": "early", "timestamp": "2024-05-01T00:00:00Z"});
    let ontime = json!({"name": "ontime", "timestamp": "2024-05-01T12:00:00Z"});
    let late = json!({"name": "late", "timestamp": "2024-05-02T12:00:00Z"});
    let all = vec![early, ontime.clone(), late];
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .rule({
            let c2 = c.clone();
            let all = all.clone();
            mock::apply_rule("ac", a.clone(), c.clone(), move |_| {
                Ok(mock::query(&c2, &all))
            })
        })
        .build();

    let window = Constraint::new()
        .starting_at(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap())
        .ending_at(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
    let graph = engine
        .goals(
            &engine.class("mock:a").expect("class"),
            objs(&[0]),
            &[c.clone()],
            Some(&window),
        )
        .await
        .expect("search");
    assert_eq!(result_set(&graph, "mock:c"), to_set(&[ontime]));
    // The recorded count reflects what survived the filter.
    assert_eq!(1, graph.state_by_name("mock:c").expect("node").queries.total());

    // End before start rejects every time-tagged object.
    let inverted = Constraint::new()
        .starting_at(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
        .ending_at(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    let graph = engine
        .goals(
            &engine.class("mock:a").expect("class"),
            objs(&[0]),
            &[c],
            Some(&inverted),
        )
        .await
        .expect("search");
    assert!(result_set(&graph, "mock:c").is_empty());
}

#[tokio::test]
async fn test_constraint_limit_truncates_per_query() {
    let engine = chain_engine();
    let a = engine.class("mock:a").expect("class");
    let b = engine.class("mock:b").expect("class");
    let limit = Constraint::new().with_limit(1);
    let graph = engine
        .goals(&a, objs(&[0]), &[b], Some(&limit))
        .await
        .expect("search");
    assert_eq!(1, graph.state_by_name("mock:b").expect("node").result.len());
}

#[tokio::test]
async fn test_empty_start_objects_leave_graph_empty() {
    let engine = chain_engine();
    let a = engine.class("mock:a").expect("class");
    let z = engine.class("mock:z").expect("class");
    let graph = engine.goals(&a, vec![], &[z], None).await.expect("search");
    assert!(graph.node_by_name("mock:a").is_some());
    for node in graph.node_ids() {
        assert!(graph.node(node).expect("state").is_empty());
    }
}

#[tokio::test]
async fn test_unknown_start_class_yields_empty_graph() {
    let engine = chain_engine();
    let other = MockDomain::new("mock").class("unrelated").expect("class");
    let graph = engine
        .goals(&other, objs(&[1]), &[], None)
        .await
        .expect("search");
    assert!(graph.node_ids().is_empty());
}

#[tokio::test]
async fn test_apply_error_is_recorded_and_traversal_continues() {
    let d = MockDomain::new("mock");
    let cl = classes(&["a", "b", "c"]);
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&StoreConfig::new()).expect("mock store"))
        .rule(mock::apply_rule("ab-bad", cl[0].clone(), cl[1].clone(), |_| {
            Err(Error::Store("rule blew up".to_string()))
        }))
        .rule({
            let c2 = cl[2].clone();
            mock::apply_rule("ac", cl[0].clone(), cl[2].clone(), move |o| {
                Ok(mock::query(&c2, &[o.clone()]))
            })
        })
        .build();

    let graph = engine
        .goals(
            &engine.class("mock:a").expect("class"),
            objs(&[1]),
            &[cl[1].clone(), cl[2].clone()],
            None,
        )
        .await
        .expect("traversal continues past rule errors");

    assert_eq!(result_set(&graph, "mock:c"), to_set(&objs(&[1])));
    let bad_line = graph
        .line_ids()
        .into_iter()
        .find(|&l| graph.data().line(l).rule.name() == "ab-bad")
        .expect("line in view");
    let errors = &graph.line(bad_line).expect("state").errors;
    assert_eq!(1, errors.len());
    assert!(errors[0].contains("rule blew up"));
}

/// Store that never answers; used for timeout and cancellation tests.
struct StalledStore {
    domain: DomainRef,
}

#[async_trait::async_trait]
impl Store for StalledStore {
    fn domain(&self) -> DomainRef {
        self.domain.clone()
    }

    async fn get(
        &self,
        _query: &Query,
        _constraint: Option<&Constraint>,
        _out: &mut dyn Appender,
    ) -> correlate::Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_per_query_timeout_records_error() {
    let d = MockDomain::new("mock");
    let cl = classes(&["a", "b"]);
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(Arc::new(StalledStore {
            domain: Arc::new(d.clone()),
        }) as StoreRef)
        .rule({
            let b = cl[1].clone();
            mock::apply_rule("ab", cl[0].clone(), cl[1].clone(), move |_| {
                Ok(mock::query(&b, &[json!(1)]))
            })
        })
        .build();

    let constraint = Constraint::new().with_timeout(Duration::from_millis(20));
    let graph = engine
        .goals(
            &engine.class("mock:a").expect("class"),
            objs(&[0]),
            &[cl[1].clone()],
            Some(&constraint),
        )
        .await
        .expect("timeout does not abort the traversal");

    assert!(result_set(&graph, "mock:b").is_empty());
    let line = graph.line_ids()[0];
    let state = graph.line(line).expect("state");
    assert!(state.errors[0].contains("timed out"), "{:?}", state.errors);
    // The query is recorded as attempted but unevaluated.
    assert_eq!(0, state.queries.total());
    assert_eq!(1, state.queries.len());
}

#[tokio::test]
async fn test_cancellation_aborts_at_line_boundary() {
    let engine = chain_engine();
    let mut graph = engine.graph();
    let interrupt = Interrupt::none();
    interrupt.cancel();
    let err = engine
        .goal_search(
            &mut graph,
            &engine.class("mock:a").expect("class"),
            objs(&[0]),
            None,
            &interrupt,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_neighbours_respects_depth() {
    let engine = chain_engine();
    let a = engine.class("mock:a").expect("class");
    let graph = engine
        .neighbours(&a, objs(&[0]), 1, None)
        .await
        .expect("search");
    assert_eq!(result_set(&graph, "mock:b"), to_set(&objs(&[1, 2])));
    assert!(graph.node_by_name("mock:c").is_none());

    let graph = engine
        .neighbours(&a, objs(&[0]), 2, None)
        .await
        .expect("search");
    assert_eq!(result_set(&graph, "mock:c"), to_set(&objs(&[1, 2, 11, 12])));
    assert!(graph.node_by_name("mock:z").is_none());
}

#[tokio::test]
async fn test_goals_view_excludes_side_branches() {
    let engine = chain_engine();
    let a = engine.class("mock:a").expect("class");
    let c = engine.class("mock:c").expect("class");
    let graph = engine.goals(&a, objs(&[0]), &[c], None).await.expect("search");
    // z is past the goal; not part of any a -> c path.
    assert!(graph.node_by_name("mock:z").is_none());
    assert_eq!(result_set(&graph, "mock:c"), to_set(&objs(&[1, 2, 11, 12])));
}

proptest! {
    /// Round-trip law: a rendered class name parses back to the same class.
    #[test]
    fn prop_class_name_round_trip(
        domain in "[a-z][a-z0-9_-]{0,8}",
        class in "[A-Za-z][A-Za-z0-9_-]{0,12}",
    ) {
        let rendered = format!("{domain}:{class}");
        let (d, c) = correlate::model::parse_class_name(&rendered).expect("valid by construction");
        prop_assert_eq!(d, domain.as_str());
        prop_assert_eq!(c, class.as_str());
    }
}
