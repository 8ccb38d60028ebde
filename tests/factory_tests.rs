//! Declarative rule loading end to end: files, expansion into the graph,
//! and the template function library driving real rule applications.

use correlate::graph::Data;
use correlate::mock::MockDomain;
use correlate::model::{Domain, DomainRef};
use correlate::rules::RuleFactory;
use correlate::{Engine, Error};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn factory() -> RuleFactory {
    RuleFactory::new([
        Arc::new(MockDomain::with_classes("foo", &["a", "b", "c"])) as DomainRef,
        Arc::new(MockDomain::with_classes("bar", &["x", "y", "z"])) as DomainRef,
    ])
}

#[test]
fn test_expansion_into_graph_lines() {
    // One declarative rule over 3 starts and 2 goals becomes 6 lines.
    let rules = factory()
        .parse(
            r#"
name: wide
start: {domain: foo}
goal: {domain: bar, classes: [x, y]}
result: {query: "bar:x:[]"}
"#,
        )
        .expect("valid rule");
    assert_eq!(1, rules.len());
    let data = Data::with_rules(rules);
    assert_eq!(6, data.line_count());
    assert_eq!(5, data.node_count());
}

#[test]
fn test_rule_file_yaml() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
- name: one
  start: {{domain: foo, classes: [a]}}
  goal: {{domain: bar, classes: [z]}}
  result: {{query: "bar:z:[]"}}
- name: two
  start: {{domain: foo, classes: [b]}}
  goal: {{domain: bar, classes: [y]}}
  result: {{query: "bar:y:[]"}}
"#
    )
    .expect("write");
    let rules = factory().load_file(file.path()).expect("load");
    assert_eq!(2, rules.len());
    assert_eq!("one", rules[0].name());
}

#[test]
fn test_rule_file_json() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{"name": "j", "start": {{"domain": "foo", "classes": ["a"]}},
            "goal": {{"domain": "bar", "classes": ["z"]}},
            "result": {{"query": "bar:z:[]"}}}}"#
    )
    .expect("write");
    let rules = factory().load_file(file.path()).expect("load");
    assert_eq!(1, rules.len());
}

#[test]
fn test_missing_rule_file_is_config_error() {
    let err = factory().load_file("/does/not/exist.yaml").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err}");
}

#[test]
fn test_bad_template_fails_at_load() {
    let err = factory()
        .parse(
            r#"
name: broken
start: {domain: foo, classes: [a]}
goal: {domain: bar, classes: [z]}
result: {query: "{{ unclosed"}
"#,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Template(_)), "{err}");
}

#[test]
fn test_unknown_template_function_fails_on_apply() {
    // Tera resolves function names at render time; the failure is recorded
    // as a template error for the object being applied.
    let rules = factory()
        .parse(
            r#"
name: broken
start: {domain: foo, classes: [a]}
goal: {domain: bar, classes: [z]}
result: {query: "{{ nosuchfn(x=1) }}"}
"#,
        )
        .expect("syntax is valid");
    let err = rules[0].apply(&json!({})).unwrap_err();
    assert!(matches!(err, Error::Template(_)), "{err}");
}

#[tokio::test]
async fn test_template_rule_drives_correlation() {
    // A pod-shaped object routed to its logs by template, end to end.
    let d = MockDomain::new("mock");
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&Default::default()).expect("mock store"))
        .rules_text(
            r#"
name: pod-to-logs
start: {domain: mock, classes: [pod]}
goal: {domain: mock, classes: [logs]}
result:
  query: 'mock:logs:[{{ label(map=metadata.labels, key="app") | json_encode }}]'
"#,
        )
        .expect("rules load")
        .build();

    let pod = json!({"metadata": {"name": "web-1", "labels": {"app": "web"}}});
    let start = engine.class("mock:pod").expect("class");
    let goal = engine.class("mock:logs").expect("class");
    let graph = engine
        .goals(&start, vec![pod], &[goal], None)
        .await
        .expect("search");
    let logs = graph.state_by_name("mock:logs").expect("node");
    assert_eq!(&[json!("web")], logs.result.list());
}

#[tokio::test]
async fn test_conditional_template_skips_non_matching_objects() {
    let d = MockDomain::new("mock");
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&Default::default()).expect("mock store"))
        .rules_text(
            r#"
name: selective
start: {domain: mock, classes: [pod]}
goal: {domain: mock, classes: [logs]}
result:
  query: '{% if phase == "Running" %}mock:logs:[{{ name | json_encode }}]{% endif %}'
"#,
        )
        .expect("rules load")
        .build();

    let start = engine.class("mock:pod").expect("class");
    let goal = engine.class("mock:logs").expect("class");
    let graph = engine
        .goals(
            &start,
            vec![
                json!({"name": "run", "phase": "Running"}),
                json!({"name": "done", "phase": "Succeeded"}),
            ],
            &[goal],
            None,
        )
        .await
        .expect("search");

    // The skipped object records no query at all.
    let logs = graph.state_by_name("mock:logs").expect("node");
    assert_eq!(&[json!("run")], logs.result.list());
    assert_eq!(1, logs.queries.len());
    let line = graph.line_ids()[0];
    let state = graph.line(line).expect("state");
    assert_eq!(1, state.queries.len());
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn test_always_empty_template_leaves_goal_untouched() {
    let d = MockDomain::new("mock");
    let engine = Engine::builder()
        .domain(Arc::new(d.clone()))
        .store_ref(d.store(&Default::default()).expect("mock store"))
        .rules_text(
            r#"
name: silent
start: {domain: mock, classes: [a]}
goal: {domain: mock, classes: [b]}
result: {query: "  "}
"#,
        )
        .expect("rules load")
        .build();

    let start = engine.class("mock:a").expect("class");
    let goal = engine.class("mock:b").expect("class");
    let graph = engine
        .goals(&start, vec![json!(1)], &[goal], None)
        .await
        .expect("search");
    let line = graph.line_ids()[0];
    let state = graph.line(line).expect("state");
    assert!(state.queries.is_empty());
    assert!(state.errors.is_empty());
    assert!(graph.state_by_name("mock:b").expect("node").is_empty());
}
