//! Mock Domain
//!
//! An in-memory domain for tests and wiring experiments. Class names are
//! literal strings, a query's data part is the JSON array of objects it
//! "finds", and the store simply replays that array:
//!
//! ```
//! use correlate::mock::MockDomain;
//! use correlate::model::Domain;
//!
//! let d = MockDomain::new("mock");
//! let q = d.query("mock:c:[1, 2, 3]").unwrap();
//! assert_eq!("mock:c:[1, 2, 3]", q.to_string());
//! ```
//!
//! Objects are arbitrary JSON values; a map object with a `timestamp` field
//! (RFC 3339) is time-tagged, so constraint windows can be exercised.

use crate::error::{Error, Result};
use crate::model::{
    parse_query_string, Appender, Class, ClassRef, Constraint, Domain, DomainRef, Object, Query,
    Store, StoreConfig, StoreRef,
};
use crate::rules::{ApplyRule, Rule};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A mock domain. With a class list it behaves like a closed domain (lookups
/// of other names fail); without one any literal name is a class.
#[derive(Debug, Clone)]
pub struct MockDomain {
    name: String,
    classes: Vec<String>,
}

impl MockDomain {
    /// An open mock domain: every name is a class.
    pub fn new(name: impl Into<String>) -> Self {
        MockDomain {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    /// A closed mock domain with a fixed class list.
    pub fn with_classes(name: impl Into<String>, classes: &[&str]) -> Self {
        MockDomain {
            name: name.into(),
            classes: classes.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

impl Domain for MockDomain {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock domain."
    }

    fn class(&self, name: &str) -> Option<ClassRef> {
        if name.is_empty() {
            return None;
        }
        if !self.classes.is_empty() && !self.classes.iter().any(|c| c == name) {
            return None;
        }
        Some(Arc::new(MockClass {
            name: name.to_string(),
            domain: self.clone(),
        }))
    }

    fn classes(&self) -> Vec<ClassRef> {
        self.classes
            .iter()
            .filter_map(|name| self.class(name))
            .collect()
    }

    fn query(&self, query: &str) -> Result<Query> {
        let (class, data) = parse_query_string(self, query)?;
        serde_json::from_str::<Vec<Object>>(&data)
            .map_err(|e| Error::InvalidQuery(format!("{query}: {e}")))?;
        Ok(Query::new(class, data))
    }

    fn store(&self, config: &StoreConfig) -> Result<StoreRef> {
        // A `fail` key simulates a store whose construction fails, for
        // exercising the lazy-failure path.
        if let Some(reason) = config.get("fail") {
            return Err(Error::Store(reason.to_string()));
        }
        Ok(Arc::new(MockStore {
            domain: self.clone(),
        }))
    }
}

/// A class in a mock domain; the name is whatever string it was looked up by.
#[derive(Debug, Clone)]
pub struct MockClass {
    name: String,
    domain: MockDomain,
}

impl Class for MockClass {
    fn domain(&self) -> DomainRef {
        Arc::new(self.domain.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("mock class {}", self.full_name())
    }

    fn timestamp(&self, object: &Object) -> Option<DateTime<Utc>> {
        let ts = object.get("timestamp")?.as_str()?;
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Store that replays the objects embedded in the query's data part.
struct MockStore {
    domain: MockDomain,
}

#[async_trait::async_trait]
impl Store for MockStore {
    fn domain(&self) -> DomainRef {
        Arc::new(self.domain.clone())
    }

    async fn get(
        &self,
        query: &Query,
        _constraint: Option<&Constraint>,
        out: &mut dyn Appender,
    ) -> Result<()> {
        let results: Vec<Object> = serde_json::from_str(query.data())
            .map_err(|e| Error::InvalidQuery(format!("{query}: {e}")))?;
        for object in results {
            out.append(object);
        }
        Ok(())
    }
}

/// A query against `class` that will return exactly `results`.
pub fn query(class: &ClassRef, results: &[Object]) -> Query {
    let data = Object::Array(results.to_vec()).to_string();
    Query::new(class.clone(), data)
}

/// A rule carrying only topology; applying it produces nothing.
pub fn rule(name: &str, start: ClassRef, goal: ClassRef) -> Rule {
    rule_multi(name, vec![start], vec![goal])
}

/// A topology-only rule with several start and goal classes.
pub fn rule_multi(name: &str, start: Vec<ClassRef>, goal: Vec<ClassRef>) -> Rule {
    Rule::Apply(ApplyRule::new(name, start, goal, |_| Err(Error::NoQuery)))
}

/// A rule computing its query with a closure.
pub fn apply_rule(
    name: &str,
    start: ClassRef,
    goal: ClassRef,
    apply: impl Fn(&Object) -> Result<Query> + Send + Sync + 'static,
) -> Rule {
    Rule::Apply(ApplyRule::new(name, vec![start], vec![goal], apply))
}

/// A rule that returns the same query for every start object.
pub fn query_rule(name: &str, start: ClassRef, query: Query) -> Rule {
    let goal = query.class().clone();
    Rule::Apply(ApplyRule::new(
        name,
        vec![start],
        vec![goal],
        move |_| Ok(query.clone()),
    ))
}
