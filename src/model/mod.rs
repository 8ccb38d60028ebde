//! Core Type Model
//!
//! Abstract interfaces over heterogeneous observability backends:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`Domain`] | A backend family (Kubernetes, Prometheus, Alertmanager, Loki, NetFlow) |
//! | [`Class`] | A kind of object within a domain, e.g. `k8s:Pod` |
//! | [`Object`] | An opaque value; only its class knows its shape |
//! | [`Query`] | A `domain:class:data` request identifying a set of objects |
//! | [`Store`] | A backend adapter that executes queries and yields objects |
//! | [`StoreConfig`] | Free-form per-domain store settings |
//!
//! The engine treats objects by identity: equality is whatever the class'
//! [`Class::id`] says it is, defaulting to a stable serialization. Queries
//! compare by their rendered string.

mod constraint;

pub use constraint::Constraint;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// An object is an arbitrary JSON value. Its meaning is known only to its
/// [`Class`]; the engine never looks inside except through class capabilities.
pub type Object = serde_json::Value;

/// Shared handle to a domain implementation.
pub type DomainRef = Arc<dyn Domain>;

/// Shared handle to a class implementation.
pub type ClassRef = Arc<dyn Class>;

/// Shared handle to a store implementation.
pub type StoreRef = Arc<dyn Store>;

/// A family of observability signals served by one kind of backend.
pub trait Domain: Send + Sync {
    /// Short name, e.g. `k8s`, `metric`, `log`. First segment of every class
    /// and query string belonging to this domain.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str {
        ""
    }

    /// Look up a class by name within this domain.
    fn class(&self, name: &str) -> Option<ClassRef>;

    /// Enumerate the domain's classes. Domains with unbounded class sets
    /// (e.g. Kubernetes resource kinds) return the known subset.
    fn classes(&self) -> Vec<ClassRef>;

    /// Parse a full `domain:class:data` query string belonging to this domain.
    fn query(&self, query: &str) -> Result<Query>;

    /// Construct a store from free-form configuration.
    fn store(&self, config: &StoreConfig) -> Result<StoreRef>;
}

/// A kind of object within a domain. Identity is the `(domain, class)` name
/// pair, rendered `domain:class`.
pub trait Class: Send + Sync {
    /// The domain this class belongs to.
    fn domain(&self) -> DomainRef;

    /// Class name within the domain.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> String {
        String::new()
    }

    /// Zero value for an object of this class.
    fn new_object(&self) -> Object {
        Object::Null
    }

    /// Identity key used for deduplication. The default is the object's
    /// canonical serialization, which is stable for JSON values.
    fn id(&self, object: &Object) -> String {
        object.to_string()
    }

    /// Short preview string for display.
    fn preview(&self, object: &Object) -> String {
        object.to_string()
    }

    /// Timestamp of an object, for classes whose objects are time-tagged.
    /// Returning `None` exempts the object from constraint time filtering.
    fn timestamp(&self, _object: &Object) -> Option<DateTime<Utc>> {
        None
    }

    /// Full `domain:class` name.
    fn full_name(&self) -> String {
        format!("{}:{}", self.domain().name(), self.name())
    }
}

impl fmt::Debug for dyn Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

impl fmt::Debug for dyn Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Minimal sink for store results.
pub trait Appender: Send {
    fn append(&mut self, object: Object);
}

impl Appender for Vec<Object> {
    fn append(&mut self, object: Object) {
        self.push(object);
    }
}

/// A backend adapter executing queries for one domain.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// The domain this store serves.
    fn domain(&self) -> DomainRef;

    /// Execute `query`, appending resulting objects. The store honors the
    /// constraint at the backend where it can; the engine filters by object
    /// timestamp as well.
    async fn get(
        &self,
        query: &Query,
        constraint: Option<&Constraint>,
        out: &mut dyn Appender,
    ) -> Result<()>;
}

/// A query: a class plus a domain-opaque data string, rendered
/// `domain:class:data`. Queries compare by their rendered string.
#[derive(Clone)]
pub struct Query {
    class: ClassRef,
    data: String,
}

impl Query {
    pub fn new(class: ClassRef, data: impl Into<String>) -> Self {
        Query {
            class,
            data: data.into(),
        }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// The domain-opaque part after the second `:`.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Name of the domain this query belongs to.
    pub fn domain_name(&self) -> String {
        self.class.domain().name().to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.full_name(), self.data)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({self})")
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// Store configuration: a free-form string map. The reserved
/// [`STORE_KEY_DOMAIN`] key names the domain the entry belongs to; all other
/// keys are domain-specific.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreConfig(pub BTreeMap<String, String>);

/// Reserved configuration key identifying the store's domain.
pub const STORE_KEY_DOMAIN: &str = "domain";

impl StoreConfig {
    pub fn new() -> Self {
        StoreConfig(BTreeMap::new())
    }

    /// The domain this configuration entry belongs to.
    pub fn domain(&self) -> Option<&str> {
        self.get(STORE_KEY_DOMAIN)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)] // literal pattern
    RE.get_or_init(|| Regex::new("^[A-Za-z][A-Za-z0-9_-]*$").unwrap())
}

fn valid_name(s: &str) -> bool {
    name_regex().is_match(s)
}

/// Parse a class name into `(domain, class)` parts.
///
/// The canonical form is `domain:class`. The legacy `class.domain` form is
/// accepted on input but never rendered.
pub fn parse_class_name(name: &str) -> Result<(&str, &str)> {
    let invalid = || Error::InvalidClassName(name.to_string());
    if let Some((domain, class)) = name.split_once(':') {
        if valid_name(domain) && valid_name(class) {
            return Ok((domain, class));
        }
        return Err(invalid());
    }
    // Legacy form: the domain is the last dot-separated segment.
    if let Some((class, domain)) = name.rsplit_once('.') {
        if valid_name(domain) && valid_name(class) {
            return Ok((domain, class));
        }
    }
    Err(invalid())
}

/// Split a query string into `(domain, class, data)` parts.
///
/// The grammar is `DOMAIN ":" CLASS ":" DATA` where DATA runs to end of
/// input and is left to the domain to interpret.
pub fn split_query(query: &str) -> Result<(&str, &str, &str)> {
    let invalid = || Error::InvalidQuery(query.to_string());
    let (domain, rest) = query.split_once(':').ok_or_else(invalid)?;
    let (class, data) = rest.split_once(':').ok_or_else(invalid)?;
    if valid_name(domain) && valid_name(class) {
        Ok((domain, class, data))
    } else {
        Err(invalid())
    }
}

/// Parse a query string on behalf of `domain`: checks the domain prefix,
/// resolves the class, and returns the class with the raw data part.
///
/// Domain implementations call this from their [`Domain::query`] and then
/// validate the data part themselves.
pub fn parse_query_string(domain: &dyn Domain, query: &str) -> Result<(ClassRef, String)> {
    let (domain_name, class_name, data) = split_query(query)?;
    if domain_name != domain.name() {
        return Err(Error::InvalidQuery(format!(
            "{query}: wrong domain, expected {}",
            domain.name()
        )));
    }
    let class = domain
        .class(class_name)
        .ok_or_else(|| Error::ClassNotFound(format!("{domain_name}:{class_name}")))?;
    Ok((class, data.to_string()))
}
