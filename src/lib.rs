//! # Correlate
//!
//! A correlation engine for cluster observability data. Given a starting
//! observation (a Kubernetes object, an alert, a log line, a metric sample,
//! a network flow), it finds related observations in other backends by
//! following a graph of user-declared rules. Each rule is a template that
//! maps objects of one class into a query against another backend's store.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Rule files (YAML/JSON)
//!     ↓
//! [RuleFactory]          → compiled TemplateRules
//!     ↓
//! [Data]                 → class nodes × rule lines (stable ids)
//!     ↓  per request
//! [Graph view]           → all-paths | shortest | neighbourhood | full
//!     ↓
//! [Traversal]            → SCC-condensed dependency order
//!     ↓
//! [Follower]             → apply rules, dedup queries, query Stores
//!     ↓
//! Populated graph        → rest::GraphInfo response
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use correlate::{Engine, mock::MockDomain};
//! use std::sync::Arc;
//!
//! let engine = Engine::builder()
//!     .domain(Arc::new(MockDomain::new("mock")))
//!     .store(StoreConfig::new().with("domain", "mock"))?
//!     .rule_file("rules/pods.yaml")?
//!     .build();
//!
//! let start = engine.class("k8s:Pod")?;
//! let goal = engine.class("log:application")?;
//! let graph = engine.goals(&start, objects, &[goal], None).await?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `model` | Domain / Class / Object / Query / Store abstractions |
//! | `unique` | Order-preserving deduplicating accumulators |
//! | `graph` | Rule graph catalogue, views, dependency-order traversal |
//! | `rules` | Template rules and the declarative rule factory |
//! | `engine` | Engine front door and the per-request follower |
//! | `config` | Store/rule-file configuration loading |
//! | `rest` | Request/response types for a correlation service |
//! | `mock` | In-memory domain for tests and experiments |

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod mock;
pub mod model;
pub mod rest;
pub mod rules;
pub mod unique;

// Re-export the types most embedders touch.
pub use config::{Config, LoggingConfig, SearchConfig};
pub use engine::{CancelHandle, Engine, EngineBuilder, Follower, Interrupt};
pub use error::{Error, Result};
pub use graph::{Data, Graph, LineId, NodeId, QueryCount, QueryCounts};
pub use model::{
    Appender, Class, ClassRef, Constraint, Domain, DomainRef, Object, Query, Store, StoreConfig,
    StoreRef,
};
pub use rules::{Rule, RuleDecl, RuleFactory, TemplateRule};
pub use unique::{ObjectSet, UniqueList};
