//! Correlation Rules
//!
//! A rule maps an object of one of its *start* classes to a query against
//! one of its *goal* classes. Only two flavours exist, so the rule type is a
//! small sealed variant rather than an open trait: the [`TemplateRule`]
//! compiled from declarative rule files, and the closure-backed
//! [`ApplyRule`] used by the mock domain and tests.

mod factory;
mod funcs;
mod template;

pub use factory::{ClassSpec, ResultSpec, RuleDecl, RuleFactory};
pub use template::TemplateRule;

use crate::error::Result;
use crate::model::{Class, ClassRef, Object, Query};
use std::fmt;
use std::sync::Arc;

/// Signature of the closure behind an [`ApplyRule`].
pub type ApplyFn = dyn Fn(&Object) -> Result<Query> + Send + Sync;

/// A rule backed by a plain function. The mock domain and tests build these;
/// production rules are [`TemplateRule`]s.
#[derive(Clone)]
pub struct ApplyRule {
    name: String,
    start: Vec<ClassRef>,
    goal: Vec<ClassRef>,
    apply: Arc<ApplyFn>,
}

impl ApplyRule {
    pub fn new(
        name: impl Into<String>,
        start: Vec<ClassRef>,
        goal: Vec<ClassRef>,
        apply: impl Fn(&Object) -> Result<Query> + Send + Sync + 'static,
    ) -> Self {
        ApplyRule {
            name: name.into(),
            start,
            goal,
            apply: Arc::new(apply),
        }
    }
}

/// A correlation rule. Cheap to clone; every line of the graph holds one.
#[derive(Clone)]
pub enum Rule {
    Template(TemplateRule),
    Apply(ApplyRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::Template(r) => r.name(),
            Rule::Apply(r) => &r.name,
        }
    }

    /// Classes this rule applies to.
    pub fn start(&self) -> &[ClassRef] {
        match self {
            Rule::Template(r) => r.start(),
            Rule::Apply(r) => &r.start,
        }
    }

    /// Classes this rule leads to.
    pub fn goal(&self) -> &[ClassRef] {
        match self {
            Rule::Template(r) => r.goal(),
            Rule::Apply(r) => &r.goal,
        }
    }

    /// Map a start object to a goal query. `Err(Error::NoQuery)` means the
    /// rule has nothing to say about this object and is skipped.
    pub fn apply(&self, object: &Object) -> Result<Query> {
        match self {
            Rule::Template(r) => r.apply(object),
            Rule::Apply(r) => (r.apply)(object),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let starts: Vec<String> = self.start().iter().map(|c| c.full_name()).collect();
        let goals: Vec<String> = self.goal().iter().map(|c| c.full_name()).collect();
        write!(
            f,
            "Rule({} [{}]->[{}])",
            self.name(),
            starts.join(","),
            goals.join(",")
        )
    }
}
