//! Declarative Rule Factory
//!
//! Rules are declared in YAML or JSON documents, a single rule or a list:
//!
//! ```yaml
//! name: pod-to-logs
//! start: {domain: k8s, classes: [Pod]}
//! goal:  {domain: log, classes: [application]}
//! result:
//!   query: 'log:application:{kubernetes_namespace_name="{{metadata.namespace}}"}'
//! ```
//!
//! `classes` may be omitted to mean every class the domain enumerates. The
//! factory resolves the class sets against the registered domains and
//! compiles one [`Rule`] per declaration; [`crate::graph::Data`] later fans
//! each rule out into one line per (start, goal) pair. Unknown fields,
//! unknown domains and unknown classes are fatal load errors.

use super::{Rule, TemplateRule};
use crate::error::{Error, Result};
use crate::model::{ClassRef, Domain, DomainRef};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A declarative rule as it appears in a rule file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDecl {
    pub name: String,
    pub start: ClassSpec,
    pub goal: ClassSpec,
    pub result: ResultSpec,
}

/// A set of classes within one domain. An empty `classes` list means every
/// class the domain enumerates.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassSpec {
    pub domain: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// The rule's output: a query template and an optional class template that
/// picks which goal class the query is for.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultSpec {
    pub query: String,
    #[serde(default)]
    pub class: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(RuleDecl),
    Many(Vec<RuleDecl>),
}

/// Compiles declarative rules against a set of registered domains.
pub struct RuleFactory {
    domains: HashMap<String, DomainRef>,
}

impl RuleFactory {
    pub fn new(domains: impl IntoIterator<Item = DomainRef>) -> Self {
        let domains = domains
            .into_iter()
            .map(|d| (d.name().to_string(), d))
            .collect();
        RuleFactory { domains }
    }

    /// Compile one declaration into a rule.
    pub fn rule(&self, decl: &RuleDecl) -> Result<Rule> {
        let start = self.resolve(&decl.start)?;
        let goal = self.resolve(&decl.goal)?;
        let rule = TemplateRule::new(
            &decl.name,
            start,
            goal,
            &decl.result.query,
            decl.result.class.as_deref(),
        )?;
        Ok(Rule::Template(rule))
    }

    /// Parse a YAML or JSON document holding one rule or a list of rules and
    /// compile them all.
    pub fn parse(&self, text: &str) -> Result<Vec<Rule>> {
        let decls: OneOrMany = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid rule document: {e}")))?;
        let decls = match decls {
            OneOrMany::One(d) => vec![d],
            OneOrMany::Many(ds) => ds,
        };
        decls.iter().map(|d| self.rule(d)).collect()
    }

    /// Load and compile a rule file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Vec<Rule>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        self.parse(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn resolve(&self, spec: &ClassSpec) -> Result<Vec<ClassRef>> {
        let domain = self
            .domains
            .get(&spec.domain)
            .ok_or_else(|| Error::DomainNotFound(spec.domain.clone()))?;
        if spec.classes.is_empty() {
            let all = domain.classes();
            if all.is_empty() {
                return Err(Error::Config(format!(
                    "domain {} does not enumerate classes; list them explicitly",
                    spec.domain
                )));
            }
            return Ok(all);
        }
        spec.classes
            .iter()
            .map(|name| {
                domain
                    .class(name)
                    .ok_or_else(|| Error::ClassNotFound(format!("{}:{name}", spec.domain)))
            })
            .collect()
    }
}
