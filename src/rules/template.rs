//! Template Rules
//!
//! A template rule renders a text template against the start object and
//! hands the result to the goal domain's query parser. A rendered query that
//! trims to the empty string means the rule does not apply to this object.
//!
//! The object is exposed to the template as `object`; when the object is a
//! JSON map its top-level fields are also addressable directly, so rules
//! read naturally: `k8s:Pod:{{metadata.namespace}}/{{metadata.name}}`.

use super::funcs;
use crate::error::{Error, Result};
use crate::model::{Class, ClassRef, Domain, Object, Query};
use std::sync::Arc;
use tera::{Context, Tera};

/// A rule whose `apply` is a compiled text template.
#[derive(Clone)]
pub struct TemplateRule {
    name: String,
    start: Vec<ClassRef>,
    goal: Vec<ClassRef>,
    templates: Arc<Tera>,
    has_class_template: bool,
}

impl TemplateRule {
    /// Compile a template rule. `query` is the query template; `class`, when
    /// present, names the goal class the produced query must have (useful
    /// when the rule declares several goal classes). Compilation failures
    /// are fatal.
    pub fn new(
        name: impl Into<String>,
        start: Vec<ClassRef>,
        goal: Vec<ClassRef>,
        query: &str,
        class: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        if start.is_empty() || goal.is_empty() {
            return Err(Error::Template(format!(
                "rule {name}: start and goal must not be empty"
            )));
        }
        let mut templates = funcs::new_templates();
        templates.add_raw_template(&name, query)?;
        if let Some(class) = class {
            templates.add_raw_template(&Self::class_template_name(&name), class)?;
        }
        Ok(TemplateRule {
            name,
            start,
            goal,
            templates: Arc::new(templates),
            has_class_template: class.is_some(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &[ClassRef] {
        &self.start
    }

    pub fn goal(&self) -> &[ClassRef] {
        &self.goal
    }

    /// Apply the rule: render, trim, parse via the goal domain.
    pub fn apply(&self, object: &Object) -> Result<Query> {
        let context = template_context(object);
        let rendered = self.templates.render(&self.name, &context)?;
        let rendered = rendered.trim();
        if rendered.is_empty() {
            return Err(Error::NoQuery);
        }
        let query = self.goal[0].domain().query(rendered)?;
        if !self
            .goal
            .iter()
            .any(|g| g.full_name() == query.class().full_name())
        {
            return Err(Error::Template(format!(
                "rule {}: query {} is not for a goal class",
                self.name, query
            )));
        }
        if self.has_class_template {
            self.check_class(&context, &query)?;
        }
        Ok(query)
    }

    /// Render the class template and verify the query matches the class it
    /// names. Accepts either `class` or `domain:class` spelling.
    fn check_class(&self, context: &Context, query: &Query) -> Result<()> {
        let name = self
            .templates
            .render(&Self::class_template_name(&self.name), context)?;
        let name = name.trim();
        if name.is_empty()
            || name == query.class().name()
            || name == query.class().full_name()
        {
            Ok(())
        } else {
            Err(Error::Template(format!(
                "rule {}: query {} does not match class {}",
                self.name, query, name
            )))
        }
    }

    fn class_template_name(name: &str) -> String {
        format!("{name}__class")
    }
}

impl std::fmt::Debug for TemplateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRule")
            .field("name", &self.name)
            .finish()
    }
}

/// Build the rendering context: the whole object under `object`, plus the
/// top-level fields of map objects for direct addressing.
fn template_context(object: &Object) -> Context {
    let mut context = Context::new();
    context.insert("object", object);
    if let Object::Object(map) = object {
        for (key, value) in map {
            context.insert(key, value);
        }
    }
    context
}
