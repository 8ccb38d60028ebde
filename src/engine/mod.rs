//! Correlation Engine
//!
//! The engine is the process-wide front door. It owns the registered
//! domains, at most one store per domain, the rule graph catalogue built
//! from all loaded rules, and the knobs shared by every correlation.
//!
//! Everything the engine holds is immutable after [`EngineBuilder::build`],
//! so one engine serves any number of concurrent correlations without
//! locking; each request gets its own [`Graph`] view and [`Follower`].
//!
//! ```no_run
//! use correlate::engine::Engine;
//! use correlate::mock::MockDomain;
//! use correlate::model::{Class, StoreConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> correlate::Result<()> {
//! let engine = Engine::builder()
//!     .domain(Arc::new(MockDomain::new("mock")))
//!     .store(StoreConfig::new().with("domain", "mock"))?
//!     .rules_text("name: r\nstart: {domain: mock, classes: [a]}\ngoal: {domain: mock, classes: [b]}\nresult: {query: 'mock:b:[]'}\n")?
//!     .build();
//! let start = engine.class("mock:a")?;
//! assert_eq!("mock:a", start.full_name());
//! # Ok(())
//! # }
//! ```

mod follower;
mod interrupt;

pub use follower::Follower;
pub use interrupt::{CancelHandle, Interrupt};

use crate::error::{Error, Result};
use crate::graph::{Data, Graph, LineId, NodeId};
use crate::model::{
    parse_class_name, split_query, Appender, Class, ClassRef, Constraint, Domain, DomainRef,
    Object, Query, Store, StoreConfig, StoreRef,
};
use crate::rules::{Rule, RuleFactory};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_FAN_OUT: usize = 8;

/// The correlation engine. Build one with [`Engine::builder`].
pub struct Engine {
    domains: Vec<DomainRef>,
    domain_index: HashMap<String, usize>,
    stores: HashMap<String, StoreRef>,
    store_configs: HashMap<String, Vec<StoreConfig>>,
    store_errors: HashMap<String, String>,
    data: Arc<Data>,
    fan_out: usize,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Registered domains, in registration order.
    pub fn domains(&self) -> &[DomainRef] {
        &self.domains
    }

    pub fn domain(&self, name: &str) -> Result<DomainRef> {
        self.domain_index
            .get(name)
            .map(|&i| self.domains[i].clone())
            .ok_or_else(|| Error::DomainNotFound(name.to_string()))
    }

    /// The store serving a domain. Domains whose store construction failed
    /// hold a sentinel that returns the construction error on first use.
    pub fn store(&self, domain: &str) -> Result<StoreRef> {
        self.stores.get(domain).cloned().ok_or_else(|| {
            Error::StoreUnavailable {
                domain: domain.to_string(),
                reason: "no store configured".to_string(),
            }
        })
    }

    /// Store configurations registered for a domain.
    pub fn store_configs(&self, domain: &str) -> &[StoreConfig] {
        self.store_configs
            .get(domain)
            .map_or(&[], Vec::as_slice)
    }

    /// The construction error of a domain's store, if it failed to build.
    pub fn store_error(&self, domain: &str) -> Option<&str> {
        self.store_errors.get(domain).map(String::as_str)
    }

    /// The shared rule graph catalogue.
    pub fn data(&self) -> &Arc<Data> {
        &self.data
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.data.rules()
    }

    /// Parallel store queries allowed within one line.
    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    /// Resolve a `domain:class` name (or legacy `class.domain`).
    pub fn class(&self, name: &str) -> Result<ClassRef> {
        let (domain_name, class_name) = parse_class_name(name)?;
        let domain = self.domain(domain_name)?;
        domain
            .class(class_name)
            .ok_or_else(|| Error::ClassNotFound(format!("{domain_name}:{class_name}")))
    }

    /// Parse a `domain:class:data` query string via its domain.
    pub fn query(&self, query: &str) -> Result<Query> {
        let (domain_name, _, _) = split_query(query)?;
        self.domain(domain_name)?.query(query)
    }

    /// Execute one query against its domain's store.
    pub async fn get(
        &self,
        query: &Query,
        constraint: Option<&Constraint>,
        out: &mut dyn Appender,
    ) -> Result<()> {
        let store = self.store(&query.domain_name())?;
        store.get(query, constraint, out).await
    }

    /// The full rule graph as a fresh per-request view.
    pub fn graph(&self) -> Graph {
        Graph::full(self.data.clone())
    }

    /// The all-paths view from a start class to a set of goal classes.
    /// Classes unknown to the rule graph contribute nothing.
    pub fn goals_graph(&self, start: &ClassRef, goals: &[ClassRef]) -> Graph {
        match self.data.node_id(start) {
            Some(start_id) => {
                let goal_ids: Vec<NodeId> =
                    goals.iter().filter_map(|g| self.data.node_id(g)).collect();
                self.graph().all_paths(start_id, &goal_ids)
            }
            None => {
                tracing::debug!(class = %start.full_name(), "start class not in rule graph");
                Graph::empty(self.data.clone())
            }
        }
    }

    /// The minimum-hop-paths view from a start class to a set of goals.
    pub fn shortest_paths_graph(&self, start: &ClassRef, goals: &[ClassRef]) -> Graph {
        match self.data.node_id(start) {
            Some(start_id) => {
                let goal_ids: Vec<NodeId> =
                    goals.iter().filter_map(|g| self.data.node_id(g)).collect();
                self.graph().shortest_paths(start_id, &goal_ids)
            }
            None => Graph::empty(self.data.clone()),
        }
    }

    /// The neighbourhood view around a start class.
    pub fn neighbours_graph(&self, start: &ClassRef, depth: usize) -> Graph {
        match self.data.node_id(start) {
            Some(start_id) => self.graph().neighbourhood(start_id, depth),
            None => Graph::empty(self.data.clone()),
        }
    }

    /// A follower for one correlation.
    pub fn follower(&self, constraint: Option<&Constraint>, interrupt: &Interrupt) -> Follower<'_> {
        Follower::new(self, constraint.cloned(), interrupt.clone())
    }

    /// Seed the start node of `graph` and follow every line in dependency
    /// order. Store and rule errors are recorded in the graph; only
    /// cancellation aborts.
    pub async fn goal_search(
        &self,
        graph: &mut Graph,
        start: &ClassRef,
        start_objects: Vec<Object>,
        constraint: Option<&Constraint>,
        interrupt: &Interrupt,
    ) -> Result<()> {
        if self.seed(graph, start, start_objects).is_none() {
            return Ok(());
        }
        let order = graph.traversal();
        self.run(graph, order, constraint, interrupt).await
    }

    /// Goal search over the all-paths view; the common entry point.
    pub async fn goals(
        &self,
        start: &ClassRef,
        start_objects: Vec<Object>,
        goals: &[ClassRef],
        constraint: Option<&Constraint>,
    ) -> Result<Graph> {
        let mut graph = self.goals_graph(start, goals);
        self.goal_search(&mut graph, start, start_objects, constraint, &Interrupt::none())
            .await?;
        Ok(graph)
    }

    /// Breadth-first spread from a start class, `depth` hops at most.
    pub async fn neighbours(
        &self,
        start: &ClassRef,
        start_objects: Vec<Object>,
        depth: usize,
        constraint: Option<&Constraint>,
    ) -> Result<Graph> {
        let mut graph = self.neighbours_graph(start, depth);
        let Some(start_id) = self.seed(&mut graph, start, start_objects) else {
            return Ok(graph);
        };
        let order = graph.bfs_traversal(start_id);
        self.run(&mut graph, order, constraint, &Interrupt::none())
            .await?;
        Ok(graph)
    }

    fn seed(&self, graph: &mut Graph, start: &ClassRef, objects: Vec<Object>) -> Option<NodeId> {
        let start_id = self.data.node_id(start)?;
        graph.add_node(start_id);
        if let Some(node) = graph.node_mut(start_id) {
            node.result.extend(objects);
        }
        Some(start_id)
    }

    async fn run(
        &self,
        graph: &mut Graph,
        order: Vec<LineId>,
        constraint: Option<&Constraint>,
        interrupt: &Interrupt,
    ) -> Result<()> {
        let follower = self.follower(constraint, interrupt);
        for line in order {
            follower.visit(graph, line).await?;
        }
        Ok(())
    }
}

/// Step-by-step engine assembly: register domains, then stores and rules
/// that refer to them, then seal into an immutable [`Engine`].
pub struct EngineBuilder {
    domains: Vec<DomainRef>,
    domain_index: HashMap<String, usize>,
    stores: HashMap<String, StoreRef>,
    store_configs: HashMap<String, Vec<StoreConfig>>,
    store_errors: HashMap<String, String>,
    rules: Vec<Rule>,
    fan_out: usize,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("domains", &self.domain_index.keys().collect::<Vec<_>>())
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("store_configs", &self.store_configs)
            .field("store_errors", &self.store_errors)
            .field("rules", &self.rules)
            .field("fan_out", &self.fan_out)
            .finish()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            domains: Vec::new(),
            domain_index: HashMap::new(),
            stores: HashMap::new(),
            store_configs: HashMap::new(),
            store_errors: HashMap::new(),
            rules: Vec::new(),
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Register a domain. Re-registering a name is ignored.
    pub fn domain(mut self, domain: DomainRef) -> Self {
        let name = domain.name().to_string();
        if self.domain_index.contains_key(&name) {
            tracing::debug!(domain = %name, "domain already registered");
            return self;
        }
        self.domain_index.insert(name, self.domains.len());
        self.domains.push(domain);
        self
    }

    /// Register a store from configuration. The `domain` key must name a
    /// registered domain (a missing or unknown name is a fatal configuration
    /// error). A store whose construction fails installs a sentinel that
    /// reports the error on first use, so one bad backend does not take the
    /// engine down.
    pub fn store(mut self, config: StoreConfig) -> Result<Self> {
        let name = config
            .domain()
            .ok_or_else(|| Error::Config("store configuration has no domain key".to_string()))?
            .to_string();
        let domain = self
            .domain_index
            .get(&name)
            .map(|&i| self.domains[i].clone())
            .ok_or_else(|| Error::DomainNotFound(name.clone()))?;
        let store: StoreRef = match domain.store(&config) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(domain = %name, error = %e, "store construction failed");
                self.store_errors.insert(name.clone(), e.to_string());
                Arc::new(FailedStore {
                    domain,
                    reason: e.to_string(),
                })
            }
        };
        self.stores.insert(name.clone(), store);
        self.store_configs.entry(name).or_default().push(config);
        Ok(self)
    }

    /// Register an already-constructed store under its domain's name.
    /// Replaces any store previously registered for that domain.
    pub fn store_ref(mut self, store: StoreRef) -> Self {
        let name = store.domain().name().to_string();
        self.stores.insert(name, store);
        self
    }

    /// Add a compiled rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add compiled rules.
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Compile declarative rules from a YAML or JSON document against the
    /// registered domains.
    pub fn rules_text(mut self, text: &str) -> Result<Self> {
        let factory = RuleFactory::new(self.domains.iter().cloned());
        self.rules.extend(factory.parse(text)?);
        Ok(self)
    }

    /// Load a rule file.
    pub fn rule_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let factory = RuleFactory::new(self.domains.iter().cloned());
        self.rules.extend(factory.load_file(path)?);
        Ok(self)
    }

    /// Bound on parallel store queries within one line.
    pub fn fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    pub fn build(self) -> Engine {
        let data = Data::with_rules(self.rules);
        tracing::debug!(
            domains = self.domains.len(),
            nodes = data.node_count(),
            lines = data.line_count(),
            "engine built"
        );
        Engine {
            domains: self.domains,
            domain_index: self.domain_index,
            stores: self.stores,
            store_configs: self.store_configs,
            store_errors: self.store_errors,
            data: Arc::new(data),
            fan_out: self.fan_out,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        EngineBuilder::new()
    }
}

/// Sentinel store for a domain whose real store failed to construct:
/// remembers the construction error and returns it on every call.
struct FailedStore {
    domain: DomainRef,
    reason: String,
}

#[async_trait::async_trait]
impl Store for FailedStore {
    fn domain(&self) -> DomainRef {
        self.domain.clone()
    }

    async fn get(
        &self,
        _query: &Query,
        _constraint: Option<&Constraint>,
        _out: &mut dyn Appender,
    ) -> Result<()> {
        Err(Error::StoreUnavailable {
            domain: self.domain.name().to_string(),
            reason: self.reason.clone(),
        })
    }
}
