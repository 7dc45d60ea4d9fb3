//! Route table and dispatch.
//!
//! # Responsibilities
//! - Store routes keyed by normalized criteria strings
//! - Bind code dispatchers to route names declared in config
//! - Resolve a request's criteria to its route
//!
//! # Design Decisions
//! - Immutable after bootstrap; resolution needs no locks
//! - Criteria keys inside a route carry the reserved prefixes
//!   `method.`, `accept.`, `content-type.` consumed by the selectors
//! - Every route seeds its chain with a method selector unless a custom
//!   seed is supplied

pub mod router;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::RouterConfig;
use crate::dispatch::{Chain, Dispatcher, MethodSelect};
use crate::http::request::criteria_from_path;

pub use router::Router;

/// Error type for route table construction.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("route name '{0}' is not declared in router.routes")]
    UnknownRoute(String),
}

/// One route: an ordered mapping of criteria keys to dispatcher lists,
/// plus the seed dispatchers that start the chain.
pub struct Route {
    seed: Vec<Arc<dyn Dispatcher>>,
    entries: Vec<(String, Vec<Arc<dyn Dispatcher>>)>,
}

impl Route {
    /// A route whose chain starts with the method selector.
    pub fn new() -> Self {
        Route {
            seed: vec![Arc::new(MethodSelect)],
            entries: Vec::new(),
        }
    }

    /// A route with an explicit seed chain.
    pub fn with_seed(seed: Vec<Arc<dyn Dispatcher>>) -> Self {
        Route {
            seed,
            entries: Vec::new(),
        }
    }

    /// Register a dispatcher under a criteria key (e.g. `method.get`,
    /// `accept.application/json`).
    pub fn on(self, criteria: &str, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.on_each(criteria, vec![dispatcher])
    }

    /// Register several dispatchers under one criteria key.
    pub fn on_each(mut self, criteria: &str, dispatchers: Vec<Arc<dyn Dispatcher>>) -> Self {
        self.entries.push((criteria.to_lowercase(), dispatchers));
        self
    }

    /// Exact lookup of a criteria key.
    pub(crate) fn select(&self, key: &str) -> Option<&[Arc<dyn Dispatcher>]> {
        self.entries
            .iter()
            .find(|(criteria, _)| criteria == key)
            .map(|(_, dispatchers)| dispatchers.as_slice())
    }

    /// Iterate entries under a reserved prefix, in definition order,
    /// yielding the key with the prefix stripped.
    pub(crate) fn entries_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [Arc<dyn Dispatcher>])> + 'a {
        self.entries.iter().filter_map(move |(criteria, dispatchers)| {
            criteria
                .strip_prefix(prefix)
                .map(|suffix| (suffix, dispatchers.as_slice()))
        })
    }

    pub(crate) fn seed_chain(&self) -> Chain {
        Chain::seed(self.seed.clone())
    }
}

impl Default for Route {
    fn default() -> Self {
        Route::new()
    }
}

/// The criteria-keyed route table.
pub struct RouteTable {
    routes: HashMap<String, Arc<Route>>,
    named: HashMap<String, String>,
    seperators: String,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable {
            routes: HashMap::new(),
            named: HashMap::new(),
            seperators: "/".to_string(),
        }
    }

    /// Pre-register the named criteria declared in config and adopt its
    /// separator set.
    pub fn from_config(config: &RouterConfig) -> Self {
        let mut table = RouteTable::new();
        if let Some(seperators) = &config.seperators {
            if !seperators.is_empty() {
                table.seperators = seperators.clone();
            }
        }
        for (name, criteria) in &config.routes {
            table.named.insert(name.clone(), criteria.clone());
        }
        table
    }

    /// Define a route directly under a criteria string.
    pub fn define(&mut self, criteria: &str, route: Route) {
        let key = self.normalize(criteria);
        self.routes.insert(key, Arc::new(route));
    }

    /// Attach dispatchers to a route name declared in config.
    pub fn bind(&mut self, name: &str, route: Route) -> Result<(), RoutingError> {
        let criteria = self
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownRoute(name.to_string()))?;
        self.define(&criteria, route);
        Ok(())
    }

    pub(crate) fn resolve(&self, criteria: &str) -> Option<Arc<Route>> {
        self.routes.get(&self.normalize(criteria)).cloned()
    }

    /// Normalize a criteria string: strip trailing slashes, split on the
    /// configured separators, and rejoin into a canonical `/`-separated key.
    pub(crate) fn normalize(&self, criteria: &str) -> String {
        let stripped = criteria_from_path(criteria);
        let segments: Vec<&str> = stripped
            .split(|c: char| self.seperators.contains(c))
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            String::new()
        } else {
            format!("/{}", segments.join("/"))
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable::new()
    }
}
