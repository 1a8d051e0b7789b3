//! Compiled route definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RouteDefinition;
use crate::routing::matcher::Matcher;
use crate::routing::predicate::{Predicate, PredicateError, PredicateRegistry};

/// URI prefix marking a route whose backend is chosen by a load balancer.
pub const LOAD_BALANCED_PREFIX: &str = "lb://";

/// A filter attached to a route.
///
/// Filters are accepted, stored and written back to configuration, but the
/// dispatcher never executes them. Filter execution is not part of the
/// dispatch pipeline; cross-cutting behavior belongs in middleware.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Filter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

/// Where a route sends its traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget<'a> {
    /// Forward to this address verbatim.
    Direct(&'a str),
    /// Ask the load balancer of this service for an address.
    LoadBalanced(&'a str),
}

/// A routing rule.
///
/// Routes are immutable once published; edits build a new `Route`.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub uri: String,
    pub predicates: Vec<Predicate>,
    pub filters: Vec<Filter>,
    /// Lower values are matched first.
    pub order: i32,
    pub metadata: HashMap<String, String>,
}

impl Route {
    /// Create a route with no predicates (it matches nothing until one is added).
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            predicates: Vec::new(),
            filters: Vec::new(),
            order: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Compile a configuration entry.
    pub fn from_definition(
        definition: &RouteDefinition,
        registry: &PredicateRegistry,
    ) -> Result<Self, PredicateError> {
        let predicates = definition
            .predicates
            .iter()
            .map(|p| registry.compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: definition.id.clone(),
            uri: definition.uri.clone(),
            predicates,
            filters: definition.filters.clone(),
            order: definition.order,
            metadata: definition.metadata.clone(),
        })
    }

    /// Convert back to the configuration shape.
    pub fn to_definition(&self) -> RouteDefinition {
        RouteDefinition {
            id: self.id.clone(),
            uri: self.uri.clone(),
            predicates: self.predicates.iter().map(Predicate::to_definition).collect(),
            filters: self.filters.clone(),
            order: self.order,
            metadata: self.metadata.clone(),
        }
    }

    /// Classify the route URI.
    pub fn target(&self) -> RouteTarget<'_> {
        match self.uri.strip_prefix(LOAD_BALANCED_PREFIX) {
            Some(service) => RouteTarget::LoadBalanced(service),
            None => RouteTarget::Direct(&self.uri),
        }
    }

    /// Predicates are OR-combined: any single match qualifies the route.
    pub fn matches(&self, path: &str) -> bool {
        self.predicates.iter().any(|p| p.matches(path))
    }
}
