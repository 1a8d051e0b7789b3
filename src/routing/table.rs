//! Ordered route table.
//!
//! # Responsibilities
//! - Keep routes sorted ascending by `order`
//! - Guarantee route IDs are unique
//! - Answer "first route matching this path"
//!
//! # Design Decisions
//! - Stable sort: equal `order` values keep insertion order
//! - Replacing an existing ID keeps the original insertion slot
//! - First match wins, not best or longest match
//! - Routes are held as `Arc<Route>` so cloning a table for copy-on-write is cheap

use std::sync::Arc;

use crate::config::RouteDefinition;
use crate::routing::route::Route;

/// An immutable-once-published, priority-ordered set of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by inserting every route in order.
    /// A later route with a duplicate ID replaces the earlier one.
    pub fn from_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::new();
        for route in routes {
            table.add_or_replace(route);
        }
        table
    }

    /// Insert a route, replacing any route with the same ID, then re-sort.
    pub fn add_or_replace(&mut self, route: Route) {
        let route = Arc::new(route);
        match self.routes.iter_mut().find(|r| r.id == route.id) {
            Some(slot) => *slot = route,
            None => self.routes.push(route),
        }
        self.routes.sort_by_key(|r| r.order);
    }

    /// Remove a route by ID.
    pub fn remove(&mut self, id: &str) -> Option<Arc<Route>> {
        let index = self.routes.iter().position(|r| r.id == id)?;
        Some(self.routes.remove(index))
    }

    /// Look up a route by ID.
    pub fn get(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.id == id).cloned()
    }

    /// Return the first route whose predicates match the path.
    pub fn find(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.matches(path)).cloned()
    }

    /// Routes in match order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    /// Convert back to the configuration shape, in match order.
    pub fn to_definitions(&self) -> Vec<RouteDefinition> {
        self.routes.iter().map(|r| r.to_definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
