//! Route lookup against the published route table.
//!
//! # Responsibilities
//! - Hold the live route table snapshot
//! - Look up the matching route for a request path
//! - Publish reloads and single-route edits atomically
//!
//! # Design Decisions
//! - Readers load an `Arc<RouteTable>` and never lock
//! - Bulk reload builds the new table off to the side, then swaps it in
//! - Single-route edits are copy-on-write through `ArcSwap::rcu`
//! - Explicit no-match (`None`) rather than a silent default

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::RouteDefinition;
use crate::routing::predicate::{PredicateError, PredicateRegistry};
use crate::routing::route::Route;
use crate::routing::table::RouteTable;

/// Thread-safe holder of the active route table.
#[derive(Debug)]
pub struct Router {
    table: ArcSwap<RouteTable>,
}

impl Router {
    /// Create a router publishing the given table.
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Compile route definitions and publish them as the initial table.
    pub fn from_config(
        definitions: &[RouteDefinition],
        registry: &PredicateRegistry,
    ) -> Result<Self, PredicateError> {
        Ok(Self::new(compile_table(definitions, registry)?))
    }

    /// Find the first matching route in the current snapshot.
    pub fn find(&self, path: &str) -> Option<Arc<Route>> {
        self.table.load().find(path)
    }

    /// The current snapshot. It stays valid even if a reload happens later.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Replace every route at once.
    pub fn reload(&self, routes: Vec<Route>) {
        let table = RouteTable::from_routes(routes);
        tracing::info!(routes = table.len(), "Publishing route table");
        self.table.store(Arc::new(table));
    }

    /// Compile definitions and replace every route at once.
    /// On a compile error the current table stays published.
    pub fn reload_from_config(
        &self,
        definitions: &[RouteDefinition],
        registry: &PredicateRegistry,
    ) -> Result<(), PredicateError> {
        let table = compile_table(definitions, registry)?;
        tracing::info!(routes = table.len(), "Publishing route table");
        self.table.store(Arc::new(table));
        Ok(())
    }

    /// Insert or replace a single route in the live table.
    pub fn add_or_replace(&self, route: Route) {
        let route = Arc::new(route);
        self.table.rcu(|current| {
            let mut next = RouteTable::clone(current);
            next.add_or_replace(Route::clone(&route));
            next
        });
    }

    /// Remove a single route from the live table.
    pub fn remove(&self, id: &str) -> Option<Arc<Route>> {
        let mut removed = None;
        self.table.rcu(|current| {
            let mut next = RouteTable::clone(current);
            removed = next.remove(id);
            next
        });
        removed
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouteTable::new())
    }
}

fn compile_table(
    definitions: &[RouteDefinition],
    registry: &PredicateRegistry,
) -> Result<RouteTable, PredicateError> {
    let routes = definitions
        .iter()
        .map(|d| Route::from_definition(d, registry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RouteTable::from_routes(routes))
}
