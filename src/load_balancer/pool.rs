//! Upstream pool management.
//!
//! # Responsibilities
//! - Hold one load balancer per upstream service
//! - Resolve a service name (or the shared default) to a server
//! - Reconcile the balancers with a reloaded upstream list

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use crate::config::UpstreamConfig;
use crate::load_balancer::{LoadBalancer, Server};

/// Manages the load balancers of every upstream service.
#[derive(Debug, Default)]
pub struct UpstreamPool {
    /// Map of service name -> balancer.
    balancers: DashMap<String, Arc<dyn LoadBalancer>>,
    /// Service used when a route names a service with no balancer.
    default_service: ArcSwapOption<String>,
}

impl UpstreamPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool from configuration.
    pub fn from_config(upstreams: &[UpstreamConfig], default_service: Option<String>) -> Self {
        let pool = Self {
            balancers: DashMap::new(),
            default_service: ArcSwapOption::from(default_service.map(Arc::new)),
        };
        for upstream in upstreams {
            pool.insert(
                upstream.service.clone(),
                upstream.strategy.build_with(upstream.servers.iter().cloned()),
            );
        }
        pool
    }

    /// Register (or replace) the balancer of a service.
    pub fn insert(&self, service: impl Into<String>, balancer: Arc<dyn LoadBalancer>) {
        self.balancers.insert(service.into(), balancer);
    }

    /// Remove the balancer of a service.
    pub fn remove(&self, service: &str) -> Option<Arc<dyn LoadBalancer>> {
        self.balancers.remove(service).map(|(_, lb)| lb)
    }

    /// The balancer of a service, if registered.
    pub fn get(&self, service: &str) -> Option<Arc<dyn LoadBalancer>> {
        self.balancers.get(service).map(|entry| entry.value().clone())
    }

    /// The balancer for a service, falling back to the shared default.
    pub fn resolve(&self, service: &str) -> Option<Arc<dyn LoadBalancer>> {
        self.get(service).or_else(|| {
            let fallback = self.default_service.load_full()?;
            tracing::debug!(service, fallback = %fallback, "Service has no balancer, using default upstream");
            self.get(&fallback)
        })
    }

    /// Choose a server for a service.
    pub fn choose(&self, service: &str) -> Option<Server> {
        let Some(balancer) = self.resolve(service) else {
            tracing::debug!(service, "Service not found in upstream pool");
            return None;
        };

        let servers = balancer.servers();
        let chosen = balancer.choose_server(&servers);
        if chosen.is_none() {
            tracing::debug!(service, server_count = servers.len(), "No servers registered for service");
        }
        chosen
    }

    /// Registered service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.balancers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn default_service(&self) -> Option<String> {
        self.default_service.load_full().map(|s| s.as_ref().clone())
    }

    /// Change the shared default service.
    pub fn set_default_service(&self, service: Option<String>) {
        self.default_service.store(service.map(Arc::new));
    }

    /// Reconcile with a reloaded upstream list.
    ///
    /// A balancer whose strategy is unchanged is kept and its server set is
    /// edited in place, so cursor state survives the reload. A changed
    /// strategy gets a fresh balancer. Services no longer listed are dropped.
    pub fn sync(&self, upstreams: &[UpstreamConfig]) {
        let wanted: HashSet<&str> = upstreams.iter().map(|u| u.service.as_str()).collect();
        self.balancers.retain(|service, _| wanted.contains(service.as_str()));

        for upstream in upstreams {
            match self.get(&upstream.service) {
                Some(current) if current.strategy() == upstream.strategy => {
                    sync_servers(current.as_ref(), &upstream.servers);
                }
                _ => {
                    tracing::info!(
                        service = %upstream.service,
                        strategy = %upstream.strategy,
                        servers = upstream.servers.len(),
                        "Creating upstream balancer"
                    );
                    self.insert(
                        upstream.service.clone(),
                        upstream.strategy.build_with(upstream.servers.iter().cloned()),
                    );
                }
            }
        }
    }
}

/// Upserts come before removals so a concurrent `choose` never sees an
/// empty set while one list replaces another.
fn sync_servers(balancer: &dyn LoadBalancer, servers: &[Server]) {
    for server in servers {
        balancer.add_server(server.clone());
    }
    let wanted: HashSet<&str> = servers.iter().map(|s| s.address.as_str()).collect();
    for current in balancer.servers() {
        if !wanted.contains(current.address.as_str()) {
            balancer.remove_server(&current.address);
        }
    }
}
