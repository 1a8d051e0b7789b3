//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::server::{unique_by_address, Server, SharedServerSet};
use crate::load_balancer::{LoadBalancer, Strategy};

/// Round-robin selector.
/// Stores an internal counter to rotate through servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    servers: SharedServerSet,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::RoundRobin
    }

    fn choose_server(&self, servers: &[Server]) -> Option<Server> {
        let unique = unique_by_address(servers);
        if unique.is_empty() {
            return None;
        }

        // fetch_add hands every caller a distinct cursor value.
        let cursor = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(unique[cursor % unique.len()].clone())
    }

    fn add_server(&self, server: Server) {
        self.servers.upsert(server);
    }

    fn remove_server(&self, address: &str) -> Option<Server> {
        self.servers.remove(address)
    }

    fn update_server(&self, server: Server) -> Option<Server> {
        self.servers.update(server)
    }

    fn servers(&self) -> Vec<Server> {
        self.servers.snapshot()
    }
}
