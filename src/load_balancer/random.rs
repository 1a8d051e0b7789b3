//! Random load balancing strategy.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::server::{unique_by_address, Server, SharedServerSet};
use crate::load_balancer::{LoadBalancer, Strategy};

/// Uniform random selector with its own random source.
#[derive(Debug)]
pub struct Random {
    servers: SharedServerSet,
    rng: Mutex<StdRng>,
}

impl Random {
    /// Create a selector seeded from the operating system.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a selector with a fixed seed (reproducible sequences).
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            servers: SharedServerSet::new(),
            rng: Mutex::new(rng),
        }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for Random {
    fn strategy(&self) -> Strategy {
        Strategy::Random
    }

    fn choose_server(&self, servers: &[Server]) -> Option<Server> {
        let unique = unique_by_address(servers);
        if unique.is_empty() {
            return None;
        }

        let index = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..unique.len());
        Some(unique[index].clone())
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
