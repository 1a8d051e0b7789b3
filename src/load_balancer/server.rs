//! Backend server descriptors and the tracked server set.
//!
//! # Responsibilities
//! - Represent a single backend server (address + weight)
//! - Keep a per-balancer server list keyed by address
//! - Track the total weight incrementally on every mutation
//!
//! # Design Decisions
//! - The address is the identity key; adding a known address updates it
//! - Readers always get an independent copy of the list
//! - Lock poisoning is recovered from; the list is never left half-written

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Server {
    /// Backend address, e.g. `http://10.0.0.5:8080` or `10.0.0.5:8080`.
    pub address: String,
    /// Relative weight for weighted selection.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl Server {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

/// Coalesce duplicate addresses, keeping the first occurrence and input order.
pub fn unique_by_address(servers: &[Server]) -> Vec<&Server> {
    let mut seen = HashSet::with_capacity(servers.len());
    servers
        .iter()
        .filter(|s| seen.insert(s.address.as_str()))
        .collect()
}

/// A server list with an incrementally maintained weight sum.
#[derive(Debug, Clone, Default)]
pub struct ServerSet {
    servers: Vec<Server>,
    total_weight: u64,
}

impl ServerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a server, or update it in place if its address is already known.
    pub fn upsert(&mut self, server: Server) {
        if self.update(server.clone()).is_none() {
            self.total_weight += u64::from(server.weight);
            self.servers.push(server);
        }
    }

    /// Replace a known server, returning the previous entry.
    pub fn update(&mut self, server: Server) -> Option<Server> {
        let slot = self.servers.iter_mut().find(|s| s.address == server.address)?;
        self.total_weight = self.total_weight - u64::from(slot.weight) + u64::from(server.weight);
        Some(std::mem::replace(slot, server))
    }

    /// Remove a server by address.
    pub fn remove(&mut self, address: &str) -> Option<Server> {
        let index = self.servers.iter().position(|s| s.address == address)?;
        let removed = self.servers.remove(index);
        self.total_weight -= u64::from(removed.weight);
        Some(removed)
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// A `ServerSet` behind a read-write lock, shared by every balancer strategy.
#[derive(Debug, Default)]
pub struct SharedServerSet {
    inner: RwLock<ServerSet>,
}

impl SharedServerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, server: Server) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(server);
    }

    pub fn update(&self, server: Server) -> Option<Server> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(server)
    }

    pub fn remove(&self, address: &str) -> Option<Server> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
    }

    /// Independent copy of the current list.
    pub fn snapshot(&self) -> Vec<Server> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .servers()
            .to_vec()
    }

    pub fn total_weight(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .total_weight()
    }
}
