//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched with lb://<service>
//!     → pool.rs (look up the service's balancer)
//!     → LoadBalancer::servers() (independent snapshot)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through servers)
//!         - random.rs (uniform pick)
//!         - weighted.rs (cycle through cumulative weight ranges)
//!     → Return chosen Server or None
//! ```
//!
//! # Design Decisions
//! - One balancer instance per upstream service, never shared across services
//! - Selection is defined purely over the list it is given (no health filtering)
//! - Duplicate addresses are coalesced before selection
//! - Strategy state (cursor, RNG) is synchronized inside each balancer

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod pool;
pub mod random;
pub mod round_robin;
pub mod server;
pub mod weighted;

pub use pool::UpstreamPool;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use server::Server;
pub use weighted::WeightedRoundRobin;

/// Trait for load balancing strategies.
///
/// Every method may be called concurrently from many request tasks.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// The strategy implemented by this balancer.
    fn strategy(&self) -> Strategy;

    /// Pick one server from the given list.
    fn choose_server(&self, servers: &[Server]) -> Option<Server>;

    /// Track a server; a known address is updated rather than duplicated.
    fn add_server(&self, server: Server);

    /// Stop tracking a server, returning it if it was known.
    fn remove_server(&self, address: &str) -> Option<Server>;

    /// Replace a tracked server, returning the previous entry.
    fn update_server(&self, server: Server) -> Option<Server>;

    /// Independent copy of the tracked servers.
    fn servers(&self) -> Vec<Server>;

    /// Pick one of the tracked servers.
    fn next_server(&self) -> Option<Server> {
        self.choose_server(&self.servers())
    }
}

/// Available selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
    WeightedRoundRobin,
}

impl Strategy {
    /// Create an empty balancer for this strategy.
    pub fn build(self) -> Arc<dyn LoadBalancer> {
        match self {
            Strategy::RoundRobin => Arc::new(RoundRobin::new()),
            Strategy::Random => Arc::new(Random::new()),
            Strategy::WeightedRoundRobin => Arc::new(WeightedRoundRobin::new()),
        }
    }

    /// Create a balancer already tracking the given servers.
    pub fn build_with(self, servers: impl IntoIterator<Item = Server>) -> Arc<dyn LoadBalancer> {
        let lb = self.build();
        for server in servers {
            lb.add_server(server);
        }
        lb
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round_robin",
            Strategy::Random => "random",
            Strategy::WeightedRoundRobin => "weighted_round_robin",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_matches_strategy() {
        for strategy in [Strategy::RoundRobin, Strategy::Random, Strategy::WeightedRoundRobin] {
            assert_eq!(strategy.build().strategy(), strategy);
        }
    }

    #[test]
    fn test_build_with_coalesces_addresses() {
        let lb = Strategy::WeightedRoundRobin.build_with([
            Server::new("a", 1),
            Server::new("a", 4),
            Server::new("b", 2),
        ]);
        assert_eq!(lb.servers(), vec![Server::new("a", 4), Server::new("b", 2)]);
    }

    #[test]
    fn test_strategy_names() {
        let parsed: Strategy = serde_json::from_str(r#""weighted_round_robin""#).unwrap();
        assert_eq!(parsed, Strategy::WeightedRoundRobin);
        assert_eq!(Strategy::default().to_string(), "round_robin");
        assert!(serde_json::from_str::<Strategy>(r#""least_conn""#).is_err());
    }
}
