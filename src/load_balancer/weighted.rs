//! Weighted round-robin load balancing strategy.
//!
//! # Algorithm
//! ```text
//! servers  a(3) b(1) c(2)       total = 6
//! ranges   [0,3) [3,4) [4,6)
//! cursor   0 1 2 3 4 5 0 1 ...
//! picks    a a a b c c a a ...
//! ```
//!
//! # Design Decisions
//! - The total weight used for selection is recomputed from the list passed in,
//!   so a caller's snapshot can never drift from the cumulative ranges
//! - The tracked server set keeps its own total, updated on every mutation
//! - All-zero weights fall back to plain round-robin indexing

use std::sync::{Mutex, PoisonError};

use crate::load_balancer::server::{unique_by_address, Server, SharedServerSet};
use crate::load_balancer::{LoadBalancer, Strategy};

/// Deterministic weighted round-robin selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    servers: SharedServerSet,
    cursor: Mutex<u64>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of weights across the tracked server set.
    pub fn total_weight(&self) -> u64 {
        self.servers.total_weight()
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn strategy(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }

    fn choose_server(&self, servers: &[Server]) -> Option<Server> {
        let unique = unique_by_address(servers);
        if unique.is_empty() {
            return None;
        }

        let total: u64 = unique.iter().map(|s| u64::from(s.weight)).sum();

        let point = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            if total == 0 {
                let index = (*cursor % unique.len() as u64) as usize;
                *cursor = cursor.wrapping_add(1);
                return Some(unique[index].clone());
            }
            let point = *cursor % total;
            *cursor = (point + 1) % total;
            point
        };

        let mut cumulative = 0u64;
        for server in &unique {
            cumulative += u64::from(server.weight);
            if point < cumulative {
                return Some((*server).clone());
            }
        }
        // point < total, so the loop always returns.
        unique.first().map(|s| (*s).clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn count_picks(lb: &WeightedRoundRobin, servers: &[Server], calls: usize) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for _ in 0..calls {
            let server = lb.choose_server(servers).unwrap();
            *counts.entry(server.address).or_default() += 1;
        }
        counts
    }

    #[test]
    fn test_empty_list_returns_none() {
        let lb = WeightedRoundRobin::new();
        assert!(lb.choose_server(&[]).is_none());
    }

    #[test]
    fn test_exact_proportions_over_total_weight() {
        let lb = WeightedRoundRobin::new();
        let servers = vec![
            Server::new("a", 3),
            Server::new("b", 1),
            Server::new("c", 2),
        ];

        let counts = count_picks(&lb, &servers, 6);
        assert_eq!(counts["a"], 3);
        assert_eq!(counts["b"], 1);
        assert_eq!(counts["c"], 2);

        // The next window of W calls repeats the same distribution.
        let counts = count_picks(&lb, &servers, 6);
        assert_eq!(counts["a"], 3);
        assert_eq!(counts["b"], 1);
        assert_eq!(counts["c"], 2);
    }

    #[test]
    fn test_selection_follows_cumulative_ranges() {
        let lb = WeightedRoundRobin::new();
        let servers = vec![Server::new("a", 2), Server::new("b", 1)];
        let picks: Vec<String> = (0..6).map(|_| lb.choose_server(&servers).unwrap().address).collect();
        assert_eq!(picks, vec!["a", "a", "b", "a", "a", "b"]);
    }

    #[test]
    fn test_zero_weight_server_is_skipped() {
        let lb = WeightedRoundRobin::new();
        let servers = vec![Server::new("idle", 0), Server::new("busy", 4)];
        let counts = count_picks(&lb, &servers, 8);
        assert_eq!(counts.get("idle"), None);
        assert_eq!(counts["busy"], 8);
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_round_robin() {
        let lb = WeightedRoundRobin::new();
        let servers = vec![Server::new("a", 0), Server::new("b", 0)];
        let picks: Vec<String> = (0..4).map(|_| lb.choose_server(&servers).unwrap().address).collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_duplicates_do_not_inflate_weight() {
        let lb = WeightedRoundRobin::new();
        let servers = vec![
            Server::new("a", 1),
            Server::new("a", 5),
            Server::new("b", 1),
        ];
        let counts = count_picks(&lb, &servers, 2);
        assert_eq!(counts["a"], 1);
        assert_eq!(counts["b"], 1);
    }

    #[test]
    fn test_total_weight_is_tracked_on_mutation() {
        let lb = WeightedRoundRobin::new();
        lb.add_server(Server::new("a", 3));
        lb.add_server(Server::new("b", 2));
        assert_eq!(lb.total_weight(), 5);

        lb.update_server(Server::new("a", 1));
        assert_eq!(lb.total_weight(), 3);

        lb.remove_server("b");
        assert_eq!(lb.total_weight(), 1);
    }

    #[test]
    fn test_shrinking_snapshot_uses_its_own_total() {
        let lb = WeightedRoundRobin::new();
        let big = vec![Server::new("a", 5), Server::new("b", 5)];
        for _ in 0..7 {
            lb.choose_server(&big);
        }

        // The cursor (7) is beyond the new total (3); selection still
        // distributes exactly by weight over the next window.
        let small = vec![Server::new("a", 2), Server::new("b", 1)];
        let counts = count_picks(&lb, &small, 3);
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);
    }
}
