//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from TOML or JSON files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::load_balancer::{Server, Strategy};
use crate::routing::Filter;

/// Root configuration for the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Middleware handlers run for every matched request, in this order.
    pub middlewares: Vec<MiddlewareKind>,

    /// Filters applied to every route. Stored only, never executed.
    pub global_filters: Vec<Filter>,

    /// Route definitions mapping request paths to targets.
    pub routes: Vec<RouteDefinition>,

    /// Upstream services addressed by `lb://<service>` route URIs.
    pub upstreams: Vec<UpstreamConfig>,

    /// Upstream used when a route names a service with no balancer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_upstream: Option<String>,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A routing rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteDefinition {
    /// Unique route identifier.
    #[serde(default)]
    pub id: String,

    /// Direct backend address, or `lb://<service>`.
    pub uri: String,

    /// Predicates; any single match selects the route.
    #[serde(default)]
    pub predicates: Vec<PredicateDefinition>,

    /// Filters; stored and round-tripped only.
    #[serde(default)]
    pub filters: Vec<Filter>,

    /// Route priority (lower = checked first).
    #[serde(default)]
    pub order: i32,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A predicate as written in configuration: a name plus a free-form payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredicateDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
}

/// An upstream service and its servers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Service name referenced by `lb://<service>`.
    pub service: String,

    /// Selection strategy (default: round_robin).
    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default)]
    pub servers: Vec<Server>,
}

/// Built-in middleware handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareKind {
    /// Structured access log line per request.
    AccessLog,
    /// Request counters, latency histogram and in-flight gauge.
    Metrics,
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for a whole proxied request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Bearer token required on admin requests, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
        }
    }
}
