//! Request gateway library.
//!
//! Route matching with priority ordering, a pre/post middleware chain and
//! pluggable load balancing in front of a streaming HTTP proxy.

// Dispatch core
pub mod dispatch;
pub mod load_balancer;
pub mod middleware;
pub mod routing;

// Surfaces
pub mod admin;
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use dispatch::Dispatcher;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
