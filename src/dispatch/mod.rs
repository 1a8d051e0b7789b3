//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (axum handler)
//!     → dispatcher.rs: Router::find(path)
//!         - no match → 404, chain not run
//!     → RequestContext (route, start time, request id, deadline)
//!     → MiddlewareChain::run_pre
//!         - short-circuit → handler response or 403
//!     → resolve target (direct URI or lb://service via UpstreamPool)
//!         - no server → 503, unparseable target → 500
//!     → transport.rs: ProxyTransport::forward
//!     → MiddlewareChain::run_post
//!     → Response to client
//! ```

pub mod dispatcher;
pub mod error;
pub mod transport;

pub use dispatcher::{parse_target, Dispatcher};
pub use error::DispatchError;
pub use transport::{HyperTransport, ProxyTransport, TransportError};
