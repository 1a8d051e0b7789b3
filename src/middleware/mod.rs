//! Middleware chain subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher builds RequestContext (route, start time, request id)
//!     → chain.rs run_pre: handlers in declared order
//!         - a handler returning false short-circuits the pass
//!     → [dispatcher forwards, unless short-circuited]
//!     → chain.rs run_post: handlers whose pre ran, reversed
//!         - a post error goes to that handler's handle_error
//! ```
//!
//! # Design Decisions
//! - The handler list is immutable after construction; no locking per request
//! - Chain progress lives in the request context, not in the chain
//! - Post errors are recovered locally and never abort the backward pass

use std::fmt;

use thiserror::Error;

pub mod access_log;
pub mod chain;
pub mod context;
pub mod metrics;

pub use access_log::AccessLog;
pub use chain::{ChainState, MiddlewareChain, PreOutcome};
pub use context::RequestContext;
pub use metrics::RequestMetrics;

/// Failure reported by a handler's post phase.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("context attribute `{0}` is missing")]
    MissingAttribute(&'static str),

    #[error("{0}")]
    Other(String),
}

/// A pluggable pre/post request handler.
pub trait Middleware: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs before forwarding. Returning `false` stops the forward pass and
    /// skips forwarding; the handler may leave a response in the context.
    fn pre_handle(&self, ctx: &mut RequestContext) -> bool;

    /// Runs after forwarding, in reverse order.
    fn post_handle(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError>;

    /// Receives this handler's own post-phase error.
    fn handle_error(&self, ctx: &mut RequestContext, error: MiddlewareError) {
        tracing::warn!(
            handler = self.name(),
            request_id = %ctx.request_id(),
            error = %error,
            "Middleware post-handle failed"
        );
    }
}
