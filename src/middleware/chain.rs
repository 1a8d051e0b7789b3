//! Ordered execution of middleware handlers.
//!
//! # Design Decisions
//! - Flat two-pass loop instead of nested `next()` calls
//! - The cursor counts handlers whose pre phase ran, so the backward pass
//!   visits exactly those, including one that short-circuited
//! - State transitions: Idle → RunningPre → (AllPassed | ShortCircuited)
//!   → RunningPost → Done

use std::sync::Arc;

use crate::config::MiddlewareKind;
use crate::middleware::access_log::AccessLog;
use crate::middleware::context::RequestContext;
use crate::middleware::metrics::RequestMetrics;
use crate::middleware::Middleware;

/// Progress of a chain over one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainState {
    #[default]
    Idle,
    RunningPre,
    AllPassed,
    ShortCircuited,
    RunningPost,
    Done,
}

/// Result of the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreOutcome {
    /// Every handler allowed the request.
    Passed,
    /// A handler stopped the pass; the request must not be forwarded.
    ShortCircuited,
}

/// Chain position stored in the request context.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChainCursor {
    pub(crate) state: ChainState,
    /// Number of handlers whose pre phase has been entered.
    pub(crate) entered: usize,
}

/// Immutable list of handlers shared by every request.
#[derive(Debug, Clone)]
pub struct MiddlewareChain {
    handlers: Arc<[Arc<dyn Middleware>]>,
}

impl MiddlewareChain {
    pub fn new(handlers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    /// Build the chain of built-in handlers named in configuration.
    pub fn from_kinds(kinds: &[MiddlewareKind]) -> Self {
        let handlers = kinds
            .iter()
            .map(|kind| -> Arc<dyn Middleware> {
                match kind {
                    MiddlewareKind::AccessLog => Arc::new(AccessLog),
                    MiddlewareKind::Metrics => Arc::new(RequestMetrics),
                }
            })
            .collect();
        Self::new(handlers)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in declared order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Forward pass. Runs each handler's pre phase in declared order until
    /// one returns `false`.
    pub fn run_pre(&self, ctx: &mut RequestContext) -> PreOutcome {
        match ctx.cursor.state {
            ChainState::Idle => {}
            ChainState::ShortCircuited => return PreOutcome::ShortCircuited,
            state => {
                tracing::warn!(request_id = %ctx.request_id(), ?state, "Forward pass already ran");
                return PreOutcome::Passed;
            }
        }

        ctx.cursor.state = ChainState::RunningPre;
        for handler in self.handlers.iter() {
            ctx.cursor.entered += 1;
            if !handler.pre_handle(ctx) {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    handler = handler.name(),
                    "Middleware short-circuited request"
                );
                ctx.cursor.state = ChainState::ShortCircuited;
                return PreOutcome::ShortCircuited;
            }
        }

        ctx.cursor.state = ChainState::AllPassed;
        PreOutcome::Passed
    }

    /// Backward pass over every handler whose pre phase ran, newest first.
    pub fn run_post(&self, ctx: &mut RequestContext) {
        if ctx.cursor.state == ChainState::Done {
            return;
        }

        ctx.cursor.state = ChainState::RunningPost;
        while ctx.cursor.entered > 0 {
            ctx.cursor.entered -= 1;
            let handler = &self.handlers[ctx.cursor.entered];
            if let Err(error) = handler.post_handle(ctx) {
                handler.handle_error(ctx, error);
            }
        }
        ctx.cursor.state = ChainState::Done;
    }

    /// Both passes back to back.
    pub fn execute(&self, ctx: &mut RequestContext) -> PreOutcome {
        let outcome = self.run_pre(ctx);
        self.run_post(ctx);
        outcome
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
