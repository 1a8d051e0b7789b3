//! Structured access log handler.

use crate::middleware::context::RequestContext;
use crate::middleware::{Middleware, MiddlewareError};

/// Emits one `info` event per completed request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessLog;

impl Middleware for AccessLog {
    fn name(&self) -> &str {
        "access_log"
    }

    fn pre_handle(&self, ctx: &mut RequestContext) -> bool {
        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            url = %ctx.original_url(),
            route = %ctx.route_id(),
            "Request received"
        );
        true
    }

    fn post_handle(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        let status = ctx.response().map_or(0, |r| r.status().as_u16());
        tracing::info!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            route = %ctx.route_id(),
            status,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Request completed"
        );
        Ok(())
    }
}
