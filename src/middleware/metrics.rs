//! Request metrics handler.

use std::time::Instant;

use crate::middleware::context::RequestContext;
use crate::middleware::{Middleware, MiddlewareError};
use crate::observability::metrics;

/// Attribute written in the pre phase and read back in the post phase.
pub const START_TIME: &str = "start_time";

/// Records request counters, latency and the in-flight gauge.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestMetrics;

impl Middleware for RequestMetrics {
    fn name(&self) -> &str {
        "metrics"
    }

    fn pre_handle(&self, ctx: &mut RequestContext) -> bool {
        ctx.insert(START_TIME, Instant::now());
        metrics::request_started();
        metrics::record_route_hit(ctx.route_id());
        true
    }

    fn post_handle(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        metrics::request_finished();

        let start = *ctx
            .get::<Instant>(START_TIME)
            .ok_or(MiddlewareError::MissingAttribute(START_TIME))?;
        let status = ctx.response().map_or(0, |r| r.status().as_u16());

        metrics::record_request(
            ctx.method().as_str(),
            ctx.route_id(),
            status,
            start.elapsed(),
        );
        Ok(())
    }

    fn handle_error(&self, ctx: &mut RequestContext, error: MiddlewareError) {
        tracing::warn!(
            request_id = %ctx.request_id(),
            route = %ctx.route_id(),
            error = %error,
            "Request metrics not recorded"
        );
        metrics::record_error("middleware", ctx.route_id());
    }
}
