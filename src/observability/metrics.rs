//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, errors, in-flight)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-route and aggregate metrics
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency by method, route
//! - `gateway_requests_in_flight` (gauge): requests between pre and post
//! - `gateway_route_hits_total` (counter): matches per route
//! - `gateway_errors_total` (counter): handler and forwarding errors
//! - `gateway_dispatch_failures_total` (counter): 404/503/500 decided by the gateway
//! - `gateway_backend_requests_total` (counter): forwards by chosen backend and route
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The exporter is only installed when enabled in configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, route: &str, status: u16, elapsed: Duration) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_route_hit(route: &str) {
    counter!("gateway_route_hits_total", "route" => route.to_string()).increment(1);
}

pub fn request_started() {
    gauge!("gateway_requests_in_flight").increment(1.0);
}

pub fn request_finished() {
    gauge!("gateway_requests_in_flight").decrement(1.0);
}

pub fn record_error(kind: &'static str, route: &str) {
    counter!("gateway_errors_total", "kind" => kind, "route" => route.to_string()).increment(1);
}

pub fn record_dispatch_failure(kind: &'static str) {
    counter!("gateway_dispatch_failures_total", "kind" => kind).increment(1);
}

/// Count a forward to the backend chosen for a route.
pub fn record_backend_request(backend_url: &str, route: &str) {
    counter!(
        "gateway_backend_requests_total",
        "backend_url" => backend_url.to_string(),
        "route_id" => route.to_string()
    )
    .increment(1);
}
