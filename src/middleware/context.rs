//! Per-request state shared by the dispatcher and middleware handlers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, Response};

use crate::middleware::chain::{ChainCursor, ChainState};
use crate::routing::Route;

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Everything known about one request while it moves through the gateway.
///
/// Owned by the task serving the request; never shared across requests.
pub struct RequestContext {
    request: Option<Request<Body>>,
    response: Option<Response<Body>>,
    route: Option<Arc<Route>>,
    attributes: HashMap<String, Box<dyn Any + Send + Sync>>,
    start: Instant,
    original_url: String,
    method: Method,
    path: String,
    request_id: String,
    deadline: Option<tokio::time::Instant>,
    pub(crate) cursor: ChainCursor,
}

impl RequestContext {
    /// Capture a request. The request id comes from `x-request-id` when the
    /// client (or an outer layer) supplied one, otherwise a fresh UUID.
    pub fn new(request: Request<Body>) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            original_url: request.uri().to_string(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            request_id,
            request: Some(request),
            response: None,
            route: None,
            attributes: HashMap::new(),
            start: Instant::now(),
            deadline: None,
            cursor: ChainCursor::default(),
        }
    }

    pub fn with_route(mut self, route: Arc<Route>) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<tokio::time::Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// The inbound request, until the dispatcher takes it for forwarding.
    pub fn request(&self) -> Option<&Request<Body>> {
        self.request.as_ref()
    }

    pub fn request_mut(&mut self) -> Option<&mut Request<Body>> {
        self.request.as_mut()
    }

    pub fn take_request(&mut self) -> Option<Request<Body>> {
        self.request.take()
    }

    pub fn response(&self) -> Option<&Response<Body>> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response<Body>> {
        self.response.as_mut()
    }

    pub fn set_response(&mut self, response: Response<Body>) {
        self.response = Some(response);
    }

    pub fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    /// Matched route id, or `"none"`.
    pub fn route_id(&self) -> &str {
        self.route.as_deref().map_or("none", |r| r.id.as_str())
    }

    /// Store an attribute, replacing any previous value under the key.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    /// Read an attribute. `None` if absent or stored with another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key)?.downcast_ref::<T>()
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Deadline for the whole request; only the transport enforces it.
    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }

    pub fn chain_state(&self) -> ChainState {
        self.cursor.state
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("original_url", &self.original_url)
            .field("route", &self.route_id())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("has_response", &self.response.is_some())
            .field("chain_state", &self.cursor.state)
            .finish()
    }
}
