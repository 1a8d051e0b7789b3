//! Forwarding of dispatched requests to a resolved backend.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target (scheme, authority, joined path, merged query)
//! - Strip hop-by-hop headers in both directions
//! - Enforce the request deadline
//! - Translate failures: 502 on upstream errors, 504 on deadline expiry
//!
//! # Design Decisions
//! - The transport is a trait so the dispatcher can be driven without sockets
//! - Bodies stream through; nothing is buffered
//! - The deadline covers the wait for response headers, not body streaming

use std::fmt;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Forwarding failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("Upstream did not respond before the deadline")]
    Timeout,

    #[error("Invalid upstream URI `{uri}`: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

impl TransportError {
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::Upstream(_) => StatusCode::BAD_GATEWAY,
            TransportError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            TransportError::InvalidUri { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Upstream(_) => "upstream",
            TransportError::Timeout => "timeout",
            TransportError::InvalidUri { .. } => "invalid_uri",
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response<Body> {
        let message = match self {
            TransportError::Upstream(_) => "Upstream request failed",
            TransportError::Timeout => "Upstream request timed out",
            TransportError::InvalidUri { .. } => "Invalid upstream address",
        };
        (self.status(), message).into_response()
    }
}

/// Sends a request to a resolved target.
pub trait ProxyTransport: Send + Sync + fmt::Debug {
    fn forward(
        &self,
        target: Url,
        request: Request<Body>,
        deadline: Option<Instant>,
    ) -> BoxFuture<'static, Result<Response<Body>, TransportError>>;
}

/// Headers that describe a single connection and must not be forwarded.
static HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped too.
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Rewrite an inbound URI onto the target.
///
/// Paths are joined with exactly one slash between them; when both sides
/// carry a query they are concatenated with `&`.
pub fn upstream_uri(target: &Url, original: &Uri) -> Result<Uri, TransportError> {
    let host = target.host_str().unwrap_or_default();
    let authority = match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let base = target.path().trim_end_matches('/');
    let path = original.path();
    let joined = if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };

    let query = match (target.query().filter(|q| !q.is_empty()), original.query()) {
        (Some(a), Some(b)) => format!("?{a}&{b}"),
        (Some(a), None) => format!("?{a}"),
        (None, Some(b)) => format!("?{b}"),
        (None, None) => String::new(),
    };

    let uri = format!("{}://{authority}{joined}{query}", target.scheme());
    uri.parse::<Uri>()
        .map_err(|source| TransportError::InvalidUri { uri, source })
}

/// Transport backed by the hyper-util pooled client.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
}

impl HyperTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

impl ProxyTransport for HyperTransport {
    fn forward(
        &self,
        target: Url,
        request: Request<Body>,
        deadline: Option<Instant>,
    ) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            parts.uri = upstream_uri(&target, &parts.uri)?;
            strip_hop_by_hop(&mut parts.headers);
            // Let the client derive Host from the rewritten URI.
            parts.headers.remove(header::HOST);

            let pending = client.request(Request::from_parts(parts, body));
            let response: Response<Incoming> = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, pending)
                    .await
                    .map_err(|_| TransportError::Timeout)??,
                None => pending.await?,
            };

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}
