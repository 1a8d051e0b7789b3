//! Per-request orchestration.
//!
//! # Responsibilities
//! - Match the request path against the live route table
//! - Run the middleware chain around forwarding
//! - Resolve the backend address for the matched route
//! - Hand the request to the transport
//!
//! # Design Decisions
//! - Every collaborator is injected; the dispatcher owns no global state
//! - Post handlers run after forwarding so they observe the final response
//! - Gateway-decided failures still pass through the backward pass
//! - The context is owned by a guard that runs the backward pass on drop,
//!   so a cancelled request still reaches every entered post handler

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use url::Url;

use crate::dispatch::error::DispatchError;
use crate::dispatch::transport::ProxyTransport;
use crate::load_balancer::UpstreamPool;
use crate::middleware::context::X_REQUEST_ID;
use crate::middleware::{ChainState, MiddlewareChain, PreOutcome, RequestContext};
use crate::observability::metrics;
use crate::routing::{Route, RouteTarget, Router};

/// Parse a backend address into a URL. Scheme-less addresses are HTTP.
pub fn parse_target(address: &str) -> Result<Url, DispatchError> {
    let candidate = if address.contains("://") {
        Cow::Borrowed(address)
    } else {
        Cow::Owned(format!("http://{address}"))
    };

    let url = Url::parse(&candidate).map_err(|source| DispatchError::TargetUnparseable {
        target: address.to_string(),
        source,
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(DispatchError::TargetUnparseable {
            target: address.to_string(),
            source: url::ParseError::EmptyHost,
        }),
    }
}

/// Drives one request through route matching, middleware and forwarding.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    chain: MiddlewareChain,
    pool: Arc<UpstreamPool>,
    transport: Arc<dyn ProxyTransport>,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        chain: MiddlewareChain,
        pool: Arc<UpstreamPool>,
        transport: Arc<dyn ProxyTransport>,
    ) -> Self {
        Self {
            router,
            chain,
            pool,
            transport,
            request_timeout: None,
        }
    }

    /// Give every forwarded request a deadline this far in the future.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn pool(&self) -> &Arc<UpstreamPool> {
        &self.pool
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Backend URL for a route.
    pub fn resolve_target(&self, route: &Route) -> Result<Url, DispatchError> {
        match route.target() {
            RouteTarget::LoadBalanced(service) => {
                let server = self.pool.choose(service).ok_or_else(|| {
                    DispatchError::NoServerAvailable {
                        service: service.to_string(),
                    }
                })?;
                parse_target(&server.address)
            }
            RouteTarget::Direct(uri) => parse_target(uri),
        }
    }

    /// Serve one request. Never fails; every outcome is a response.
    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let Some(route) = self.router.find(request.uri().path()) else {
            tracing::debug!(
                method = %request.method(),
                path = %request.uri().path(),
                "No route matched"
            );
            metrics::record_dispatch_failure("no_route");
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        };

        let deadline = self
            .request_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut guard = PostPassGuard {
            chain: &self.chain,
            ctx: RequestContext::new(request)
                .with_route(route.clone())
                .with_deadline(deadline),
        };

        if self.chain.run_pre(&mut guard.ctx) == PreOutcome::ShortCircuited {
            if guard.ctx.response().is_none() {
                guard
                    .ctx
                    .set_response((StatusCode::FORBIDDEN, "Request rejected").into_response());
            }
            return guard.finish();
        }

        let response = self.forward(&route, &mut guard.ctx).await;
        guard.ctx.set_response(response);
        guard.finish()
    }

    async fn forward(&self, route: &Route, ctx: &mut RequestContext) -> Response<Body> {
        let target = match self.resolve_target(route) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    route = %route.id,
                    error = %err,
                    "Dispatch failed"
                );
                metrics::record_dispatch_failure(err.kind());
                return err.into_response();
            }
        };

        let Some(mut request) = ctx.take_request() else {
            tracing::error!(request_id = %ctx.request_id(), "Request consumed before forwarding");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };
        if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
            request.headers_mut().insert(X_REQUEST_ID, value);
        }

        tracing::debug!(
            request_id = %ctx.request_id(),
            route = %route.id,
            target = %target,
            "Forwarding request"
        );
        metrics::record_backend_request(target.as_str(), &route.id);

        match self.transport.forward(target, request, ctx.deadline()).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    route = %route.id,
                    error = %err,
                    "Upstream error"
                );
                metrics::record_error(err.kind(), &route.id);
                err.into_response()
            }
        }
    }

}

/// Owns the context of an in-flight request.
///
/// If the dispatch future is dropped before `finish` (client disconnect,
/// stream reset, shutdown cutoff), the backward pass runs on drop with no
/// response set.
struct PostPassGuard<'a> {
    chain: &'a MiddlewareChain,
    ctx: RequestContext,
}

impl PostPassGuard<'_> {
    fn finish(mut self) -> Response<Body> {
        self.chain.run_post(&mut self.ctx);
        self.ctx
            .take_response()
            .unwrap_or_else(|| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

impl Drop for PostPassGuard<'_> {
    fn drop(&mut self) {
        if self.ctx.cursor.state != ChainState::Done {
            tracing::debug!(
                request_id = %self.ctx.request_id(),
                route = %self.ctx.route_id(),
                "Request dropped before completion"
            );
            self.chain.run_post(&mut self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::dispatch::transport::TransportError;
    use crate::load_balancer::{Server, Strategy};
    use crate::middleware::{Middleware, MiddlewareError};
    use crate::routing::{Predicate, RouteTable};
    use futures_util::future::{self, BoxFuture};
    use futures_util::FutureExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone)]
    struct Forwarded {
        target: String,
        path: String,
        request_id: Option<String>,
        deadline: Option<Instant>,
    }

    /// Records every forward and answers 200 with the target as body.
    #[derive(Debug, Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Forwarded>>,
        fail_with_timeout: bool,
    }

    impl RecordingTransport {
        fn calls(&self) -> Vec<Forwarded> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProxyTransport for RecordingTransport {
        fn forward(
            &self,
            target: Url,
            request: Request<Body>,
            deadline: Option<Instant>,
        ) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
            self.calls.lock().unwrap().push(Forwarded {
                target: target.to_string(),
                path: request.uri().path().to_string(),
                request_id: request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                deadline,
            });
            let fail = self.fail_with_timeout;
            Box::pin(async move {
                if fail {
                    Err(TransportError::Timeout)
                } else {
                    Ok(Response::new(Body::from(target.to_string())))
                }
            })
        }
    }

    /// Never answers, like a backend that accepted the connection and stalled.
    #[derive(Debug)]
    struct StalledTransport;

    impl ProxyTransport for StalledTransport {
        fn forward(
            &self,
            _target: Url,
            _request: Request<Body>,
            _deadline: Option<Instant>,
        ) -> BoxFuture<'static, Result<Response<Body>, TransportError>> {
            Box::pin(future::pending())
        }
    }

    /// Records phases and the status seen in post.
    #[derive(Debug)]
    struct Observer {
        allow: bool,
        reply: Option<StatusCode>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Observer {
        fn name(&self) -> &str {
            "observer"
        }

        fn pre_handle(&self, ctx: &mut RequestContext) -> bool {
            self.seen.lock().unwrap().push(format!("pre:{}", ctx.route_id()));
            if let Some(status) = self.reply {
                ctx.set_response(status.into_response());
            }
            self.allow
        }

        fn post_handle(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
            let status = ctx.response().map_or(0, |r| r.status().as_u16());
            self.seen.lock().unwrap().push(format!("post:{status}"));
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        transport: Arc<RecordingTransport>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn route(id: &str, uri: &str, pattern: &str, order: i32) -> Route {
        Route::new(id, uri)
            .with_predicate(Predicate::path(pattern).unwrap())
            .with_order(order)
    }

    fn fixture(routes: Vec<Route>, upstreams: &[UpstreamConfig], observer: Option<(bool, Option<StatusCode>)>) -> Fixture {
        let transport = Arc::new(RecordingTransport::default());
        fixture_with(routes, upstreams, observer, transport)
    }

    fn fixture_with(
        routes: Vec<Route>,
        upstreams: &[UpstreamConfig],
        observer: Option<(bool, Option<StatusCode>)>,
        transport: Arc<RecordingTransport>,
    ) -> Fixture {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<Arc<dyn Middleware>> = observer
            .map(|(allow, reply)| {
                vec![Arc::new(Observer {
                    allow,
                    reply,
                    seen: seen.clone(),
                }) as Arc<dyn Middleware>]
            })
            .unwrap_or_default();

        let dispatcher = Dispatcher::new(
            Arc::new(Router::new(RouteTable::from_routes(routes))),
            MiddlewareChain::new(handlers),
            Arc::new(UpstreamPool::from_config(upstreams, None)),
            transport.clone(),
        );
        Fixture {
            dispatcher,
            transport,
            seen,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn upstream(service: &str, addresses: &[&str]) -> UpstreamConfig {
        UpstreamConfig {
            service: service.into(),
            strategy: Strategy::RoundRobin,
            servers: addresses.iter().map(|a| Server::new(*a, 1)).collect(),
        }
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("127.0.0.1:9000").unwrap().as_str(), "http://127.0.0.1:9000/");
        assert_eq!(parse_target("https://api.example.com/v1").unwrap().scheme(), "https");
        assert!(parse_target("http://").is_err());
        assert!(parse_target("http://exa mple.com").is_err());
    }

    #[tokio::test]
    async fn test_no_route_is_404_without_chain_or_forward() {
        let f = fixture(vec![route("a", "http://a", "/a", 0)], &[], Some((true, None)));

        let response = f.dispatcher.dispatch(get("/nope")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(f.transport.calls().is_empty());
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_target_is_forwarded() {
        let f = fixture(
            vec![route("direct", "localhost:18081", "/**", 999)],
            &[],
            Some((true, None)),
        );

        let response = f.dispatcher.dispatch(get("/search?q=1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "http://localhost:18081/");
        let calls = f.transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/search");
        assert!(calls[0].request_id.is_some());
        assert!(calls[0].deadline.is_none());
        assert_eq!(*f.seen.lock().unwrap(), vec!["pre:direct", "post:200"]);
    }

    #[tokio::test]
    async fn test_load_balanced_target_rotates() {
        let f = fixture(
            vec![route("users", "lb://users", "/users/**", 0)],
            &[upstream("users", &["http://u1:80", "http://u2:80"])],
            None,
        );

        for _ in 0..4 {
            f.dispatcher.dispatch(get("/users/1")).await;
        }
        let targets: Vec<_> = f.transport.calls().into_iter().map(|c| c.target).collect();
        assert_eq!(
            targets,
            vec!["http://u1/", "http://u2/", "http://u1/", "http://u2/"]
        );
    }

    #[test]
    fn test_backend_requests_are_counted_per_target() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let f = fixture(
            vec![route("users", "lb://users", "/users/**", 0)],
            &[upstream("users", &["http://u1:80", "http://u2:80"])],
            None,
        );

        ::metrics::with_local_recorder(&recorder, || {
            for _ in 0..3 {
                let response = f.dispatcher.dispatch(get("/users/1")).now_or_never().unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            }
        });

        let rendered = handle.render();
        let count = |backend: &str| {
            rendered
                .lines()
                .find(|line| {
                    line.starts_with("gateway_backend_requests_total")
                        && line.contains(&format!("backend_url=\"{backend}\""))
                        && line.contains("route_id=\"users\"")
                })
                .and_then(|line| line.rsplit(' ').next())
                .map(str::to_string)
        };
        assert_eq!(count("http://u1/").as_deref(), Some("2"));
        assert_eq!(count("http://u2/").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_empty_upstream_is_503_and_post_still_runs() {
        let f = fixture(
            vec![route("users", "lb://users", "/users/**", 0)],
            &[upstream("users", &[])],
            Some((true, None)),
        );

        let response = f.dispatcher.dispatch(get("/users/1")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(f.transport.calls().is_empty());
        assert_eq!(*f.seen.lock().unwrap(), vec!["pre:users", "post:503"]);
    }

    #[tokio::test]
    async fn test_unknown_service_is_503() {
        let f = fixture(vec![route("x", "lb://missing", "/**", 0)], &[], None);
        let response = f.dispatcher.dispatch(get("/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unparseable_target_is_500() {
        let f = fixture(vec![route("bad", "http://", "/**", 0)], &[], None);
        let response = f.dispatcher.dispatch(get("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_request_still_runs_post_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer: Arc<dyn Middleware> = Arc::new(Observer {
            allow: true,
            reply: None,
            seen: seen.clone(),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(Router::new(RouteTable::from_routes(vec![route(
                "slow",
                "http://slow",
                "/**",
                0,
            )]))),
            MiddlewareChain::new(vec![observer]),
            Arc::new(UpstreamPool::new()),
            Arc::new(StalledTransport),
        );

        let result =
            tokio::time::timeout(Duration::from_millis(50), dispatcher.dispatch(get("/x"))).await;

        assert!(result.is_err());
        // Post ran exactly once, with no response recorded.
        assert_eq!(*seen.lock().unwrap(), vec!["pre:slow", "post:0"]);
    }

    #[test]
    fn test_cancelled_request_releases_in_flight_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let dispatcher = Dispatcher::new(
            Arc::new(Router::new(RouteTable::from_routes(vec![route(
                "slow",
                "http://slow",
                "/**",
                0,
            )]))),
            MiddlewareChain::from_kinds(&[crate::config::MiddlewareKind::Metrics]),
            Arc::new(UpstreamPool::new()),
            Arc::new(StalledTransport),
        );

        ::metrics::with_local_recorder(&recorder, || {
            let mut pending = Box::pin(dispatcher.dispatch(get("/x")));
            assert!(pending.as_mut().now_or_never().is_none());
        });

        let rendered = handle.render();
        let gauge = rendered
            .lines()
            .find(|line| line.starts_with("gateway_requests_in_flight"))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse::<f64>().ok());
        assert_eq!(gauge, Some(0.0));
    }

    #[tokio::test]
    async fn test_short_circuit_defaults_to_403() {
        let f = fixture(vec![route("a", "http://a", "/**", 0)], &[], Some((false, None)));

        let response = f.dispatcher.dispatch(get("/x")).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(f.transport.calls().is_empty());
        assert_eq!(*f.seen.lock().unwrap(), vec!["pre:a", "post:403"]);
    }

    #[tokio::test]
    async fn test_short_circuit_uses_handler_response() {
        let f = fixture(
            vec![route("a", "http://a", "/**", 0)],
            &[],
            Some((false, Some(StatusCode::TOO_MANY_REQUESTS))),
        );
        let response = f.dispatcher.dispatch(get("/x")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_priority_decides_target() {
        let f = fixture(
            vec![
                route("fallback", "http://fallback", "/**", 999),
                route("api", "http://api", "/api/**", 1),
            ],
            &[],
            None,
        );
        f.dispatcher.dispatch(get("/api/v1")).await;
        f.dispatcher.dispatch(get("/other")).await;

        let targets: Vec<_> = f.transport.calls().into_iter().map(|c| c.target).collect();
        assert_eq!(targets, vec!["http://api/", "http://fallback/"]);
    }

    #[tokio::test]
    async fn test_deadline_and_transport_errors() {
        let transport = Arc::new(RecordingTransport {
            fail_with_timeout: true,
            ..Default::default()
        });
        let mut f = fixture_with(vec![route("a", "http://a", "/**", 0)], &[], None, transport);
        f.dispatcher = f.dispatcher.with_request_timeout(Duration::from_secs(5));

        let before = Instant::now();
        let response = f.dispatcher.dispatch(get("/")).await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let deadline = f.transport.calls()[0].deadline.unwrap();
        assert!(deadline >= before + Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_client_request_id_is_forwarded() {
        let f = fixture(vec![route("a", "http://a", "/**", 0)], &[], None);
        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "req-42")
            .body(Body::empty())
            .unwrap();
        f.dispatcher.dispatch(request).await;
        assert_eq!(f.transport.calls()[0].request_id.as_deref(), Some("req-42"));
    }

    #[tokio::test]
    async fn test_reload_is_visible_to_next_dispatch() {
        let f = fixture(vec![route("a", "http://a", "/a", 0)], &[], None);
        assert_eq!(f.dispatcher.dispatch(get("/b")).await.status(), StatusCode::NOT_FOUND);

        f.dispatcher
            .router()
            .reload(vec![route("b", "http://b", "/b", 0)]);

        assert_eq!(f.dispatcher.dispatch(get("/b")).await.status(), StatusCode::OK);
        assert_eq!(f.dispatcher.dispatch(get("/a")).await.status(), StatusCode::NOT_FOUND);
    }
}
