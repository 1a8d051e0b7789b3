//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router sending every path to the dispatcher
//! - Wire up layers (tracing, body limit, request ID)
//! - Bind server to listener with graceful shutdown
//! - Apply configuration reloads to the live router and upstream pool

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, HyperTransport, ProxyTransport};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::load_balancer::UpstreamPool;
use crate::middleware::MiddlewareChain;
use crate::routing::{PredicateError, PredicateRegistry, Router as RouteRouter};

/// Application state injected into handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub registry: Arc<PredicateRegistry>,
    pub started_at: Instant,
}

impl AppState {
    /// Apply a reloaded configuration. Routes are swapped atomically; a
    /// configuration whose routes fail to compile is rejected as a whole.
    pub fn apply_config(&self, config: &GatewayConfig) {
        if let Err(e) = self
            .dispatcher
            .router()
            .reload_from_config(&config.routes, &self.registry)
        {
            tracing::error!(error = %e, "Rejected configuration update, keeping current routes");
            return;
        }

        let pool = self.dispatcher.pool();
        pool.sync(&config.upstreams);
        pool.set_default_service(config.default_upstream.clone());

        tracing::info!(
            routes = config.routes.len(),
            upstreams = config.upstreams.len(),
            "Configuration applied"
        );
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    /// Create a server forwarding through the hyper client.
    pub fn new(config: GatewayConfig) -> Result<Self, PredicateError> {
        let transport = Arc::new(HyperTransport::new(Duration::from_secs(
            config.timeouts.connect_secs,
        )));
        Self::with_transport(config, transport)
    }

    /// Create a server forwarding through the given transport.
    pub fn with_transport(
        config: GatewayConfig,
        transport: Arc<dyn ProxyTransport>,
    ) -> Result<Self, PredicateError> {
        let registry = Arc::new(PredicateRegistry::with_defaults());
        let routes = Arc::new(RouteRouter::from_config(&config.routes, &registry)?);
        let pool = Arc::new(UpstreamPool::from_config(
            &config.upstreams,
            config.default_upstream.clone(),
        ));
        let chain = MiddlewareChain::from_kinds(&config.middlewares);

        let mut dispatcher = Dispatcher::new(routes, chain, pool, transport);
        if config.timeouts.request_secs > 0 {
            dispatcher =
                dispatcher.with_request_timeout(Duration::from_secs(config.timeouts.request_secs));
        }

        let state = AppState {
            dispatcher,
            registry,
            started_at: Instant::now(),
        };
        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layer order, outermost first: request ID assignment, tracing span,
    /// request ID echo, body limit.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = request.request_id().unwrap_or("-"),
                            )
                        },
                    ))
                    .layer(propagate_request_id_layer())
                    .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes)),
            )
    }

    /// Shared state, e.g. for the admin API.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until the shutdown signal fires.
    ///
    /// Configurations received on `config_updates` are applied while running.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                reload_state.apply_config(&config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Every path and method goes to the dispatcher.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    state.dispatcher.dispatch(request).await
}
