//! Request gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ dispatch::Dispatcher
//!                                          │
//!                                          ├─▶ routing::Router (first match by order)
//!                                          ├─▶ middleware::MiddlewareChain (pre)
//!                                          ├─▶ load_balancer::UpstreamPool (lb://service)
//!                                          ├─▶ dispatch::transport (hyper client) ──▶ Backend
//!                                          └─▶ middleware::MiddlewareChain (post)
//!     Client Response
//!     ◀──────────────
//!
//!     Cross-cutting: config (+ watcher), observability, lifecycle, admin
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use request_gateway::admin::{serve_admin, setup_admin_router};
use request_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use request_gateway::http::GatewayServer;
use request_gateway::lifecycle::{wait_for_shutdown_signal, Shutdown};
use request_gateway::observability::{init_logging, init_metrics};

#[derive(Parser, Debug)]
#[command(name = "request-gateway", version, about = "HTTP request gateway")]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        upstreams = config.upstreams.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        if let Err(e) = init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics exporter");
        }
    }

    // Keep the watcher alive for the life of the process.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.with_initial(config.clone()).run()?), updates)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config.clone())?;

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(server.state().clone(), config.admin.api_key.clone());
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, router, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_shutdown.trigger();
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
