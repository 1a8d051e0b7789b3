//! Admin API.
//!
//! # Responsibilities
//! - Report gateway status
//! - List, add, replace and remove routes on the live table
//! - Show upstream services and their servers
//!
//! # Design Decisions
//! - Served on its own listener (localhost by default), never on the proxy port
//! - Route edits go through the same validation as configuration files
//! - Edits are copy-on-write on the live table; a later file reload replaces them

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::AppState;

/// State shared by admin handlers.
#[derive(Clone, Debug)]
pub struct AdminState {
    pub app: AppState,
    pub api_key: Option<String>,
}

pub fn setup_admin_router(app: AppState, api_key: Option<String>) -> Router {
    let state = AdminState { app, api_key };
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/{id}", put(put_route).delete(delete_route))
        .route("/admin/upstreams", get(get_upstreams))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve_admin(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
