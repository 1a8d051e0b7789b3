use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::validation::validate_route;
use crate::config::RouteDefinition;
use crate::load_balancer::{Server, Strategy};
use crate::routing::Route;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub upstreams: usize,
}

#[derive(Serialize)]
pub struct UpstreamStatus {
    pub service: String,
    pub strategy: Strategy,
    pub servers: Vec<Server>,
    pub is_default: bool,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub errors: Vec<String>,
}

fn bad_request(errors: Vec<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { errors })).into_response()
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let app = &state.app;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: app.started_at.elapsed().as_secs(),
        routes: app.dispatcher.router().snapshot().len(),
        upstreams: app.dispatcher.pool().services().len(),
    })
}

/// Route definitions in match order.
pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteDefinition>> {
    Json(state.app.dispatcher.router().snapshot().to_definitions())
}

/// Add or replace one route. The path id wins when the body omits one.
pub async fn put_route(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(mut definition): Json<RouteDefinition>,
) -> Response {
    if definition.id.is_empty() {
        definition.id = id.clone();
    } else if definition.id != id {
        return bad_request(vec![format!(
            "Route id `{}` does not match path id `{}`",
            definition.id, id
        )]);
    }

    let registry = &state.app.registry;
    let mut errors = Vec::new();
    validate_route(&definition, registry, &mut errors);
    if !errors.is_empty() {
        return bad_request(errors.iter().map(ToString::to_string).collect());
    }

    let route = match Route::from_definition(&definition, registry) {
        Ok(route) => route,
        Err(e) => return bad_request(vec![e.to_string()]),
    };

    let router = state.app.dispatcher.router();
    let existed = router.snapshot().get(&id).is_some();
    router.add_or_replace(route);
    tracing::info!(route = %id, replaced = existed, "Route updated via admin API");

    let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
    (status, Json(definition)).into_response()
}

pub async fn delete_route(State(state): State<AdminState>, Path(id): Path<String>) -> StatusCode {
    match state.app.dispatcher.router().remove(&id) {
        Some(_) => {
            tracing::info!(route = %id, "Route removed via admin API");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn get_upstreams(State(state): State<AdminState>) -> Json<Vec<UpstreamStatus>> {
    let pool = state.app.dispatcher.pool();
    let default = pool.default_service();
    let statuses = pool
        .services()
        .into_iter()
        .filter_map(|service| {
            let balancer = pool.get(&service)?;
            Some(UpstreamStatus {
                is_default: default.as_deref() == Some(service.as_str()),
                strategy: balancer.strategy(),
                servers: balancer.servers(),
                service,
            })
        })
        .collect();
    Json(statuses)
}
