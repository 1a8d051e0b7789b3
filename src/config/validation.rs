//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default upstream exists)
//! - Reject duplicate route IDs and upstream services
//! - Compile every predicate once so broken patterns fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, RouteDefinition};
use crate::routing::{PredicateError, PredicateRegistry, LOAD_BALANCED_PREFIX};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Route at index {index} has an empty id")]
    EmptyRouteId { index: usize },

    #[error("Duplicate route id `{id}`")]
    DuplicateRouteId { id: String },

    #[error("Route `{id}` has an empty uri")]
    EmptyUri { id: String },

    #[error("Route `{id}` uses `{LOAD_BALANCED_PREFIX}` without a service name")]
    EmptyService { id: String },

    #[error("Route `{id}`: {source}")]
    Predicate {
        id: String,
        #[source]
        source: PredicateError,
    },

    #[error("Duplicate upstream service `{service}`")]
    DuplicateService { service: String },

    #[error("Upstream `{service}` has a server with an empty address")]
    EmptyServerAddress { service: String },

    #[error("Default upstream `{service}` is not defined")]
    UnknownDefaultUpstream { service: String },

    #[error("Invalid {field} `{value}`")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a configuration with the default predicate registry.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    validate_with(config, &PredicateRegistry::with_defaults())
}

/// Validate a configuration against a specific predicate registry.
pub fn validate_with(
    config: &GatewayConfig,
    registry: &PredicateRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    let mut route_ids = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.is_empty() {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId { id: route.id.clone() });
        }
        validate_route(route, registry, &mut errors);
    }

    let mut services = HashSet::new();
    for upstream in &config.upstreams {
        if !services.insert(upstream.service.as_str()) {
            errors.push(ValidationError::DuplicateService {
                service: upstream.service.clone(),
            });
        }
        if upstream.servers.iter().any(|s| s.address.trim().is_empty()) {
            errors.push(ValidationError::EmptyServerAddress {
                service: upstream.service.clone(),
            });
        }
    }

    if let Some(default) = &config.default_upstream {
        if !services.contains(default.as_str()) {
            errors.push(ValidationError::UnknownDefaultUpstream {
                service: default.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a single route definition (used by the admin API as well).
pub fn validate_route(
    route: &RouteDefinition,
    registry: &PredicateRegistry,
    errors: &mut Vec<ValidationError>,
) {
    if route.uri.trim().is_empty() {
        errors.push(ValidationError::EmptyUri { id: route.id.clone() });
    } else if route
        .uri
        .strip_prefix(LOAD_BALANCED_PREFIX)
        .is_some_and(|service| service.is_empty())
    {
        errors.push(ValidationError::EmptyService { id: route.id.clone() });
    }

    if route.predicates.is_empty() {
        tracing::warn!(route = %route.id, "Route has no predicates and will never match");
    }

    for predicate in &route.predicates {
        if let Err(source) = registry.compile(predicate) {
            errors.push(ValidationError::Predicate {
                id: route.id.clone(),
                source,
            });
        }
    }
}
