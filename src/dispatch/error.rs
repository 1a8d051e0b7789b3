//! Dispatch failures decided by the gateway itself.

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

/// Why a matched request could not be handed to the transport.
///
/// "No route" is not an error; it is `None` from the router.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No server available for service `{service}`")]
    NoServerAvailable { service: String },

    #[error("Route target `{target}` is not a valid URL: {source}")]
    TargetUnparseable {
        target: String,
        #[source]
        source: url::ParseError,
    },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoServerAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::TargetUnparseable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoServerAvailable { .. } => "no_server",
            DispatchError::TargetUnparseable { .. } => "bad_target",
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response<Body> {
        let message = match self {
            DispatchError::NoServerAvailable { .. } => "No server available",
            DispatchError::TargetUnparseable { .. } => "Invalid route target",
        };
        (self.status(), message).into_response()
    }
}
