//! Gateway error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.
//!
//! Authentication failures have their own type, [`crate::auth::AuthRejection`],
//! which always renders as the same opaque 401.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Gateway error type for non-authentication failures.
///
/// Maps to HTTP status codes:
/// - NotFound: 404 Not Found
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotFound(_) => 404,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Internal => 500,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: ErrorDetail,
}

#[derive(Serialize)]
pub(crate) struct ErrorDetail {
    pub(crate) code: String,
    pub(crate) message: String,
}

impl ErrorResponse {
    pub(crate) fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            GatewayError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "gateway.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
