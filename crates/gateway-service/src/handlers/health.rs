//! Liveness, readiness and fallback handlers.

use crate::errors::GatewayError;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::Uri;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness details.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadyResponse {
    pub status: String,

    /// Number of signing keys currently cached.
    pub signing_keys: usize,
}

/// Liveness probe. Always healthy while the process serves requests.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe.
///
/// Ready once at least one signing key is cached; until then every
/// authenticated request would be rejected.
#[instrument(skip_all, name = "gateway.health.ready")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadyResponse>, GatewayError> {
    let signing_keys = state.key_source.cache().len().await;

    if signing_keys == 0 {
        return Err(GatewayError::ServiceUnavailable(
            "no signing keys cached".to_string(),
        ));
    }

    Ok(Json(ReadyResponse {
        status: "ready".to_string(),
        signing_keys,
    }))
}

/// Fallback for forwarded requests with no downstream route.
pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("No route for {}", uri.path()))
}
