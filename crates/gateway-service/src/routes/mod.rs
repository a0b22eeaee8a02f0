//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::{ClaimPolicy, ClaimValidator, KeySource, RevocationChecker, RevocationStore};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthPipeline, PublicPaths};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Key source; its cache backs readiness and the pipeline.
    pub key_source: Arc<KeySource>,

    /// Authentication pipeline applied to every non-operational route.
    pub pipeline: Arc<AuthPipeline>,
}

impl AppState {
    /// Wire the pipeline from configuration.
    pub fn new(
        config: Config,
        key_source: Arc<KeySource>,
        revocation_store: Arc<dyn RevocationStore>,
    ) -> Self {
        let pipeline = AuthPipeline::new(
            key_source.cache().clone(),
            ClaimValidator::new(ClaimPolicy::from_config(&config)),
            RevocationChecker::new(revocation_store, config.revocation_timeout),
            PublicPaths::new(config.public_path_prefixes.clone()),
        );

        Self {
            config,
            key_source,
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - outside the pipeline
/// - `/ready` - Readiness probe (signing keys cached) - outside the pipeline
/// - `/metrics` - Prometheus metrics endpoint - outside the pipeline
/// - `/api/v1/me` - Echo of the propagated identity - authenticated
/// - Fallback JSON 404 for everything else - authenticated or bypassed
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let operational_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // `layer` rather than `route_layer` so the fallback is gated too.
    let gated_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.pipeline.clone(),
            require_auth,
        ));

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    operational_routes
        .merge(metrics_routes)
        .merge(gated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
