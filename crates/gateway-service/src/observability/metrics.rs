//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gateway_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: `authenticated`, `bypassed`, or an `AuthRejection` label
//! - `status`: refresh outcome or `KeyFetchError` label
//! - `result`: 4 values (revoked, not_revoked, error, timeout)
//! - `endpoint`: a handful of normalized paths

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by
/// `GET /metrics`.
///
/// Must be called before any metrics are recorded; calls made before then
/// are dropped by the no-op recorder.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Revocation lookups are bounded by a sub-second timeout
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_revocation_check".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500,
            ],
        )
        .map_err(|e| format!("Failed to set revocation check buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the pipeline's decision for one request.
///
/// Metric: `gateway_auth_decisions_total`
/// Labels: `outcome`
pub fn record_auth_decision(outcome: &'static str) {
    counter!("gateway_auth_decisions_total", "outcome" => outcome).increment(1);
}

/// Record a revocation lookup.
///
/// Metric: `gateway_revocation_check_duration_seconds`
/// Labels: `result`
pub fn record_revocation_check(result: &'static str, duration: Duration) {
    histogram!("gateway_revocation_check_duration_seconds", "result" => result)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Key-Set Metrics
// ============================================================================

/// Record a key-set refresh attempt.
///
/// Metric: `gateway_jwks_refresh_total`
/// Labels: `status`
pub fn record_jwks_refresh(status: &'static str) {
    counter!("gateway_jwks_refresh_total", "status" => status).increment(1);
}

/// Set the number of keys currently cached.
///
/// Metric: `gateway_jwks_keys`
pub fn set_jwks_key_count(count: usize) {
    gauge!("gateway_jwks_keys").set(count as f64);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gateway_http_requests_total`, `gateway_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("gateway_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gateway_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        401 => "unauthorized",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse request paths to a bounded label set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        p if p.starts_with("/auth/") => "/auth/*",
        p if p.starts_with("/api/") => "/api/*",
        _ => "/other",
    }
}
