//! Prometheus metrics endpoint.

use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics, in Prometheus text format.
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
