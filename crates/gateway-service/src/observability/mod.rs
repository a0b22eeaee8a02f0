//! Observability for the gateway.
//!
//! Provides metrics definitions and the Prometheus recorder.

pub mod metrics;
