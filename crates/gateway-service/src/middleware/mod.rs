//! Middleware for the gateway.
//!
//! # Components
//!
//! - `auth` - Authentication pipeline gating every non-operational route
//! - `http_metrics` - Request metrics, applied outermost

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthDecision, AuthPipeline, PublicPaths};
pub use http_metrics::http_metrics_middleware;
