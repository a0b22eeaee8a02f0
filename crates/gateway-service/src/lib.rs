//! Rido API Gateway Library
//!
//! The gateway is the edge component of the Rido backend. Every inbound
//! request passes through its authentication pipeline before it reaches a
//! backend service:
//!
//! - RSA-signed bearer tokens are verified against the issuer's published
//!   key set, refreshed in the background
//! - Issuer, audience, expiry and algorithm policy are enforced
//! - Revoked token ids are rejected via a shared store (fail-closed)
//! - The verified identity is forwarded as `X-User-ID` / `X-User-Roles`
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/*.rs
//!                                     -> handlers/*.rs
//! tasks/jwks_refresher.rs -> auth/jwks.rs -> auth/key_cache.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key cache, key source, token decoding, validation, revocation
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication pipeline and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `tasks` - Background key-set refresher

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod tasks;
