//! Background tasks for the gateway.
//!
//! # Tasks
//!
//! - `jwks_refresher` - Re-fetches the issuer's key set on a fixed interval

pub mod jwks_refresher;

pub use jwks_refresher::start_jwks_refresher;
