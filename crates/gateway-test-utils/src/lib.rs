//! # Gateway Test Utilities
//!
//! Shared test utilities for the API gateway.
//!
//! This crate provides:
//! - Fixed RSA keypairs and key-set descriptors
//! - A signing `TestTokenBuilder` plus token tampering helpers
//! - `MockIssuer`, a wiremock-backed key-set endpoint
//! - `TestGatewayServer` for E2E tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let issuer = MockIssuer::with_keys(&[TestKeypair::primary()]).await;
//!     let server = TestGatewayServer::spawn(&issuer).await?;
//!     let token = TestTokenBuilder::new().subject("u1").build();
//!     // ...
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_issuer;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_issuer::*;
pub use server_harness::*;
pub use token_builders::*;
