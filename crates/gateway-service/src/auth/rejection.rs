//! Authentication failure taxonomy.
//!
//! Every [`AuthRejection`] renders as the same opaque 401 so callers cannot
//! distinguish an expired token from a revoked one. The precise reason is
//! available to logs and metrics through [`AuthRejection::as_str`].
//!
//! [`KeyFetchError`] never reaches a request; it is produced by key-set
//! refreshes and only logged and counted.

use crate::errors::ErrorResponse;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// `WWW-Authenticate` challenge attached to every 401.
pub const BEARER_CHALLENGE: &str = "Bearer realm=\"rido-api\", error=\"invalid_token\"";

/// Reason a request failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("missing or malformed Authorization header")]
    MissingCredentials,

    #[error("token is not a well-formed compact JWT")]
    MalformedToken,

    #[error("token key id is absent or unknown")]
    UnknownSigningKey,

    #[error("token signature does not verify")]
    SignatureInvalid,

    #[error("token algorithm is not allowed")]
    AlgorithmNotAllowed,

    #[error("token issuer does not match")]
    IssuerMismatch,

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("token has expired")]
    ClaimExpired,

    #[error("token is not yet valid")]
    ClaimNotYetValid,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("revocation status could not be confirmed")]
    RevocationStoreUnavailable,

    #[error("verified identity cannot be propagated")]
    IdentityRejected,
}

impl AuthRejection {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRejection::MissingCredentials => "missing_credentials",
            AuthRejection::MalformedToken => "malformed_token",
            AuthRejection::UnknownSigningKey => "unknown_signing_key",
            AuthRejection::SignatureInvalid => "signature_invalid",
            AuthRejection::AlgorithmNotAllowed => "algorithm_not_allowed",
            AuthRejection::IssuerMismatch => "issuer_mismatch",
            AuthRejection::AudienceMismatch => "audience_mismatch",
            AuthRejection::ClaimExpired => "claim_expired",
            AuthRejection::ClaimNotYetValid => "claim_not_yet_valid",
            AuthRejection::TokenRevoked => "token_revoked",
            AuthRejection::RevocationStoreUnavailable => "revocation_store_unavailable",
            AuthRejection::IdentityRejected => "identity_rejected",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new("UNAUTHORIZED", "Authentication required");
        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response.headers_mut().insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static(BEARER_CHALLENGE),
        );
        response
    }
}

/// Reason a key-set refresh failed. The cache is retained in every case.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("key-set request failed: {0}")]
    Http(String),

    #[error("key-set endpoint returned HTTP {0}")]
    Status(u16),

    #[error("key-set document could not be parsed: {0}")]
    Parse(String),

    #[error("key-set body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("key-set document contained no usable keys")]
    EmptyKeySet,

    #[error("key-set request timed out")]
    Timeout,
}

impl KeyFetchError {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFetchError::Http(_) => "http_error",
            KeyFetchError::Status(_) => "bad_status",
            KeyFetchError::Parse(_) => "parse_error",
            KeyFetchError::TooLarge(_) => "too_large",
            KeyFetchError::EmptyKeySet => "empty_key_set",
            KeyFetchError::Timeout => "timeout",
        }
    }
}
