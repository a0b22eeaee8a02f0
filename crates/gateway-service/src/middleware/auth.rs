//! Authentication pipeline and its axum middleware.
//!
//! Every request not on a public path goes through, in order:
//! bearer extraction, token decode, key resolution, signature and claim
//! validation, revocation check, identity propagation. The first failing
//! step short-circuits with an opaque 401 and nothing after it runs.
//!
//! Client-supplied `X-User-ID` / `X-User-Roles` headers are stripped from
//! every request, bypassed or authenticated.

use crate::auth::identity::{self, strip_identity_headers};
use crate::auth::rejection::AuthRejection;
use crate::auth::{token, ClaimValidator, KeyCache, RevocationChecker};
use crate::observability::metrics;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Path prefixes that skip authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicPaths {
    prefixes: Vec<String>,
}

impl PublicPaths {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// True if `path` falls under a configured prefix on a segment boundary.
    ///
    /// Paths with dot segments or encoded dots, slashes or backslashes are
    /// never public, whatever prefix they start with.
    pub fn is_public(&self, path: &str) -> bool {
        if is_ambiguous_path(path) {
            return false;
        }
        self.prefixes
            .iter()
            .any(|prefix| matches_segment_prefix(path, prefix))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

fn matches_segment_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// True if a downstream resolver could read `path` as a different path.
fn is_ambiguous_path(path: &str) -> bool {
    if path.contains('\\') {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    if ["%2e", "%2f", "%5c"].iter().any(|encoded| lower.contains(encoded)) {
        return true;
    }
    path.split('/').any(|segment| segment == "." || segment == "..")
}

/// How a request left the pipeline when it was allowed through.
#[derive(Debug)]
pub enum AuthDecision {
    /// Public path; no token work was done.
    Bypassed(Request),
    /// Fully verified; the request carries the propagated identity.
    Authenticated(Request),
}

/// The authentication pipeline.
///
/// Holds the shared key cache by reference; nothing here mutates it.
#[derive(Clone)]
pub struct AuthPipeline {
    key_cache: Arc<KeyCache>,
    validator: ClaimValidator,
    revocation: RevocationChecker,
    public_paths: PublicPaths,
}

impl AuthPipeline {
    pub fn new(
        key_cache: Arc<KeyCache>,
        validator: ClaimValidator,
        revocation: RevocationChecker,
        public_paths: PublicPaths,
    ) -> Self {
        Self {
            key_cache,
            validator,
            revocation,
            public_paths,
        }
    }

    pub fn public_paths(&self) -> &PublicPaths {
        &self.public_paths
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the `AuthRejection` of the first step that fails.
    #[instrument(skip_all, fields(path = %request.uri().path()))]
    pub async fn process(&self, mut request: Request) -> Result<AuthDecision, AuthRejection> {
        strip_identity_headers(request.headers_mut());

        if self.public_paths.is_public(request.uri().path()) {
            return Ok(AuthDecision::Bypassed(request));
        }

        let raw_token = extract_bearer(request.headers())?;
        let decoded = token::decode(&raw_token)?;

        let kid = decoded
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(AuthRejection::UnknownSigningKey)?;
        let key = self.key_cache.resolve(kid).await.ok_or_else(|| {
            tracing::debug!(target: "gateway.middleware.auth", kid = %kid, "Signing key not found");
            AuthRejection::UnknownSigningKey
        })?;

        let identity = self.validator.validate(&decoded, &key)?;
        self.revocation.ensure_not_revoked(&identity.jti).await?;

        let forwarded = identity::propagate(request, &identity)?;
        Ok(AuthDecision::Authenticated(forwarded))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Result<String, AuthRejection> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "gateway.middleware.auth", "Missing Authorization header");
            AuthRejection::MissingCredentials
        })?;

    let (scheme, token) = value.split_once(' ').ok_or_else(|| {
        tracing::debug!(target: "gateway.middleware.auth", "Invalid Authorization header format");
        AuthRejection::MissingCredentials
    })?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        tracing::debug!(target: "gateway.middleware.auth", "Authorization header is not a bearer token");
        return Err(AuthRejection::MissingCredentials);
    }

    Ok(token.to_string())
}

/// Axum middleware gating every route it wraps.
///
/// # Response
///
/// - 401 with `WWW-Authenticate` if any step fails
/// - Otherwise the downstream response for the forwarded request
#[instrument(skip_all, name = "gateway.middleware.auth")]
pub async fn require_auth(
    State(pipeline): State<Arc<AuthPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    match pipeline.process(request).await {
        Ok(AuthDecision::Bypassed(request)) => {
            metrics::record_auth_decision("bypassed");
            next.run(request).await
        }
        Ok(AuthDecision::Authenticated(request)) => {
            metrics::record_auth_decision("authenticated");
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(
                target: "gateway.middleware.auth",
                reason = rejection.as_str(),
                "Request rejected"
            );
            metrics::record_auth_decision(rejection.as_str());
            rejection.into_response()
        }
    }
}
