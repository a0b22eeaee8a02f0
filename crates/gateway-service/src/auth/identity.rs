//! Verified identity and its propagation downstream.
//!
//! The pipeline builds an [`AuthenticationResult`] only once every check has
//! passed. [`propagate`] consumes the inbound request and returns the
//! forwarded one carrying `X-User-ID`, `X-User-Roles` and the result as a
//! request extension.

use crate::auth::rejection::AuthRejection;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
};
use std::collections::BTreeSet;
use std::fmt;

/// Header carrying the verified subject id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the verified roles, comma-joined.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Identity extracted from a fully verified token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Subject id (`sub`) - redacted in Debug output.
    pub subject_id: String,

    /// Roles, empty when the token carried none.
    pub roles: BTreeSet<String>,

    /// Token id, already confirmed absent from the revocation store.
    pub jti: String,

    /// Expiry (Unix epoch seconds).
    pub expiry: i64,
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("subject_id", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("jti", &self.jti)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl AuthenticationResult {
    /// Roles in `X-User-Roles` form.
    pub fn roles_header_value(&self) -> String {
        self.roles
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Remove any client-supplied identity headers.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_ROLES_HEADER);
}

/// Attach `identity` to the request that will be forwarded.
///
/// # Errors
///
/// Returns `AuthRejection::IdentityRejected` if the subject or roles cannot
/// be represented as header values, or a role contains the `,` separator.
pub fn propagate(
    mut request: Request,
    identity: &AuthenticationResult,
) -> Result<Request, AuthRejection> {
    if identity.roles.iter().any(|role| role.contains(',')) {
        return Err(AuthRejection::IdentityRejected);
    }
    let user_id = HeaderValue::from_str(&identity.subject_id)
        .map_err(|_| AuthRejection::IdentityRejected)?;
    let roles = HeaderValue::from_str(&identity.roles_header_value())
        .map_err(|_| AuthRejection::IdentityRejected)?;

    let headers = request.headers_mut();
    strip_identity_headers(headers);
    headers.insert(USER_ID_HEADER, user_id);
    headers.insert(USER_ROLES_HEADER, roles);

    request.extensions_mut().insert(identity.clone());
    Ok(request)
}
