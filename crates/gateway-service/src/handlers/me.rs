//! Current user handler.
//!
//! Stand-in for a downstream service: returns the identity the
//! authentication pipeline attached to the forwarded request.

use crate::auth::{AuthenticationResult, USER_ID_HEADER, USER_ROLES_HEADER};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/v1/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    /// Subject from the verified token.
    pub sub: String,

    pub roles: Vec<String>,

    pub jti: String,

    /// Token expiration timestamp.
    pub exp: i64,

    /// `X-User-ID` header as received downstream.
    pub user_id_header: Option<String>,

    /// `X-User-Roles` header as received downstream.
    pub user_roles_header: Option<String>,
}

/// Handler for GET /api/v1/me
///
/// ```json
/// {
///   "sub": "u1",
///   "roles": ["RIDER"],
///   "jti": "abc",
///   "exp": 1234567890,
///   "user_id_header": "u1",
///   "user_roles_header": "RIDER"
/// }
/// ```
#[instrument(skip_all, name = "gateway.handlers.me")]
pub async fn get_me(
    Extension(identity): Extension<AuthenticationResult>,
    headers: HeaderMap,
) -> Json<MeResponse> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(MeResponse {
        user_id_header: header(USER_ID_HEADER),
        user_roles_header: header(USER_ROLES_HEADER),
        sub: identity.subject_id,
        roles: identity.roles.into_iter().collect(),
        jti: identity.jti,
        exp: identity.expiry,
    })
}
