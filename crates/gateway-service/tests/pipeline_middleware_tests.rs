//! Middleware-level pipeline tests.
//!
//! Builds routers around `require_auth` directly so tests can plug in custom
//! downstream handlers and revocation stores.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use chrono::Utc;
use gateway_service::auth::{
    AuthRejection, AuthenticationResult, ClaimPolicy, ClaimValidator, InMemoryRevocationStore, KeyCache,
    RevocationChecker, RevocationStore, RevocationStoreError, SigningKeyEntry,
};
use gateway_service::middleware::{require_auth, AuthDecision, AuthPipeline, PublicPaths};
use gateway_test_utils::{tamper_signature, TestKeypair, TestTokenBuilder};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn primary_cache() -> Arc<KeyCache> {
    let keypair = TestKeypair::primary();
    let cache = Arc::new(KeyCache::new());
    cache
        .replace(vec![SigningKeyEntry::from_rsa_components(
            keypair.kid,
            keypair.n,
            keypair.e,
            Algorithm::RS256,
            Utc::now(),
        )
        .unwrap()])
        .await;
    cache
}

fn pipeline(cache: Arc<KeyCache>, store: Arc<dyn RevocationStore>) -> Arc<AuthPipeline> {
    Arc::new(AuthPipeline::new(
        cache,
        ClaimValidator::new(ClaimPolicy {
            expected_issuer: "rido-auth-service".to_string(),
            expected_audience: "rido-api".to_string(),
            allowed_algorithms: vec![Algorithm::RS256],
        }),
        RevocationChecker::new(store, Duration::from_millis(200)),
        PublicPaths::new(vec!["/auth/login".to_string()]),
    ))
}

/// Downstream stand-in that echoes identity headers and the extension.
async fn echo(headers: HeaderMap, request: Request<Body>) -> axum::Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let identity = request.extensions().get::<AuthenticationResult>().cloned();

    axum::Json(json!({
        "x_user_id": header("x-user-id"),
        "x_user_roles": header("x-user-roles"),
        "has_identity": identity.is_some(),
        "jti": identity.map(|i| i.jti),
    }))
}

fn app(pipeline: Arc<AuthPipeline>) -> Router {
    Router::new()
        .route("/auth/login", get(echo))
        .route("/api/echo", get(echo))
        .fallback(echo)
        .layer(middleware::from_fn_with_state(pipeline, require_auth))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Bypass
// ============================================================================

#[tokio::test]
async fn test_bypassed_request_has_spoofed_headers_stripped() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let app = app(pipeline(primary_cache().await, store.clone()));

    let request = Request::builder()
        .uri("/auth/login")
        .header("X-User-ID", "admin")
        .header("X-User-Roles", "ADMIN")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["x_user_id"], Value::Null);
    assert_eq!(body["x_user_roles"], Value::Null);
    assert_eq!(body["has_identity"], false);
    assert_eq!(store.lookup_count(), 0);
}

#[tokio::test]
async fn test_bypass_ignores_invalid_token() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let app = app(pipeline(primary_cache().await, store));

    let request = Request::builder()
        .uri("/auth/login")
        .header("Authorization", "Bearer garbage")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_traversal_out_of_public_prefix_requires_auth() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let pipeline = pipeline(primary_cache().await, store.clone());

    for path in [
        "/auth/login/../../api/echo",
        "/auth/login/%2e%2e/%2e%2e/api/echo",
        "/auth/loginadmin/secret",
    ] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let result = pipeline.process(request).await;
        assert_eq!(result.unwrap_err(), AuthRejection::MissingCredentials, "{path}");

        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = app(pipeline.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
    assert_eq!(store.lookup_count(), 0);
}

#[tokio::test]
async fn test_public_prefix_subpath_is_bypassed() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let pipeline = pipeline(primary_cache().await, store);

    let request = Request::builder()
        .uri("/auth/login/sso")
        .body(Body::empty())
        .unwrap();
    let decision = pipeline.process(request).await.unwrap();

    assert!(matches!(decision, AuthDecision::Bypassed(_)));
}

// ============================================================================
// Rejection reasons
// ============================================================================

fn bearer_request(token: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/echo")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_flipped_signature_is_signature_invalid() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let pipeline = pipeline(primary_cache().await, store.clone());
    let token = tamper_signature(&TestTokenBuilder::new().build());

    let result = pipeline.process(bearer_request(&token)).await;

    assert_eq!(result.unwrap_err(), AuthRejection::SignatureInvalid);
    assert_eq!(store.lookup_count(), 0);
}

#[tokio::test]
async fn test_revoked_jti_is_token_revoked() {
    let store = Arc::new(InMemoryRevocationStore::new());
    store.revoke("abc").await;
    let pipeline = pipeline(primary_cache().await, store.clone());
    let token = TestTokenBuilder::new().jti("abc").build();

    let result = pipeline.process(bearer_request(&token)).await;

    assert_eq!(result.unwrap_err(), AuthRejection::TokenRevoked);
    assert_eq!(store.lookup_count(), 1);
}

#[tokio::test]
async fn test_role_containing_separator_is_identity_rejected() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let pipeline = pipeline(primary_cache().await, store);
    let token = TestTokenBuilder::new().roles(&["RIDER,ADMIN"]).build();

    let result = pipeline.process(bearer_request(&token)).await;

    assert_eq!(result.unwrap_err(), AuthRejection::IdentityRejected);
}

// ============================================================================
// Authenticated
// ============================================================================

#[tokio::test]
async fn test_authenticated_request_carries_identity() {
    let store = Arc::new(InMemoryRevocationStore::new());
    let app = app(pipeline(primary_cache().await, store.clone()));

    let token = TestTokenBuilder::new().subject("u1").jti("abc").build();
    let request = Request::builder()
        .uri("/api/echo")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-User-ID", "spoofed")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["x_user_id"], "u1");
    assert_eq!(body["x_user_roles"], "RIDER");
    assert_eq!(body["jti"], "abc");
    assert_eq!(store.lookup_count(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let store = Arc::new(InMemoryRevocationStore::new());
    store.revoke("revoked").await;
    let pipeline = pipeline(primary_cache().await, store);

    let mut handles = Vec::new();
    for i in 0..20 {
        let app = app(pipeline.clone());
        handles.push(tokio::spawn(async move {
            let jti = if i % 2 == 0 { "revoked".to_string() } else { format!("ok-{i}") };
            let token = TestTokenBuilder::new().jti(&jti).build();
            let request = Request::builder()
                .uri("/api/echo")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap();
            (i, app.oneshot(request).await.unwrap().status())
        }));
    }

    for handle in handles {
        let (i, status) = handle.await.unwrap();
        let expected = if i % 2 == 0 { StatusCode::UNAUTHORIZED } else { StatusCode::OK };
        assert_eq!(status, expected, "request {i}");
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Store whose lookups never complete; records when a lookup is abandoned.
struct HangingStore {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RevocationStore for HangingStore {
    async fn exists(&self, _key: &str) -> Result<bool, RevocationStoreError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(false)
    }
}

#[tokio::test]
async fn test_client_disconnect_cancels_revocation_lookup() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let store = Arc::new(HangingStore {
        started: started.clone(),
        dropped: dropped.clone(),
    });
    let cache = primary_cache().await;
    let app = app(pipeline(cache.clone(), store));

    let token = TestTokenBuilder::new().build();
    let request = Request::builder()
        .uri("/api/echo")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    // Dropping the request future models the client going away.
    let request_future = app.oneshot(request);
    let result = tokio::time::timeout(Duration::from_millis(50), request_future).await;
    assert!(result.is_err(), "lookup should still be pending");

    assert!(started.load(Ordering::SeqCst));
    assert!(dropped.load(Ordering::SeqCst));

    // Shared state is untouched.
    assert_eq!(cache.key_ids().await, vec!["k1"]);
}

#[tokio::test]
async fn test_hanging_store_times_out_closed() {
    let store = Arc::new(HangingStore {
        started: Arc::new(AtomicBool::new(false)),
        dropped: Arc::new(AtomicBool::new(false)),
    });
    let app = app(pipeline(primary_cache().await, store));

    let token = TestTokenBuilder::new().build();
    let request = Request::builder()
        .uri("/api/echo")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
