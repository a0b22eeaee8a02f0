//! Mock token issuer publishing a key-set document.
//!
//! Wraps a wiremock server that answers `GET /auth/keys/jwks.json`.

use crate::crypto_fixtures::{key_set_json, TestKeypair};
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the issuer publishes its key set on.
pub const JWKS_PATH: &str = "/auth/keys/jwks.json";

/// Mock issuer for key-set tests.
///
/// # Example
/// ```rust,ignore
/// let issuer = MockIssuer::with_keys(&[TestKeypair::primary()]).await;
/// let server = TestGatewayServer::spawn(&issuer).await?;
///
/// // Rotate to a new key; the next refresh drops k1.
/// issuer.publish(&[TestKeypair::secondary()]).await;
/// ```
pub struct MockIssuer {
    server: MockServer,
}

impl MockIssuer {
    /// Start an issuer that publishes nothing yet (404 for every path).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start an issuer publishing `keys`.
    pub async fn with_keys(keys: &[TestKeypair]) -> Self {
        let issuer = Self::start().await;
        issuer.publish(keys).await;
        issuer
    }

    /// Replace the published key set.
    ///
    /// Resets the mock server, which also clears its request log.
    pub async fn publish(&self, keys: &[TestKeypair]) {
        let descriptors: Vec<Value> = keys.iter().map(TestKeypair::jwk).collect();
        self.publish_document(key_set_json(&descriptors)).await;
    }

    /// Publish an arbitrary JSON body as the key-set document.
    pub async fn publish_document(&self, document: Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(document))
            .await;
    }

    /// Answer key-set requests with `status` and no body.
    pub async fn fail_with_status(&self, status: u16) {
        self.mount(ResponseTemplate::new(status)).await;
    }

    /// Answer with a non-JSON body.
    pub async fn publish_garbage(&self) {
        self.mount(ResponseTemplate::new(200).set_body_string("not a key set"))
            .await;
    }

    /// Publish `keys`, but only after `delay`.
    pub async fn publish_slowly(&self, keys: &[TestKeypair], delay: Duration) {
        let descriptors: Vec<Value> = keys.iter().map(TestKeypair::jwk).collect();
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(key_set_json(&descriptors))
                .set_delay(delay),
        )
        .await;
    }

    /// Full URL of the key-set document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Key-set requests received since the last publish.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn mount(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
