//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.
//! The revocation store is in-memory so tests can revoke tokens and simulate
//! store outages without Redis.

use crate::mock_issuer::MockIssuer;
use gateway_service::auth::{InMemoryRevocationStore, JwksClient, KeyCache, KeySource};
use gateway_service::config::Config;
use gateway_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_me_flow() -> Result<()> {
///     let issuer = MockIssuer::with_keys(&[TestKeypair::primary()]).await;
///     let server = TestGatewayServer::spawn(&issuer).await?;
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/api/v1/me", server.url()))
///         .bearer_auth(TestTokenBuilder::new().build())
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    key_source: Arc<KeySource>,
    revocation_store: Arc<InMemoryRevocationStore>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a gateway trusting `issuer`, with default policy.
    ///
    /// The initial key-set fetch runs before this returns. Scheduled
    /// refreshes are effectively disabled; call
    /// `server.key_source().refresh_now()` to refresh.
    pub async fn spawn(issuer: &MockIssuer) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(issuer, HashMap::new()).await
    }

    /// Spawn with extra configuration variables overriding the defaults.
    pub async fn spawn_with_vars(
        issuer: &MockIssuer,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("JWKS_URL".to_string(), issuer.jwks_url()),
            ("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "3600".to_string()),
            ("JWKS_FETCH_TIMEOUT_MS".to_string(), "2000".to_string()),
            ("REVOCATION_TIMEOUT_MS".to_string(), "200".to_string()),
            ("GATEWAY_DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let key_source = Arc::new(KeySource::new(
            Arc::new(KeyCache::new()),
            JwksClient::new(config.jwks_url.clone(), config.jwks_fetch_timeout),
        ));
        key_source.refresh_now().await;

        let revocation_store = Arc::new(InMemoryRevocationStore::new());
        let state = Arc::new(AppState::new(
            config.clone(),
            key_source.clone(),
            revocation_store.clone(),
        ));

        // Detached recorder: tests must not install a global one.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            key_source,
            revocation_store,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn key_source(&self) -> &Arc<KeySource> {
        &self.key_source
    }

    /// The in-memory revocation store backing this server.
    pub fn revocation_store(&self) -> &Arc<InMemoryRevocationStore> {
        &self.revocation_store
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
