//! Token revocation lookups.
//!
//! A token is revoked when the key `auth:jti:blacklist:{jti}` exists in the
//! shared store. The gateway only ever reads this namespace; the issuer owns
//! writes and expiry.
//!
//! # Security
//!
//! - Fail-closed: a store error or a lookup exceeding the timeout rejects the
//!   request with `RevocationStoreUnavailable`
//! - Results are never cached locally, every request performs a fresh lookup
//! - Dropping the lookup future (client disconnect) abandons the call without
//!   touching shared state

use crate::auth::rejection::AuthRejection;
use crate::observability::metrics;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Namespace prefix for revoked token ids.
pub const REVOCATION_KEY_PREFIX: &str = "auth:jti:blacklist:";

/// Store key for `jti`.
pub fn revocation_key(jti: &str) -> String {
    format!("{REVOCATION_KEY_PREFIX}{jti}")
}

#[derive(Debug, Error)]
pub enum RevocationStoreError {
    #[error("revocation store connection failed: {0}")]
    Connection(String),

    #[error("revocation store lookup failed: {0}")]
    Lookup(String),
}

/// Existence check against a shared key-value store.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// True if `key` exists.
    async fn exists(&self, key: &str) -> Result<bool, RevocationStoreError>;
}

/// Redis-backed store.
///
/// `ConnectionManager` is cheap to clone and reconnects on its own; each
/// lookup clones it rather than sharing a lock.
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: ConnectionManager,
}

impl RedisRevocationStore {
    /// Connect to the store.
    ///
    /// # Errors
    ///
    /// Returns `RevocationStoreError::Connection` if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(redis_url: &SecretString) -> Result<Self, RevocationStoreError> {
        // Do NOT log the URL, it may carry credentials.
        let client = redis::Client::open(redis_url.expose_secret()).map_err(|e| {
            tracing::error!(target: "gateway.auth.revocation", error = %e, "Failed to open Redis client");
            RevocationStoreError::Connection(e.to_string())
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            tracing::error!(target: "gateway.auth.revocation", error = %e, "Failed to connect to Redis");
            RevocationStoreError::Connection(e.to_string())
        })?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn exists(&self, key: &str) -> Result<bool, RevocationStoreError> {
        let mut conn = self.connection.clone();
        conn.exists(key)
            .await
            .map_err(|e| RevocationStoreError::Lookup(e.to_string()))
    }
}

/// Process-local store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    keys: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    delay_ms: AtomicUsize,
    lookups: AtomicUsize,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `jti` as revoked.
    pub async fn revoke(&self, jti: &str) {
        self.keys.write().await.insert(revocation_key(jti));
    }

    pub async fn unrevoke(&self, jti: &str) {
        self.keys.write().await.remove(&revocation_key(jti));
    }

    /// Make every lookup fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay each lookup, simulating a slow store.
    pub fn set_delay(&self, delay: Duration) {
        let millis = usize::try_from(delay.as_millis()).unwrap_or(usize::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn exists(&self, key: &str) -> Result<bool, RevocationStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RevocationStoreError::Lookup(
                "in-memory store marked unavailable".to_string(),
            ));
        }

        Ok(self.keys.read().await.contains(key))
    }
}

/// Bounded, fail-closed revocation check.
#[derive(Clone)]
pub struct RevocationChecker {
    store: Arc<dyn RevocationStore>,
    timeout: Duration,
}

impl RevocationChecker {
    pub fn new(store: Arc<dyn RevocationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `jti` is revoked.
    ///
    /// # Errors
    ///
    /// Returns `AuthRejection::RevocationStoreUnavailable` if the store errors
    /// or does not answer within the timeout.
    #[instrument(skip_all)]
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, AuthRejection> {
        let key = revocation_key(jti);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, self.store.exists(&key)).await;

        let (label, result) = match outcome {
            Ok(Ok(true)) => ("revoked", Ok(true)),
            Ok(Ok(false)) => ("not_revoked", Ok(false)),
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "gateway.auth.revocation",
                    error = %e,
                    "Revocation lookup failed, rejecting request"
                );
                ("error", Err(AuthRejection::RevocationStoreUnavailable))
            }
            Err(_) => {
                tracing::warn!(
                    target: "gateway.auth.revocation",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Revocation lookup timed out, rejecting request"
                );
                ("timeout", Err(AuthRejection::RevocationStoreUnavailable))
            }
        };

        metrics::record_revocation_check(label, started.elapsed());
        result
    }

    /// `Ok(())` only when the store confirms `jti` is not revoked.
    pub async fn ensure_not_revoked(&self, jti: &str) -> Result<(), AuthRejection> {
        if self.is_revoked(jti).await? {
            tracing::debug!(target: "gateway.auth.revocation", jti = %jti, "Token is revoked");
            return Err(AuthRejection::TokenRevoked);
        }
        Ok(())
    }
}
