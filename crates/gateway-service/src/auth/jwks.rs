//! Key-set fetching and ingestion.
//!
//! [`JwksClient`] performs the HTTP GET against the issuer's published key
//! set. [`KeySource`] turns the fetched document into [`SigningKeyEntry`]s
//! and swaps them into the shared [`KeyCache`].
//!
//! # Failure Policy
//!
//! - A fetch, status, or parse failure is logged and counted, and the cache
//!   keeps whatever it held before
//! - Individually unusable descriptors are skipped; a document with no
//!   usable descriptor at all counts as a failure
//! - Only one fetch may be in flight; a concurrent `refresh_now` returns
//!   [`RefreshOutcome::AlreadyInFlight`] immediately

use crate::auth::key_cache::{KeyCache, KeyParseError, SigningKeyEntry};
use crate::auth::rejection::KeyFetchError;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

/// Largest key-set body accepted from the issuer.
pub const MAX_KEY_SET_BYTES: usize = 256 * 1024;

/// One raw key descriptor as published by the issuer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDescriptor {
    /// Key type; only "RSA" is usable.
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus, base64url big-endian.
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent, base64url big-endian.
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm; RS256 is assumed when absent.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use; must be "sig" when present.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key-set document (`{"keys": [...]}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySetDocument {
    /// Descriptors in issuer order.
    pub keys: Vec<KeyDescriptor>,
}

impl KeyDescriptor {
    /// Convert into a cache entry, validating type, use, algorithm and material.
    pub fn to_entry(&self, fetched_at: DateTime<Utc>) -> Result<SigningKeyEntry, KeyParseError> {
        if self.kty != "RSA" {
            return Err(KeyParseError::UnsupportedKeyType(self.kty.clone()));
        }

        if let Some(key_use) = &self.key_use {
            if key_use != "sig" {
                return Err(KeyParseError::UnsupportedKeyUse(key_use.clone()));
            }
        }

        let algorithm = match self.alg.as_deref() {
            None | Some("RS256") => Algorithm::RS256,
            Some("RS384") => Algorithm::RS384,
            Some("RS512") => Algorithm::RS512,
            Some(other) => return Err(KeyParseError::UnsupportedAlgorithm(other.to_string())),
        };

        let kid = self.kid.as_deref().ok_or(KeyParseError::EmptyKeyId)?;
        let n = self
            .n
            .as_deref()
            .ok_or(KeyParseError::MissingComponent("n"))?;
        let e = self
            .e
            .as_deref()
            .ok_or(KeyParseError::MissingComponent("e"))?;

        SigningKeyEntry::from_rsa_components(kid, n, e, algorithm, fetched_at)
    }
}

/// HTTP client for the issuer's key-set endpoint.
#[derive(Clone)]
pub struct JwksClient {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client with the fetch timeout applied.
    http_client: reqwest::Client,
}

impl JwksClient {
    /// Create a client whose every request is bounded by `fetch_timeout`.
    pub fn new(jwks_url: String, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gateway.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The configured key-set URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch and parse the key-set document.
    #[instrument(skip_all, fields(url = %self.jwks_url))]
    pub async fn fetch(&self) -> Result<KeySetDocument, KeyFetchError> {
        tracing::debug!(target: "gateway.auth.jwks", "Fetching JWKS from issuer");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let body = read_capped_body(response, MAX_KEY_SET_BYTES).await?;

        serde_json::from_slice::<KeySetDocument>(&body)
            .map_err(|e| KeyFetchError::Parse(e.to_string()))
    }
}

/// Read the response body, giving up as soon as it exceeds `limit` bytes.
async fn read_capped_body(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, KeyFetchError> {
    if let Some(declared) = response.content_length() {
        if declared > limit as u64 {
            return Err(KeyFetchError::TooLarge(limit));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_transport_error)? {
        if body.len() + chunk.len() > limit {
            return Err(KeyFetchError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn map_transport_error(error: reqwest::Error) -> KeyFetchError {
    if error.is_timeout() {
        KeyFetchError::Timeout
    } else {
        KeyFetchError::Http(error.to_string())
    }
}

/// Result of a [`KeySource::refresh_now`] call.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The cache now holds `key_count` keys from a fresh document.
    Refreshed { key_count: usize },

    /// Another refresh was already running; nothing was fetched.
    AlreadyInFlight,

    /// The refresh failed and the previous keys were kept.
    Failed(KeyFetchError),
}

impl RefreshOutcome {
    /// True only when the cache was replaced.
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

/// Feeds the [`KeyCache`] from the issuer's key-set document.
pub struct KeySource {
    cache: Arc<KeyCache>,
    client: JwksClient,
    in_flight: Mutex<()>,
}

impl KeySource {
    /// Create a key source writing into `cache`.
    pub fn new(cache: Arc<KeyCache>, client: JwksClient) -> Self {
        Self {
            cache,
            client,
            in_flight: Mutex::new(()),
        }
    }

    /// The cache this source writes into.
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Fetch the key set and replace the cache on success.
    ///
    /// Never returns an error; failures are logged and reported through
    /// [`RefreshOutcome::Failed`] with the cache untouched.
    #[instrument(skip_all, name = "gateway.auth.jwks.refresh")]
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!(target: "gateway.auth.jwks", "JWKS refresh already in flight, skipping");
            metrics::record_jwks_refresh("coalesced");
            return RefreshOutcome::AlreadyInFlight;
        };

        let result = match self.client.fetch().await {
            Ok(document) => self.ingest(document).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(key_count) => {
                metrics::record_jwks_refresh("success");
                RefreshOutcome::Refreshed { key_count }
            }
            Err(e) => {
                let retained_keys = self.cache.len().await;
                tracing::error!(
                    target: "gateway.auth.jwks",
                    error = %e,
                    retained_keys = retained_keys,
                    "JWKS refresh failed, keeping previous keys"
                );
                metrics::record_jwks_refresh(e.as_str());
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Parse every descriptor and atomically replace the cache.
    ///
    /// Returns the number of keys now cached.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError::EmptyKeySet`] without touching the cache when
    /// no descriptor yields a usable key.
    pub async fn ingest(&self, document: KeySetDocument) -> Result<usize, KeyFetchError> {
        let fetched_at = Utc::now();
        let mut entries: Vec<SigningKeyEntry> = Vec::with_capacity(document.keys.len());

        for descriptor in &document.keys {
            match descriptor.to_entry(fetched_at) {
                Ok(entry) => {
                    if entries.iter().any(|e| e.kid() == entry.kid()) {
                        tracing::warn!(
                            target: "gateway.auth.jwks",
                            kid = %entry.kid(),
                            "Duplicate key id in JWKS, keeping first occurrence"
                        );
                        continue;
                    }
                    entries.push(entry);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "gateway.auth.jwks",
                        kid = ?descriptor.kid,
                        error = %e,
                        "Skipping unusable JWKS key"
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(KeyFetchError::EmptyKeySet);
        }

        let key_count = entries.len();
        self.cache.replace(entries).await;
        metrics::set_jwks_key_count(key_count);

        tracing::info!(
            target: "gateway.auth.jwks",
            key_count = key_count,
            "JWKS cache refreshed"
        );

        Ok(key_count)
    }
}
