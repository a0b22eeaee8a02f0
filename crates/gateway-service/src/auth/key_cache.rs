//! In-memory mirror of the issuer's signing keys.
//!
//! The cache holds an immutable snapshot behind an `Arc`. Readers clone the
//! `Arc` under a short read lock and then work on a fully-formed map;
//! writers build a new map off to the side and swap the pointer. A reader
//! therefore never observes a half-applied refresh.
//!
//! The cache is only written by [`crate::auth::KeySource`]. A failed refresh
//! never calls [`KeyCache::replace`], so stale keys stay until a successful
//! refresh supersedes them.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Smallest accepted RSA modulus, in bytes (2048 bits).
pub const MIN_RSA_MODULUS_BYTES: usize = 256;

/// Base64url decoder that tolerates issuers which pad their key material.
const KEY_MATERIAL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Why a key descriptor could not become a [`SigningKeyEntry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("key id is empty")]
    EmptyKeyId,

    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),

    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("unsupported key use '{0}'")]
    UnsupportedKeyUse(String),

    #[error("missing RSA component '{0}'")]
    MissingComponent(&'static str),

    #[error("RSA component '{0}' is not valid base64url")]
    InvalidEncoding(&'static str),

    #[error("RSA modulus is {0} bits, below the 2048-bit minimum")]
    ModulusTooShort(usize),

    #[error("RSA exponent is zero")]
    ZeroExponent,
}

/// One verified-usable RSA public key.
pub struct SigningKeyEntry {
    kid: String,
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    fetched_at: DateTime<Utc>,
}

impl fmt::Debug for SigningKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyEntry")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

impl SigningKeyEntry {
    /// Build an entry from base64url-encoded big-endian modulus and exponent.
    ///
    /// # Errors
    ///
    /// Returns [`KeyParseError`] when the components do not decode or describe
    /// a key too weak to verify RS256/384/512 signatures.
    pub fn from_rsa_components(
        kid: &str,
        modulus_b64: &str,
        exponent_b64: &str,
        algorithm: Algorithm,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, KeyParseError> {
        if kid.is_empty() {
            return Err(KeyParseError::EmptyKeyId);
        }

        let modulus = KEY_MATERIAL_ENGINE
            .decode(modulus_b64)
            .map_err(|_| KeyParseError::InvalidEncoding("n"))?;
        let exponent = KEY_MATERIAL_ENGINE
            .decode(exponent_b64)
            .map_err(|_| KeyParseError::InvalidEncoding("e"))?;

        let modulus = strip_leading_zeros(&modulus);
        let exponent = strip_leading_zeros(&exponent);

        if modulus.len() < MIN_RSA_MODULUS_BYTES {
            return Err(KeyParseError::ModulusTooShort(modulus.len() * 8));
        }
        if exponent.is_empty() {
            return Err(KeyParseError::ZeroExponent);
        }

        Ok(Self {
            kid: kid.to_string(),
            algorithm,
            decoding_key: DecodingKey::from_rsa_raw_components(modulus, exponent),
            fetched_at,
        })
    }

    /// Key identifier (`kid`).
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The one algorithm this key may verify.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Public key material for signature verification.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// When the key set containing this key was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(start..).unwrap_or_default()
}

#[derive(Default)]
struct KeySnapshot {
    keys: HashMap<String, Arc<SigningKeyEntry>>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Concurrent key-id to public-key map with atomic snapshot replacement.
#[derive(Default)]
pub struct KeyCache {
    snapshot: RwLock<Arc<KeySnapshot>>,
}

impl KeyCache {
    /// Create an empty cache. Every lookup misses until the first refresh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key by id. Unknown ids return `None`, never an error.
    pub async fn resolve(&self, kid: &str) -> Option<Arc<SigningKeyEntry>> {
        let snapshot = self.current().await;
        let entry = snapshot.keys.get(kid).cloned();
        if entry.is_none() {
            tracing::debug!(target: "gateway.auth.key_cache", kid = %kid, "Key id not in cache");
        }
        entry
    }

    /// Replace the whole key set in one step.
    pub async fn replace(&self, entries: Vec<SigningKeyEntry>) {
        let keys: HashMap<String, Arc<SigningKeyEntry>> = entries
            .into_iter()
            .map(|entry| (entry.kid.clone(), Arc::new(entry)))
            .collect();

        let next = Arc::new(KeySnapshot {
            keys,
            refreshed_at: Some(Utc::now()),
        });

        let mut guard = self.snapshot.write().await;
        *guard = next;
    }

    /// Number of keys in the current snapshot.
    pub async fn len(&self) -> usize {
        self.current().await.keys.len()
    }

    /// True until the first successful refresh.
    pub async fn is_empty(&self) -> bool {
        self.current().await.keys.is_empty()
    }

    /// Sorted key ids of the current snapshot.
    pub async fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.current().await.keys.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Time of the most recent successful replacement.
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.current().await.refreshed_at
    }

    async fn current(&self) -> Arc<KeySnapshot> {
        self.snapshot.read().await.clone()
    }
}
