//! Compact token decoding.
//!
//! Splits a bearer token into its three base64url segments and parses the
//! header and claims as JSON. No signature or claim checks happen here; the
//! result must go through [`crate::auth::ClaimValidator`] before any of its
//! contents are trusted.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Any decode or parse failure yields `MalformedToken`, never a partial token
//! - The `sub` claim is redacted in Debug output

use crate::auth::rejection::AuthRejection;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum allowed token size in bytes (8KB).
///
/// Larger tokens are rejected before any base64 or JSON work.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// JOSE header fields the gateway consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Declared signature algorithm, kept verbatim so "none" is visible.
    pub alg: String,

    /// Key id used to select the verification key.
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// The `aud` claim, which issuers send either as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// True if `expected` is one of the audience values.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(value) => value == expected,
            Audience::Many(values) => values.iter().any(|v| v == expected),
        }
    }
}

/// Claims consumed from the token payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub aud: Option<Audience>,

    /// Subject (user id) - redacted in Debug output.
    pub sub: String,

    /// Unique token id used for revocation.
    pub jti: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("sub", &"[REDACTED]")
            .field("jti", &self.jti)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("roles", &self.roles)
            .finish()
    }
}

/// A structurally valid but unverified token.
#[derive(Clone)]
pub struct DecodedToken {
    pub header: TokenHeader,
    pub claims: TokenClaims,
    pub signature: Vec<u8>,
    raw: String,
    signature_offset: usize,
}

impl fmt::Debug for DecodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedToken")
            .field("header", &self.header)
            .field("claims", &self.claims)
            .field("signature_len", &self.signature.len())
            .finish_non_exhaustive()
    }
}

impl DecodedToken {
    /// The compact token as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `header.claims`, the bytes covered by the signature.
    pub fn signing_input(&self) -> &str {
        self.raw
            .get(..self.signature_offset.saturating_sub(1))
            .unwrap_or_default()
    }

    /// The signature segment as it appeared in the token.
    pub fn signature_segment(&self) -> &str {
        self.raw.get(self.signature_offset..).unwrap_or_default()
    }
}

/// Decode a compact token into header, claims and signature.
///
/// # Errors
///
/// Returns `AuthRejection::MalformedToken` if the token is oversized, does
/// not have exactly three non-empty segments, any segment is not unpadded
/// base64url, or the header/claims are not the expected JSON objects.
pub fn decode(raw_token: &str) -> Result<DecodedToken, AuthRejection> {
    if raw_token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "gateway.auth.token",
            token_size = raw_token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(AuthRejection::MalformedToken);
    }

    let mut segments = raw_token.split('.');
    let (Some(header_part), Some(claims_part), Some(signature_part), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!(target: "gateway.auth.token", "Token rejected: invalid JWT format");
        return Err(AuthRejection::MalformedToken);
    };

    if header_part.is_empty() || claims_part.is_empty() || signature_part.is_empty() {
        tracing::debug!(target: "gateway.auth.token", "Token rejected: empty segment");
        return Err(AuthRejection::MalformedToken);
    }

    let header: TokenHeader = decode_json_segment(header_part, "header")?;
    let claims: TokenClaims = decode_json_segment(claims_part, "claims")?;
    let signature = URL_SAFE_NO_PAD.decode(signature_part).map_err(|e| {
        tracing::debug!(target: "gateway.auth.token", error = %e, "Failed to decode JWT signature base64");
        AuthRejection::MalformedToken
    })?;

    let signature_offset = header_part.len() + claims_part.len() + 2;

    Ok(DecodedToken {
        header,
        claims,
        signature,
        raw: raw_token.to_string(),
        signature_offset,
    })
}

fn decode_json_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &'static str,
) -> Result<T, AuthRejection> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "gateway.auth.token", segment = name, error = %e, "Failed to decode JWT segment base64");
        AuthRejection::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "gateway.auth.token", segment = name, error = %e, "Failed to parse JWT segment JSON");
        AuthRejection::MalformedToken
    })
}
