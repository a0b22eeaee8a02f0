//! Builders for signed test tokens.
//!
//! Tokens are signed with the fixed keys from [`crate::crypto_fixtures`].
//! Defaults produce a token the gateway accepts under its default policy.

use crate::crypto_fixtures::TestKeypair;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Map, Value};

/// Issuer accepted by the default gateway policy.
pub const TEST_ISSUER: &str = "rido-auth-service";

/// Audience accepted by the default gateway policy.
pub const TEST_AUDIENCE: &str = "rido-api";

/// Builder for creating signed test tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .subject("u1")
///     .jti("abc")
///     .expires_in(60)
///     .build();
/// ```
pub struct TestTokenBuilder {
    keypair: TestKeypair,
    kid: Option<String>,
    algorithm: Algorithm,
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Valid claims for `u1`, expiring in 60 seconds, signed with `k1`.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!([TEST_AUDIENCE]));
        claims.insert("sub".to_string(), json!("u1"));
        claims.insert("jti".to_string(), json!("abc"));
        claims.insert("roles".to_string(), json!(["RIDER"]));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(60)).timestamp()),
        );

        let keypair = TestKeypair::primary();
        Self {
            kid: Some(keypair.kid.to_string()),
            keypair,
            algorithm: Algorithm::RS256,
            claims,
        }
    }

    /// Sign with `keypair` and advertise its key id.
    pub fn keypair(mut self, keypair: TestKeypair) -> Self {
        self.kid = Some(keypair.kid.to_string());
        self.keypair = keypair;
        self
    }

    /// Override the header `kid` without changing the signing key.
    pub fn kid(mut self, kid: Option<&str>) -> Self {
        self.kid = kid.map(str::to_string);
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn subject(self, sub: &str) -> Self {
        self.claim("sub", json!(sub))
    }

    pub fn jti(self, jti: &str) -> Self {
        self.claim("jti", json!(jti))
    }

    pub fn issuer(self, iss: &str) -> Self {
        self.claim("iss", json!(iss))
    }

    /// Set `aud` to any JSON value (string or array).
    pub fn audience(self, aud: Value) -> Self {
        self.claim("aud", aud)
    }

    pub fn roles(self, roles: &[&str]) -> Self {
        self.claim("roles", json!(roles))
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.claim("exp", json!(exp))
    }

    /// Set an absolute expiration timestamp
    pub fn exp(self, timestamp: i64) -> Self {
        self.claim("exp", json!(timestamp))
    }

    pub fn nbf(self, timestamp: i64) -> Self {
        self.claim("nbf", json!(timestamp))
    }

    /// Set or replace an arbitrary claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Sign and serialize the token.
    ///
    /// # Panics
    ///
    /// Panics if signing fails, which only happens with a broken fixture.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = self.kid;

        encode(&header, &Value::Object(self.claims), &self.keypair.encoding_key())
            .expect("signing a test token must succeed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Flip one byte of the decoded signature while keeping it valid base64url.
///
/// # Panics
///
/// Panics if `token` is not a three-segment token with a base64url signature.
#[allow(clippy::expect_used)]
pub fn tamper_signature(token: &str) -> String {
    let (signing_input, signature) = token
        .rsplit_once('.')
        .expect("token must have a signature segment");
    let mut bytes = URL_SAFE_NO_PAD
        .decode(signature)
        .expect("signature must be base64url");
    if let Some(first) = bytes.first_mut() {
        *first ^= 0x01;
    }
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(bytes))
}

/// Replace the header with one declaring `alg`, keeping claims and signature.
///
/// # Panics
///
/// Panics if `token` is not a three-segment token with a JSON header.
#[allow(clippy::expect_used)]
pub fn with_header_alg(token: &str, alg: &str) -> String {
    let (header, rest) = token.split_once('.').expect("token must have a header");
    let header_bytes = URL_SAFE_NO_PAD.decode(header).expect("header must be base64url");
    let mut header_json: Value =
        serde_json::from_slice(&header_bytes).expect("header must be JSON");
    header_json["alg"] = json!(alg);

    let new_header = URL_SAFE_NO_PAD.encode(header_json.to_string());
    format!("{}.{}", new_header, rest)
}
