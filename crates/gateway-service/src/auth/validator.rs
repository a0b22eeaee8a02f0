//! Signature verification and claim policy.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. Algorithm: the header `alg` must parse, appear in the allow-list, and
//!    equal the algorithm of the resolved key. `none` never parses.
//! 2. Signature over `header.claims` with the resolved public key.
//! 3. Issuer equals the expected issuer.
//! 4. Audience contains the expected audience.
//! 5. `exp` is strictly after the validation time.
//! 6. `nbf`, when present, is not after the validation time.
//!
//! # Security
//!
//! - The algorithm comes from the policy and the key, never from the token alone
//! - No clock leeway is applied
//! - Nothing is extracted from the claims until every check has passed

use crate::auth::identity::AuthenticationResult;
use crate::auth::key_cache::SigningKeyEntry;
use crate::auth::rejection::AuthRejection;
use crate::auth::token::DecodedToken;
use crate::config::Config;
use jsonwebtoken::Algorithm;
use std::str::FromStr;

/// The claim requirements every token must meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPolicy {
    pub expected_issuer: String,
    pub expected_audience: String,
    pub allowed_algorithms: Vec<Algorithm>,
}

impl ClaimPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            expected_issuer: config.expected_issuer.clone(),
            expected_audience: config.expected_audience.clone(),
            allowed_algorithms: config.allowed_algorithms.clone(),
        }
    }
}

/// Verifies decoded tokens against a resolved key and a [`ClaimPolicy`].
#[derive(Debug, Clone)]
pub struct ClaimValidator {
    policy: ClaimPolicy,
}

impl ClaimValidator {
    pub fn new(policy: ClaimPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    /// Validate against the current wall-clock time.
    pub fn validate(
        &self,
        token: &DecodedToken,
        key: &SigningKeyEntry,
    ) -> Result<AuthenticationResult, AuthRejection> {
        self.validate_at(token, key, chrono::Utc::now().timestamp())
    }

    /// Validate as if the current time were `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// Returns the rejection for the first check that fails, see the module
    /// docs for the order.
    pub fn validate_at(
        &self,
        token: &DecodedToken,
        key: &SigningKeyEntry,
        now: i64,
    ) -> Result<AuthenticationResult, AuthRejection> {
        let algorithm = self.check_algorithm(token, key)?;

        let verified = jsonwebtoken::crypto::verify(
            token.signature_segment(),
            token.signing_input().as_bytes(),
            key.decoding_key(),
            algorithm,
        )
        .map_err(|e| {
            tracing::debug!(target: "gateway.auth.validator", error = %e, kid = %key.kid(), "Signature verification errored");
            AuthRejection::SignatureInvalid
        })?;
        if !verified {
            tracing::debug!(target: "gateway.auth.validator", kid = %key.kid(), "Signature does not verify");
            return Err(AuthRejection::SignatureInvalid);
        }

        let claims = &token.claims;

        if claims.iss.as_deref() != Some(self.policy.expected_issuer.as_str()) {
            tracing::debug!(target: "gateway.auth.validator", iss = ?claims.iss, "Issuer mismatch");
            return Err(AuthRejection::IssuerMismatch);
        }

        let audience_ok = claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.policy.expected_audience));
        if !audience_ok {
            tracing::debug!(target: "gateway.auth.validator", aud = ?claims.aud, "Audience mismatch");
            return Err(AuthRejection::AudienceMismatch);
        }

        if claims.exp <= now {
            tracing::debug!(target: "gateway.auth.validator", exp = claims.exp, now = now, "Token expired");
            return Err(AuthRejection::ClaimExpired);
        }

        if let Some(nbf) = claims.nbf {
            if nbf > now {
                tracing::debug!(target: "gateway.auth.validator", nbf = nbf, now = now, "Token not yet valid");
                return Err(AuthRejection::ClaimNotYetValid);
            }
        }

        Ok(AuthenticationResult {
            subject_id: claims.sub.clone(),
            roles: claims.roles.iter().flatten().cloned().collect(),
            jti: claims.jti.clone(),
            expiry: claims.exp,
        })
    }

    fn check_algorithm(
        &self,
        token: &DecodedToken,
        key: &SigningKeyEntry,
    ) -> Result<Algorithm, AuthRejection> {
        let declared = token.header.alg.as_str();

        let Ok(algorithm) = Algorithm::from_str(declared) else {
            tracing::debug!(target: "gateway.auth.validator", alg = %declared, "Unrecognised token algorithm");
            return Err(AuthRejection::AlgorithmNotAllowed);
        };

        if !self.policy.allowed_algorithms.contains(&algorithm) {
            tracing::debug!(target: "gateway.auth.validator", alg = ?algorithm, "Token algorithm not in allow-list");
            return Err(AuthRejection::AlgorithmNotAllowed);
        }

        if algorithm != key.algorithm() {
            tracing::debug!(
                target: "gateway.auth.validator",
                alg = ?algorithm,
                key_alg = ?key.algorithm(),
                kid = %key.kid(),
                "Token algorithm does not match key"
            );
            return Err(AuthRejection::AlgorithmNotAllowed);
        }

        Ok(algorithm)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::token;
    use chrono::Utc;
    use gateway_test_utils::{tamper_signature, with_header_alg, TestKeypair, TestTokenBuilder};
    use serde_json::json;

    fn policy() -> ClaimPolicy {
        ClaimPolicy {
            expected_issuer: "rido-auth-service".to_string(),
            expected_audience: "rido-api".to_string(),
            allowed_algorithms: vec![Algorithm::RS256],
        }
    }

    fn entry(keypair: TestKeypair, algorithm: Algorithm) -> SigningKeyEntry {
        SigningKeyEntry::from_rsa_components(keypair.kid, keypair.n, keypair.e, algorithm, Utc::now())
            .unwrap()
    }

    fn validate(raw: &str) -> Result<AuthenticationResult, AuthRejection> {
        let decoded = token::decode(raw).unwrap();
        ClaimValidator::new(policy()).validate(&decoded, &entry(TestKeypair::primary(), Algorithm::RS256))
    }

    #[test]
    fn test_valid_token_yields_identity() {
        let raw = TestTokenBuilder::new()
            .subject("u1")
            .jti("abc")
            .roles(&["RIDER", "DRIVER", "RIDER"])
            .build();

        let result = validate(&raw).unwrap();

        assert_eq!(result.subject_id, "u1");
        assert_eq!(result.jti, "abc");
        assert_eq!(
            result.roles.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["DRIVER", "RIDER"]
        );
    }

    #[test]
    fn test_missing_roles_default_to_empty() {
        let raw = TestTokenBuilder::new().without_claim("roles").build();
        assert!(validate(&raw).unwrap().roles.is_empty());
    }

    #[test]
    fn test_scalar_audience_accepted() {
        let raw = TestTokenBuilder::new().audience(json!("rido-api")).build();
        assert!(validate(&raw).is_ok());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let raw = tamper_signature(&TestTokenBuilder::new().build());
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::SignatureInvalid);
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let raw = TestTokenBuilder::new()
            .keypair(TestKeypair::secondary().with_kid("k1"))
            .build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::SignatureInvalid);
    }

    #[test]
    fn test_alg_none_rejected() {
        let raw = with_header_alg(&TestTokenBuilder::new().build(), "none");
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::AlgorithmNotAllowed);
    }

    #[test]
    fn test_hmac_alg_rejected() {
        let raw = with_header_alg(&TestTokenBuilder::new().build(), "HS256");
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::AlgorithmNotAllowed);
    }

    #[test]
    fn test_alg_outside_allow_list_rejected() {
        let raw = TestTokenBuilder::new().algorithm(Algorithm::RS384).build();
        let decoded = token::decode(&raw).unwrap();
        // Key matches, policy does not allow RS384.
        let result = ClaimValidator::new(policy())
            .validate(&decoded, &entry(TestKeypair::primary(), Algorithm::RS384));
        assert_eq!(result.unwrap_err(), AuthRejection::AlgorithmNotAllowed);
    }

    #[test]
    fn test_alg_mismatching_key_rejected() {
        let mut policy = policy();
        policy.allowed_algorithms.push(Algorithm::RS512);
        let raw = TestTokenBuilder::new().algorithm(Algorithm::RS512).build();
        let decoded = token::decode(&raw).unwrap();

        let result = ClaimValidator::new(policy)
            .validate(&decoded, &entry(TestKeypair::primary(), Algorithm::RS256));

        assert_eq!(result.unwrap_err(), AuthRejection::AlgorithmNotAllowed);
    }

    #[test]
    fn test_non_default_allowed_alg_accepted() {
        let mut policy = policy();
        policy.allowed_algorithms.push(Algorithm::RS512);
        let raw = TestTokenBuilder::new().algorithm(Algorithm::RS512).build();
        let decoded = token::decode(&raw).unwrap();

        let result = ClaimValidator::new(policy)
            .validate(&decoded, &entry(TestKeypair::primary(), Algorithm::RS512));

        assert!(result.is_ok());
    }

    #[test]
    fn test_issuer_mismatch() {
        let raw = TestTokenBuilder::new().issuer("someone-else").build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::IssuerMismatch);

        let raw = TestTokenBuilder::new().without_claim("iss").build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::IssuerMismatch);
    }

    #[test]
    fn test_audience_mismatch() {
        let raw = TestTokenBuilder::new().audience(json!(["other-api"])).build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::AudienceMismatch);

        let raw = TestTokenBuilder::new().without_claim("aud").build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::AudienceMismatch);
    }

    #[test]
    fn test_expired_token_rejected_despite_valid_signature() {
        let raw = TestTokenBuilder::new().expires_in(-60).build();
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::ClaimExpired);
    }

    #[test]
    fn test_expiry_is_strict() {
        let raw = TestTokenBuilder::new().exp(1_000).build();
        let decoded = token::decode(&raw).unwrap();
        let validator = ClaimValidator::new(policy());
        let key = entry(TestKeypair::primary(), Algorithm::RS256);

        assert_eq!(
            validator.validate_at(&decoded, &key, 1_000).unwrap_err(),
            AuthRejection::ClaimExpired
        );
        assert!(validator.validate_at(&decoded, &key, 999).is_ok());
    }

    #[test]
    fn test_not_before_enforced() {
        let raw = TestTokenBuilder::new().exp(2_000).nbf(1_500).build();
        let decoded = token::decode(&raw).unwrap();
        let validator = ClaimValidator::new(policy());
        let key = entry(TestKeypair::primary(), Algorithm::RS256);

        assert_eq!(
            validator.validate_at(&decoded, &key, 1_499).unwrap_err(),
            AuthRejection::ClaimNotYetValid
        );
        assert!(validator.validate_at(&decoded, &key, 1_500).is_ok());
    }

    #[test]
    fn test_signature_checked_before_claims() {
        let raw = tamper_signature(&TestTokenBuilder::new().expires_in(-60).issuer("x").build());
        assert_eq!(validate(&raw).unwrap_err(), AuthRejection::SignatureInvalid);
    }
}
