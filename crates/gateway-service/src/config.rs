//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default URL of the issuer's published key set.
pub const DEFAULT_JWKS_URL: &str = "http://auth:8081/auth/keys/jwks.json";

/// Default key-set refresh interval in seconds.
pub const DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 10;

/// Default bound on a single key-set fetch in milliseconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 5000;

/// Default revocation store URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default bound on a single revocation lookup in milliseconds.
pub const DEFAULT_REVOCATION_TIMEOUT_MS: u64 = 250;

/// Default expected `iss` claim.
pub const DEFAULT_EXPECTED_ISSUER: &str = "rido-auth-service";

/// Default expected `aud` member.
pub const DEFAULT_EXPECTED_AUDIENCE: &str = "rido-api";

/// Default graceful-shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Path prefixes that bypass authentication unless overridden.
pub const DEFAULT_PUBLIC_PATH_PREFIXES: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/logout",
    "/auth/.well-known",
    "/auth/keys/jwks.json",
];

/// Gateway configuration.
///
/// Loaded from environment variables with defaults suitable for the
/// compose deployment. The Redis URL is redacted in Debug output since it
/// may carry credentials.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the issuer's key-set document.
    pub jwks_url: String,

    /// Interval between background key-set refreshes.
    pub jwks_refresh_interval: Duration,

    /// Upper bound on one key-set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Revocation store connection URL.
    pub redis_url: SecretString,

    /// Upper bound on one revocation lookup.
    pub revocation_timeout: Duration,

    /// Required `iss` claim value.
    pub expected_issuer: String,

    /// Value that must be present in the `aud` claim.
    pub expected_audience: String,

    /// Signature algorithms accepted in token headers.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Request path prefixes exempt from authentication.
    pub public_path_prefixes: Vec<String>,

    /// Seconds to keep draining connections after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwks_url", &self.jwks_url)
            .field("jwks_refresh_interval", &self.jwks_refresh_interval)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("redis_url", &"[REDACTED]")
            .field("revocation_timeout", &self.revocation_timeout)
            .field("expected_issuer", &self.expected_issuer)
            .field("expected_audience", &self.expected_audience)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("public_path_prefixes", &self.public_path_prefixes)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid public path configuration: {0}")]
    InvalidPublicPath(String),

    #[error("Invalid claim policy configuration: {0}")]
    InvalidClaimPolicy(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars
            .get("JWKS_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());

        let jwks_refresh_interval = Duration::from_secs(parse_positive(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS,
        )?);

        let jwks_fetch_timeout = Duration::from_millis(parse_positive(
            vars,
            "JWKS_FETCH_TIMEOUT_MS",
            DEFAULT_JWKS_FETCH_TIMEOUT_MS,
        )?);

        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        );

        let revocation_timeout = Duration::from_millis(parse_positive(
            vars,
            "REVOCATION_TIMEOUT_MS",
            DEFAULT_REVOCATION_TIMEOUT_MS,
        )?);

        let expected_issuer = non_empty(vars, "JWT_EXPECTED_ISSUER", DEFAULT_EXPECTED_ISSUER)?;
        let expected_audience =
            non_empty(vars, "JWT_EXPECTED_AUDIENCE", DEFAULT_EXPECTED_AUDIENCE)?;

        let allowed_algorithms = match vars.get("JWT_ALLOWED_ALGORITHMS") {
            Some(value) => parse_algorithms(value)?,
            None => vec![Algorithm::RS256],
        };

        let public_path_prefixes = match vars.get("PUBLIC_PATH_PREFIXES") {
            Some(value) => parse_prefixes(value)?,
            None => DEFAULT_PUBLIC_PATH_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        };

        let drain_seconds = if let Some(value_str) = vars.get("GATEWAY_DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "GATEWAY_DRAIN_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_DRAIN_SECONDS
        };

        Ok(Config {
            bind_address,
            jwks_url,
            jwks_refresh_interval,
            jwks_fetch_timeout,
            redis_url,
            revocation_timeout,
            expected_issuer,
            expected_audience,
            allowed_algorithms,
            public_path_prefixes,
            drain_seconds,
        })
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

fn non_empty(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidClaimPolicy(format!(
            "{} must not be empty",
            name
        ))),
        Some(value) => Ok(value.trim().to_string()),
        None => Ok(default.to_string()),
    }
}

/// Parse a comma-separated algorithm list, accepting only the RSA family.
fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let algorithm = match name {
            "RS256" => Algorithm::RS256,
            "RS384" => Algorithm::RS384,
            "RS512" => Algorithm::RS512,
            other => {
                return Err(ConfigError::InvalidAlgorithm(format!(
                    "JWT_ALLOWED_ALGORITHMS only accepts RS256, RS384, RS512, got '{}'",
                    other
                )))
            }
        };
        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithm(
            "JWT_ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}

fn parse_prefixes(value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|prefix| {
            if prefix.starts_with('/') {
                Ok(prefix.to_string())
            } else {
                Err(ConfigError::InvalidPublicPath(format!(
                    "PUBLIC_PATH_PREFIXES entries must start with '/', got '{}'",
                    prefix
                )))
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.jwks_url, DEFAULT_JWKS_URL);
        assert_eq!(config.jwks_refresh_interval, Duration::from_secs(10));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_millis(5000));
        assert_eq!(config.redis_url.expose_secret(), DEFAULT_REDIS_URL);
        assert_eq!(config.revocation_timeout, Duration::from_millis(250));
        assert_eq!(config.expected_issuer, "rido-auth-service");
        assert_eq!(config.expected_audience, "rido-api");
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256]);
        assert_eq!(
            config.public_path_prefixes.len(),
            DEFAULT_PUBLIC_PATH_PREFIXES.len()
        );
        assert_eq!(config.drain_seconds, DEFAULT_DRAIN_SECONDS);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            (
                "JWKS_URL".to_string(),
                "https://auth.example.com/jwks.json".to_string(),
            ),
            ("JWKS_REFRESH_INTERVAL_SECONDS".to_string(), "30".to_string()),
            ("JWKS_FETCH_TIMEOUT_MS".to_string(), "1500".to_string()),
            (
                "REDIS_URL".to_string(),
                "redis://:secret@redis:6379".to_string(),
            ),
            ("REVOCATION_TIMEOUT_MS".to_string(), "100".to_string()),
            ("JWT_EXPECTED_ISSUER".to_string(), "issuer-x".to_string()),
            ("JWT_EXPECTED_AUDIENCE".to_string(), "aud-x".to_string()),
            (
                "JWT_ALLOWED_ALGORITHMS".to_string(),
                "RS256, RS512".to_string(),
            ),
            (
                "PUBLIC_PATH_PREFIXES".to_string(),
                "/auth/login, /public".to_string(),
            ),
            ("GATEWAY_DRAIN_SECONDS".to_string(), "0".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwks_url, "https://auth.example.com/jwks.json");
        assert_eq!(config.jwks_refresh_interval, Duration::from_secs(30));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_millis(1500));
        assert_eq!(config.revocation_timeout, Duration::from_millis(100));
        assert_eq!(config.expected_issuer, "issuer-x");
        assert_eq!(config.expected_audience, "aud-x");
        assert_eq!(
            config.allowed_algorithms,
            vec![Algorithm::RS256, Algorithm::RS512]
        );
        assert_eq!(config.public_path_prefixes, vec!["/auth/login", "/public"]);
        assert_eq!(config.drain_seconds, 0);
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let vars = HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://:hunter2@redis:6379".to_string(),
        )]);
        let config = Config::from_vars(&vars).unwrap();

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let vars = HashMap::from([(
            "JWKS_REFRESH_INTERVAL_SECONDS".to_string(),
            "0".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidDuration(msg)) if msg.contains("greater than 0")));
    }

    #[test]
    fn test_non_numeric_timeout_rejected() {
        let vars = HashMap::from([("REVOCATION_TIMEOUT_MS".to_string(), "fast".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let vars = HashMap::from([("JWT_ALLOWED_ALGORITHMS".to_string(), "none".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidAlgorithm(_))));
    }

    #[test]
    fn test_hmac_algorithm_rejected() {
        let vars = HashMap::from([(
            "JWT_ALLOWED_ALGORITHMS".to_string(),
            "RS256,HS256".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidAlgorithm(msg)) if msg.contains("HS256")));
    }

    #[test]
    fn test_empty_algorithm_list_rejected() {
        let vars = HashMap::from([("JWT_ALLOWED_ALGORITHMS".to_string(), " , ".to_string())]);

        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_relative_public_prefix_rejected() {
        let vars = HashMap::from([(
            "PUBLIC_PATH_PREFIXES".to_string(),
            "/auth/login,auth/register".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidPublicPath(_))));
    }

    #[test]
    fn test_empty_public_prefix_list_allowed() {
        let vars = HashMap::from([("PUBLIC_PATH_PREFIXES".to_string(), String::new())]);

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.public_path_prefixes.is_empty());
    }

    #[test]
    fn test_blank_issuer_rejected() {
        let vars = HashMap::from([("JWT_EXPECTED_ISSUER".to_string(), "  ".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidClaimPolicy(_))));
    }
}
