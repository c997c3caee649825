//! Resource server configuration.
//!
//! Configuration is loaded from environment variables. `from_vars` takes an
//! explicit map so tests never touch the process environment.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default allowed CORS origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default signing algorithm allow-list.
pub const DEFAULT_ALLOWED_ALGORITHMS: &str = "RS256,ES256,EdDSA";

/// Default soft TTL of the signing key cache in seconds (5 minutes).
pub const DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 300;

/// Default hard expiry of the signing key cache in seconds (24 hours).
pub const DEFAULT_JWKS_MAX_STALENESS_SECONDS: u64 = 86_400;

/// Default minimum spacing between miss-triggered key refreshes in seconds.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 10;

/// Default timeout for calls to the identity provider in seconds.
pub const DEFAULT_IDP_HTTP_TIMEOUT_SECONDS: u64 = 5;

/// Maximum timeout for calls to the identity provider in seconds.
pub const MAX_IDP_HTTP_TIMEOUT_SECONDS: u64 = 60;

/// Default claim carrying the tenant/provider identifier.
pub const DEFAULT_PROVIDER_ID_CLAIM: &str = "provider_id";

/// Where requests may come from for CORS purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigin {
    /// `*`: any origin.
    Any,
    /// A single exact origin, e.g. `https://app.example.com`.
    Exact(String),
}

/// Resource server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Trusted issuer; must exactly equal the token `iss`.
    pub issuer: String,

    /// Audience that every accepted token must carry.
    pub audience: String,

    /// Explicit JWKS URL. When unset the URL comes from OIDC discovery.
    pub jwks_url: Option<String>,

    /// Origin allowed by the CORS layer.
    pub cors_allowed_origin: CorsOrigin,

    /// JWT clock skew tolerance in seconds for exp/nbf/iat validation.
    pub jwt_clock_skew_seconds: u64,

    /// Signing algorithms a token header may declare.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Cached keys older than this are refreshed on next use.
    pub jwks_refresh_interval_seconds: u64,

    /// Cached keys older than this are never used, even if the IdP is down.
    pub jwks_max_staleness_seconds: u64,

    /// Minimum age of the cached keys before an unknown kid may trigger a refresh.
    pub jwks_min_refresh_interval_seconds: u64,

    /// Timeout for discovery and JWKS requests.
    pub idp_http_timeout_seconds: u64,

    /// Claim name read as the provider identifier on `/api/data`.
    pub provider_id_claim: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid signing algorithm configuration: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid CORS origin configuration: {0}")]
    InvalidCorsOrigin(String),

    #[error("Invalid key cache configuration: {0}")]
    InvalidKeyCache(String),

    #[error("Invalid identity provider timeout configuration: {0}")]
    InvalidIdpTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = required_non_empty(vars, "OIDC_ISSUER")?;
        let audience = required_non_empty(vars, "OIDC_AUDIENCE")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars
            .get("OIDC_JWKS_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let cors_allowed_origin = parse_cors_origin(
            vars.get("CORS_ALLOWED_ORIGIN")
                .map(String::as_str)
                .unwrap_or(DEFAULT_CORS_ALLOWED_ORIGIN),
        )?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not be negative, got {}",
                    value
                )));
            }

            if value as u64 > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value as u64
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let allowed_algorithms = parse_algorithms(
            vars.get("JWT_ALLOWED_ALGORITHMS")
                .map(String::as_str)
                .unwrap_or(DEFAULT_ALLOWED_ALGORITHMS),
        )?;

        let jwks_refresh_interval_seconds = parse_seconds(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS,
        )?;
        if jwks_refresh_interval_seconds == 0 {
            return Err(ConfigError::InvalidKeyCache(
                "JWKS_REFRESH_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let jwks_max_staleness_seconds = parse_seconds(
            vars,
            "JWKS_MAX_STALENESS_SECONDS",
            DEFAULT_JWKS_MAX_STALENESS_SECONDS,
        )?;
        if jwks_max_staleness_seconds < jwks_refresh_interval_seconds {
            return Err(ConfigError::InvalidKeyCache(format!(
                "JWKS_MAX_STALENESS_SECONDS ({}) must not be less than JWKS_REFRESH_INTERVAL_SECONDS ({})",
                jwks_max_staleness_seconds, jwks_refresh_interval_seconds
            )));
        }

        let jwks_min_refresh_interval_seconds = parse_seconds(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
        )?;

        let idp_http_timeout_seconds = if let Some(value_str) = vars.get("IDP_HTTP_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidIdpTimeout(format!(
                    "IDP_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_IDP_HTTP_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidIdpTimeout(format!(
                    "IDP_HTTP_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                    MAX_IDP_HTTP_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_IDP_HTTP_TIMEOUT_SECONDS
        };

        let provider_id_claim = vars
            .get("PROVIDER_ID_CLAIM")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_ID_CLAIM.to_string());

        Ok(Config {
            bind_address,
            issuer,
            audience,
            jwks_url,
            cors_allowed_origin,
            jwt_clock_skew_seconds,
            allowed_algorithms,
            jwks_refresh_interval_seconds,
            jwks_max_staleness_seconds,
            jwks_min_refresh_interval_seconds,
            idp_http_timeout_seconds,
            provider_id_claim,
        })
    }

    /// Clock skew tolerance as a `Duration`.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }
}

fn required_non_empty(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidKeyCache(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

fn parse_cors_origin(raw: &str) -> Result<CorsOrigin, ConfigError> {
    let origin = raw.trim();

    if origin == "*" {
        return Ok(CorsOrigin::Any);
    }

    if origin.is_empty() {
        return Err(ConfigError::InvalidCorsOrigin(
            "CORS_ALLOWED_ORIGIN must not be empty".to_string(),
        ));
    }

    // Browsers send the origin without a trailing slash
    let origin = origin.trim_end_matches('/');

    if !(origin.starts_with("http://") || origin.starts_with("https://")) {
        return Err(ConfigError::InvalidCorsOrigin(format!(
            "CORS_ALLOWED_ORIGIN must be '*' or an http(s) origin, got '{}'",
            origin
        )));
    }

    if axum::http::HeaderValue::from_str(origin).is_err() {
        return Err(ConfigError::InvalidCorsOrigin(format!(
            "CORS_ALLOWED_ORIGIN is not a valid header value: '{}'",
            origin
        )));
    }

    Ok(CorsOrigin::Exact(origin.to_string()))
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let algorithm = Algorithm::from_str(name).map_err(|_| {
            ConfigError::InvalidAlgorithms(format!("Unknown signing algorithm '{}'", name))
        })?;

        // Symmetric keys are never published in a JWKS
        if matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(ConfigError::InvalidAlgorithms(format!(
                "Symmetric algorithm '{}' cannot be used to verify IdP-issued tokens",
                name
            )));
        }

        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithms(
            "JWT_ALLOWED_ALGORITHMS must name at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}
