//! Bearer-token validation gate.
//!
//! Validates access tokens issued by the trusted OIDC provider using keys
//! from its JWKS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - `alg` must be on the configured allow-list; `none` and HMAC never are
//! - Issuer is checked before any key lookup so foreign tokens cause no
//!   outbound traffic
//! - The key's `kty` (and `alg`, if pinned) must agree with the header `alg`
//! - Time claims are validated with clock skew tolerance
//! - Failure details are logged at debug level and surface only as an
//!   `AuthError` kind

use crate::auth::claims::ValidatedToken;
use crate::auth::jwks::{JwksClient, KeyFamily, SigningKey, SigningKeySet};
use crate::auth::AuthError;
use crate::config::Config;
use crate::observability::metrics::record_token_validation;
use common::jwt::{numeric_date, split_token, validate_exp_at, validate_iat_at, validate_nbf_at};
use jsonwebtoken::Algorithm;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Validates bearer tokens against one trusted issuer and audience.
pub struct TokenGate {
    issuer: String,
    audience: String,
    allowed_algorithms: Vec<Algorithm>,
    clock_skew: Duration,
    keys: JwksClient,
}

impl TokenGate {
    /// Create a gate from the service configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_jwks_client(config, JwksClient::from_config(config))
    }

    /// Create a gate that resolves keys through the given client.
    pub fn with_jwks_client(config: &Config, keys: JwksClient) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            allowed_algorithms: config.allowed_algorithms.clone(),
            clock_skew: config.clock_skew(),
            keys,
        }
    }

    /// Validate a bearer token (without the `Bearer ` prefix).
    ///
    /// # Errors
    ///
    /// Any `AuthError` except `MissingAuthorizationHeader`.
    #[instrument(skip_all, name = "rs.auth.gate.validate")]
    pub async fn validate(&self, token: &str) -> Result<ValidatedToken, AuthError> {
        self.validate_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Validate a bearer token against an explicit current time.
    ///
    /// # Errors
    ///
    /// See [`TokenGate::validate`].
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<ValidatedToken, AuthError> {
        let result = self.check(token, now).await;

        match &result {
            Ok(_) => {
                record_token_validation("success");
                tracing::debug!(target: "rs.auth.gate", "Token validated successfully");
            }
            Err(e) => {
                record_token_validation(e.kind());
                tracing::debug!(target: "rs.auth.gate", reason = e.kind(), "Token rejected");
            }
        }

        result
    }

    async fn check(&self, token: &str, now: i64) -> Result<ValidatedToken, AuthError> {
        // 1-2. Size and structure
        let segments = split_token(token)?;

        // 3. Algorithm
        let alg_name = segments.alg().ok_or(AuthError::MalformedToken)?;
        let algorithm = self.allowed_algorithm(alg_name)?;

        // 4. Required fields
        let kid = segments.kid()?;
        if segments.signature.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let payload = &segments.payload;
        let issuer = payload
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(AuthError::MalformedToken)?;
        let expires_at = payload
            .get("exp")
            .and_then(numeric_date)
            .ok_or(AuthError::MalformedToken)?;
        let not_before = optional_numeric_date(payload, "nbf")?;
        let issued_at = optional_numeric_date(payload, "iat")?;

        // 5. Issuer
        if issuer != self.issuer {
            tracing::debug!(target: "rs.auth.gate", issuer = %issuer, "Token issuer not trusted");
            return Err(AuthError::IssuerMismatch);
        }

        // 6. Key resolution
        let key = self.keys.get_key(kid).await?;

        // 7. Signature
        verify_signature(&key, algorithm, segments.signing_input, segments.signature)?;

        // 8. Audience
        let audience = audience_list(payload);
        if !audience.iter().any(|aud| aud == &self.audience) {
            return Err(AuthError::AudienceMismatch);
        }

        // 9. Time
        validate_exp_at(expires_at, self.clock_skew, now)?;
        if let Some(nbf) = not_before {
            validate_nbf_at(nbf, self.clock_skew, now)?;
        }
        if let Some(iat) = issued_at {
            validate_iat_at(iat, self.clock_skew, now)?;
        }

        let subject = payload
            .get("sub")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        Ok(ValidatedToken {
            issuer: issuer.to_string(),
            audience,
            subject,
            expires_at,
            issued_at,
            not_before,
            payload: segments.payload.clone(),
        })
    }

    fn allowed_algorithm(&self, alg_name: &str) -> Result<Algorithm, AuthError> {
        let Ok(algorithm) = Algorithm::from_str(alg_name) else {
            tracing::debug!(target: "rs.auth.gate", alg = %alg_name, "Unknown token algorithm");
            return Err(AuthError::DisallowedAlgorithm);
        };

        if KeyFamily::for_algorithm(algorithm).is_none()
            || !self.allowed_algorithms.contains(&algorithm)
        {
            tracing::debug!(target: "rs.auth.gate", alg = %alg_name, "Token algorithm not allowed");
            return Err(AuthError::DisallowedAlgorithm);
        }

        Ok(algorithm)
    }

    /// Force a refresh of the issuer's signing keys.
    ///
    /// # Errors
    ///
    /// `AuthError::DiscoveryUnavailable` or `AuthError::MalformedDiscoveryDocument`.
    pub async fn refresh_keys(&self) -> Result<Arc<SigningKeySet>, AuthError> {
        self.keys.refresh().await
    }

    /// Whether validation can currently succeed without contacting the IdP.
    pub async fn has_usable_keys(&self) -> bool {
        self.keys.has_usable_keys().await
    }
}

fn optional_numeric_date(
    payload: &Map<String, Value>,
    name: &str,
) -> Result<Option<i64>, AuthError> {
    match payload.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => numeric_date(value)
            .map(Some)
            .ok_or(AuthError::MalformedToken),
    }
}

/// `aud` as a list; a single string becomes a one-element list.
fn audience_list(payload: &Map<String, Value>) -> Vec<String> {
    match payload.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn verify_signature(
    key: &SigningKey,
    algorithm: Algorithm,
    signing_input: &str,
    signature: &str,
) -> Result<(), AuthError> {
    if KeyFamily::for_algorithm(algorithm) != Some(key.family) {
        tracing::warn!(
            target: "rs.auth.gate",
            kid = %key.kid,
            key_family = ?key.family,
            alg = ?algorithm,
            "Token algorithm does not match key type"
        );
        return Err(AuthError::InvalidSignature);
    }

    if let Some(pinned) = key.alg {
        if pinned != algorithm {
            tracing::warn!(
                target: "rs.auth.gate",
                kid = %key.kid,
                key_alg = ?pinned,
                alg = ?algorithm,
                "Token algorithm does not match key algorithm"
            );
            return Err(AuthError::InvalidSignature);
        }
    }

    match jsonwebtoken::crypto::verify(
        signature,
        signing_input.as_bytes(),
        key.decoding_key(),
        algorithm,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AuthError::InvalidSignature),
        Err(e) => {
            tracing::debug!(target: "rs.auth.gate", error = %e, "Token verification failed");
            Err(AuthError::InvalidSignature)
        }
    }
}
