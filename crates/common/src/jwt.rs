//! JWT utilities shared across resource server crates.
//!
//! This module provides the structural layer of bearer-token validation:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-claim validation
//! - Splitting a compact JWS into decoded header, payload, and signature
//! - Key ID lookup in the decoded header
//! - `exp` / `nbf` / `iat` validation with clock skew tolerance
//!
//! Nothing in here verifies a signature. Callers must verify the signature
//! over [`TokenSegments::signing_input`] before trusting any payload value.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{split_token, validate_exp_at, DEFAULT_CLOCK_SKEW};
//!
//! let segments = split_token(token)?;
//! let kid = segments.kid()?;
//! // ... resolve key, verify signature over segments.signing_input ...
//! validate_exp_at(exp, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical access tokens from an OIDC provider are
/// 800-2000 bytes; 8KB leaves room for large group/role claims.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during structural JWT validation.
///
/// Display strings are intentionally identical so that nothing about the
/// failing check leaks to a caller. Detail is logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `exp` claim is in the past beyond the clock skew.
    #[error("The access token is invalid or expired")]
    Expired,

    /// Token `nbf` claim is in the future beyond the clock skew.
    #[error("The access token is invalid or expired")]
    NotYetValid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Token Segments
// =============================================================================

/// A compact JWS split into its three parts, with header and payload decoded.
///
/// Borrowed from the original token string so no copies of the signing
/// input or signature are made.
#[derive(Debug, Clone)]
pub struct TokenSegments<'a> {
    /// Decoded JOSE header.
    pub header: Map<String, Value>,

    /// Decoded (unverified) claims payload.
    pub payload: Map<String, Value>,

    /// `base64url(header) "." base64url(payload)`, the bytes the signature covers.
    pub signing_input: &'a str,

    /// base64url-encoded signature segment (may be empty for `alg: none`).
    pub signature: &'a str,
}

impl TokenSegments<'_> {
    /// The `alg` header value, if it is a string.
    #[must_use]
    pub fn alg(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// The `kid` header value.
    ///
    /// # Errors
    ///
    /// Returns `JwtValidationError::MissingKid` if `kid` is absent, not a
    /// string, or empty.
    pub fn kid(&self) -> Result<&str, JwtValidationError> {
        kid_from_header(&self.header)
    }
}

/// Split a compact JWS and decode its header and payload.
///
/// # Security
///
/// - Token size is checked BEFORE any decoding
/// - The payload is NOT verified; it is only decoded
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Not three segments, bad base64url, or header/payload
///   is not a JSON object
pub fn split_token(token: &str) -> Result<TokenSegments<'_>, JwtValidationError> {
    check_size(token)?;

    let mut parts = token.splitn(3, '.');
    let (Some(header_part), Some(payload_part), Some(signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: fewer than three segments");
        return Err(JwtValidationError::MalformedToken);
    };

    if signature.contains('.') {
        tracing::debug!(target: "common.jwt", "Token rejected: more than three segments");
        return Err(JwtValidationError::MalformedToken);
    }

    let header = decode_json_segment(header_part, "header")?;
    let payload = decode_json_segment(payload_part, "payload")?;

    // header_part and payload_part are adjacent slices of `token`
    let signing_input_len = header_part.len() + 1 + payload_part.len();
    let signing_input = token
        .get(..signing_input_len)
        .ok_or(JwtValidationError::MalformedToken)?;

    Ok(TokenSegments {
        header,
        payload,
        signing_input,
        signature,
    })
}

fn check_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

fn decode_json_segment(
    segment: &str,
    name: &'static str,
) -> Result<Map<String, Value>, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            tracing::debug!(target: "common.jwt", segment = name, "JWT segment is not a JSON object");
            Err(JwtValidationError::MalformedToken)
        }
        Err(e) => {
            tracing::debug!(target: "common.jwt", segment = name, error = %e, "Failed to parse JWT segment JSON");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

fn kid_from_header(header: &Map<String, Value>) -> Result<&str, JwtValidationError> {
    // Empty kid is rejected, it can never name a published key
    header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingKid)
}

/// Read a JWT `NumericDate` claim.
///
/// Accepts integers and fractional seconds (truncated). Returns `None` for
/// any other JSON type.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

// =============================================================================
// Time Claims
// =============================================================================

fn skew_secs(clock_skew: Duration) -> i64 {
    // clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Validate the `exp` (expiration) claim against `now` with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` if `now > exp + clock_skew`.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let latest_valid = exp.saturating_add(skew_secs(clock_skew));

    if now > latest_valid {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = clock_skew.as_secs(),
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Validate the `nbf` (not-before) claim against `now` with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_nbf = now.saturating_add(skew_secs(clock_skew));

    if nbf > max_nbf {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            max_allowed = max_nbf,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

/// Validate the `iat` (issued-at) claim against `now` with clock skew tolerance.
///
/// Rejects tokens with `iat` too far in the future, which indicates either
/// pre-generated tokens or badly drifted issuer clocks.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode an Ed25519 public key from JWK `x` field (base64url format).
///
/// # Errors
///
/// Returns `base64::DecodeError` if the base64url content cannot be decoded.
pub fn decode_ed25519_public_key_jwk(x_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(x_b64url)
}

// =============================================================================
// Tests
// =============================================================================
