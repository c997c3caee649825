//! Token validation failures.
//!
//! Every variant is a reason to reject the request with `401`. The variant is
//! only ever logged and counted; clients see one generic message.

use common::jwt::JwtValidationError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token is structurally malformed")]
    MalformedToken,

    #[error("Token signing key is not published by the issuer")]
    UnknownSigningKey,

    #[error("Token signature verification failed")]
    InvalidSignature,

    #[error("Token signing algorithm is not allowed")]
    DisallowedAlgorithm,

    #[error("Token issuer is not trusted")]
    IssuerMismatch,

    #[error("Token audience does not include this resource")]
    AudienceMismatch,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not yet valid")]
    TokenNotYetValid,

    #[error("Identity provider unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("Malformed discovery document: {0}")]
    MalformedDiscoveryDocument(String),

    #[error("Missing bearer credentials")]
    MissingAuthorizationHeader,
}

impl AuthError {
    /// Stable label used for log fields and the `outcome` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnknownSigningKey => "unknown_signing_key",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::DisallowedAlgorithm => "disallowed_algorithm",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::DiscoveryUnavailable(_) => "discovery_unavailable",
            AuthError::MalformedDiscoveryDocument(_) => "malformed_discovery_document",
            AuthError::MissingAuthorizationHeader => "missing_authorization_header",
        }
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => AuthError::MalformedToken,
            JwtValidationError::Expired => AuthError::TokenExpired,
            JwtValidationError::NotYetValid | JwtValidationError::IatTooFarInFuture => {
                AuthError::TokenNotYetValid
            }
        }
    }
}
