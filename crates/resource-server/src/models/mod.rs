//! API response models.

use crate::auth::Claim;
use serde::Serialize;

/// Response for `GET /api/data`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse {
    /// Greeting, personalized when the token carries a display name.
    pub message: String,

    /// `sub` of the token.
    pub user_id: Option<String>,

    /// Value of the configured provider-id claim.
    pub provider_id: Option<String>,

    /// Granted scopes joined with `", "`.
    pub granted_scopes: String,

    /// Every flattened claim of the token.
    pub claims: Vec<Claim>,
}

/// Response for `GET /api/public-data`.
#[derive(Debug, Clone, Serialize)]
pub struct PublicDataResponse {
    pub message: &'static str,
}

/// Readiness probe response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// Service readiness status ("ready" or "not_ready").
    pub status: &'static str,

    /// Signing key availability ("available" or "unavailable").
    pub signing_keys: &'static str,

    /// Error message (generic, no infrastructure details).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
