//! Protected data handler.
//!
//! Returns the caller's identity and the claims of the validated token.

use crate::auth::ClaimsContext;
use crate::models::DataResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/data
///
/// Requires valid authentication via the auth middleware. No scope is
/// required.
///
/// ## Response
///
/// ```json
/// {
///   "message": "Hello alice, this is protected data.",
///   "userId": "u1",
///   "providerId": "p1",
///   "grantedScopes": "openid, profile",
///   "claims": [{"type": "sub", "value": "u1"}]
/// }
/// ```
#[instrument(skip_all, name = "rs.handlers.data")]
pub async fn get_data(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<ClaimsContext>,
) -> Json<DataResponse> {
    tracing::debug!(target: "rs.handlers.data", "Returning protected data");

    Json(build_data_response(&claims, &state.config.provider_id_claim))
}

fn build_data_response(claims: &ClaimsContext, provider_id_claim: &str) -> DataResponse {
    let message = match claims.display_name() {
        Some(name) => format!("Hello {name}, this is protected data."),
        None => "This is protected data.".to_string(),
    };

    DataResponse {
        message,
        user_id: claims.subject().map(ToString::to_string),
        provider_id: claims.find_first(provider_id_claim).map(ToString::to_string),
        granted_scopes: claims.scopes().join(", "),
        claims: claims.claims().to_vec(),
    }
}
