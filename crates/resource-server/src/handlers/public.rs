//! Public data handler.

use crate::models::PublicDataResponse;
use axum::Json;

/// Handler for GET /api/public-data
///
/// No authentication; the body never varies.
pub async fn get_public_data() -> Json<PublicDataResponse> {
    Json(PublicDataResponse {
        message: "This is public data.",
    })
}
