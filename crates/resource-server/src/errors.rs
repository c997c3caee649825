//! Resource server error types.
//!
//! Every gate rejection maps to 401 via the `IntoResponse` impl. The message
//! returned to clients is the same for every failure kind. The kind itself
//! is logged server-side.

use crate::auth::AuthError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned for every rejected credential.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

const BEARER_REALM: &str = "resource-server";

/// Resource server API error type.
///
/// Both variants are 401 Unauthorized; they differ only in the
/// `WWW-Authenticate` challenge.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A credential was presented and rejected. Carries the `AuthError` kind.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// No bearer credential was presented.
    #[error("Missing credentials")]
    MissingCredentials,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthorizationHeader => ApiError::MissingCredentials,
            other => ApiError::InvalidToken(other.kind().to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let challenge = match &self {
            ApiError::InvalidToken(_) => format!(
                "Bearer realm=\"{}\", error=\"invalid_token\"",
                BEARER_REALM
            ),
            // No error attribute when the request carried no credentials at all
            ApiError::MissingCredentials => format!("Bearer realm=\"{}\"", BEARER_REALM),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: "INVALID_TOKEN".to_string(),
                message: INVALID_TOKEN_MESSAGE.to_string(),
            },
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(error_response)).into_response();

        if let Ok(header_value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header_value);
        }

        response
    }
}
