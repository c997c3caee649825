//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, validates it
//! through the `TokenGate`, and injects a `ClaimsContext` into request
//! extensions.

use crate::auth::{AuthError, ClaimsContext, TokenGate};
use crate::errors::ApiError;
use crate::observability::metrics::record_token_validation;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub token_gate: Arc<TokenGate>,
}

/// Split `Bearer <token>` into the token.
///
/// The scheme is matched case-insensitively. Returns `None` for any other
/// scheme or an empty token.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authentication middleware that validates bearer tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if token is missing or invalid
/// - Continues to next handler with `ClaimsContext` in extensions if token is valid
#[instrument(skip_all, name = "rs.middleware.auth")]
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            tracing::debug!(target: "rs.middleware.auth", "Missing or non-Bearer Authorization header");
            let err = AuthError::MissingAuthorizationHeader;
            record_token_validation(err.kind());
            err
        })?;

    let validated = state.token_gate.validate(token).await.map_err(|e| {
        tracing::info!(target: "rs.middleware.auth", reason = e.kind(), "Rejected bearer token");
        e
    })?;

    req.extensions_mut().insert(ClaimsContext::new(validated));

    Ok(next.run(req).await)
}
