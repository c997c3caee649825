//! HTTP routes for the resource server.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenGate;
use crate::config::{Config, CorsOrigin};
use crate::handlers;
use crate::middleware::auth::{require_auth, AuthState};
use crate::middleware::http_metrics::http_metrics_middleware;
use axum::{http::HeaderValue, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Overall per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Bearer-token validation gate.
    pub token_gate: Arc<TokenGate>,
}

/// CORS policy: the configured origin, any method, any header.
pub fn cors_layer(origin: &CorsOrigin) -> CorsLayer {
    let allow_origin = match origin {
        CorsOrigin::Any => AllowOrigin::any(),
        CorsOrigin::Exact(origin) => match HeaderValue::from_str(origin) {
            // Echoed only when the request's Origin matches
            Ok(value) => AllowOrigin::list([value]),
            Err(e) => {
                // Config validation makes this unreachable; deny rather than widen
                tracing::error!(target: "rs.routes", error = %e, "Invalid CORS origin, denying all cross-origin requests");
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        },
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (signing keys cached) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/public-data` - Public data - public
/// - `/api/data` - Protected data - requires a valid bearer token
///
/// Layer order, outermost first: HTTP metrics, timeout, trace, CORS, then
/// the route-level auth gate on protected routes. CORS preflights are
/// answered before the gate runs.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = AuthState {
        token_gate: Arc::clone(&state.token_gate),
    };
    let cors = cors_layer(&state.config.cors_allowed_origin);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/public-data", get(handlers::get_public_data))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/api/data", get(handlers::get_data))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        // HTTP metrics layer (outermost) - captures ALL responses including
        // preflights, 401s, and framework-level 404/405
        .layer(middleware::from_fn(http_metrics_middleware))
}
