//! Metrics definitions for the resource server.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rs_` prefix for the resource server
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: known routes plus `other`
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: `success` plus one value per `AuthError` kind
//! - `status` on JWKS refresh: `success` or `error`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("rs_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // IdP round trips dominate refresh latency; timeout caps it at 60s
        .set_buckets_for_metric(
            Matcher::Prefix("rs_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `rs_http_requests_total`, `rs_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses, including 401s from the auth gate and
/// framework-level 404/405 responses.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("rs_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("rs_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a bounded set of endpoint labels.
///
/// Unknown paths (scanners, typos) all collapse into `other`.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/data" => "/api/data",
        "/api/public-data" => "/api/public-data",
        _ => "other",
    }
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of one bearer-token check.
///
/// Metric: `rs_token_validations_total`
/// Labels: `outcome` (`success` or an `AuthError` kind)
pub fn record_token_validation(outcome: &'static str) {
    counter!("rs_token_validations_total",
        "outcome" => outcome
    )
    .increment(1);
}

// ============================================================================
// Signing Key Refresh Metrics
// ============================================================================

/// Record one JWKS refresh attempt.
///
/// Metrics:
/// - `rs_jwks_refresh_total` counter (labels: `status`)
/// - `rs_jwks_refresh_duration_seconds` histogram (no labels)
///
/// # Arguments
///
/// * `status` - "success" or "error"
/// * `duration` - Time spent on discovery plus the JWKS fetch
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("rs_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("rs_jwks_refresh_total",
        "status" => status
    )
    .increment(1);
}
