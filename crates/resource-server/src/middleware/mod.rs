//! HTTP middleware.

pub mod auth;
pub mod http_metrics;
