//! HTTP request handlers for the resource server.

pub mod data;
pub mod health;
pub mod metrics;
pub mod public;

pub use data::get_data;
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use public::get_public_data;
