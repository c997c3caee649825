//! Observability module for the resource server.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
