//! Protected Resource Server Library
//!
//! Validates OAuth2/OIDC bearer access tokens issued by an external identity
//! provider and serves a small API gated on that validation.
//!
//! # Request flow
//!
//! ```text
//! metrics -> timeout -> trace -> CORS -> require_auth (TokenGate) -> handler
//! ```
//!
//! # Modules
//!
//! - `auth` - Key discovery and caching, token validation, claims access
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth gate and HTTP metrics middleware
//! - `models` - Response models
//! - `observability` - Metrics definitions
//! - `routes` - Axum router setup
//! - `tasks` - Background key refresher

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod tasks;
