//! Common utilities shared across resource server crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (structural parsing, size limits, time claims)
pub mod jwt;
