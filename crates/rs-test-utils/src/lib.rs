//! # Resource Server Test Utilities
//!
//! Shared test utilities for the resource server.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 keys, JWK rendering, signing)
//! - Test token builders (TestTokenBuilder, raw token assembly)
//! - A wiremock-backed identity provider (discovery + JWKS)
//! - Server test harness (TestServer for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rs_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let keypair = TestKeypair::new(1, "key-1");
//!     let idp = MockIdentityProvider::start(&[&keypair]).await;
//!     let server = TestServer::spawn(&idp).await?;
//!
//!     let token = keypair.sign(&TestTokenBuilder::new(&idp.issuer()).for_user("alice").build());
//!     // GET {server.url()}/api/data with `Authorization: Bearer {token}`
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod idp_mock;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use idp_mock::*;
pub use server_harness::*;
pub use token_builders::*;
