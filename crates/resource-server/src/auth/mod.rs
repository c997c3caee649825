//! Bearer-token authentication.
//!
//! - `discovery` - OIDC provider metadata
//! - `jwks` - signing key fetching and caching
//! - `gate` - token validation
//! - `claims` - validated token and request-scoped claims

pub mod claims;
pub mod discovery;
pub mod error;
pub mod gate;
pub mod jwks;

pub use claims::{Claim, ClaimsContext, ValidatedToken};
pub use error::AuthError;
pub use gate::TokenGate;
pub use jwks::{JwksClient, KeyCachePolicy, SigningKey, SigningKeySet};
