//! Test token builders
//!
//! Fluent builders for access-token payloads, plus raw token assembly for
//! tokens no real signer would produce.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Audience the test server is configured with.
pub const TEST_AUDIENCE: &str = "api://resource-server-tests";

/// Builder for test access-token payloads.
///
/// Defaults to a token for [`TEST_AUDIENCE`] with subject `test-subject`,
/// issued now and valid for one hour.
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder with sensible defaults for the given issuer.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now().timestamp();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(issuer));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("exp".to_string(), json!(now + 3600));
        Self { claims }
    }

    /// Set the subject (user ID).
    pub fn for_user(self, sub: &str) -> Self {
        self.with_claim("sub", json!(sub))
    }

    /// Set the display name.
    pub fn with_name(self, name: &str) -> Self {
        self.with_claim("name", json!(name))
    }

    /// Set the provider identifier claim.
    pub fn with_provider_id(self, provider_id: &str) -> Self {
        self.with_claim("provider_id", json!(provider_id))
    }

    /// Set scopes as a JSON array.
    pub fn with_scopes(self, scopes: &[&str]) -> Self {
        self.with_claim("scope", json!(scopes))
    }

    /// Set scopes as one space-delimited string.
    pub fn with_scope_string(self, scope: &str) -> Self {
        self.with_claim("scope", json!(scope))
    }

    /// Replace `aud` with any JSON shape (string or array).
    pub fn with_audience(self, audience: Value) -> Self {
        self.with_claim("aud", audience)
    }

    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set an absolute expiration timestamp.
    pub fn expires_at(self, exp: i64) -> Self {
        self.with_claim("exp", json!(exp))
    }

    /// Set expiration relative to now (negative for already expired).
    pub fn expires_in(self, seconds: i64) -> Self {
        self.expires_at(Utc::now().timestamp() + seconds)
    }

    pub fn not_before(self, nbf: i64) -> Self {
        self.with_claim("nbf", json!(nbf))
    }

    pub fn issued_at(self, iat: i64) -> Self {
        self.with_claim("iat", json!(iat))
    }

    /// Set an arbitrary claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim, including the defaults.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the payload.
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

/// Assemble `header.payload.signature` from raw parts without signing.
///
/// Used for tokens a real signer refuses to produce, such as `alg: none`.
pub fn unsigned_token(header: &Value, payload: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        signature
    )
}
