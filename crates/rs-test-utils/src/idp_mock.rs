//! Mock OIDC identity provider
//!
//! Serves a discovery document and a JWKS from a local wiremock server.
//! The discovery document names the mock's own URL as the issuer, so tokens
//! signed by a [`TestKeypair`] with `iss = idp.issuer()` validate end to end.

use crate::crypto_fixtures::TestKeypair;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A local identity provider publishing test signing keys.
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    /// Start the provider publishing the given keys.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        let idp = Self {
            server: MockServer::start().await,
        };
        idp.mount(jwks_document(keys), Duration::ZERO).await;
        idp
    }

    /// Issuer identifier (the server's base URL, no trailing slash).
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Publish a new key set.
    ///
    /// Request counters restart from zero.
    pub async fn set_keys(&self, keys: &[&TestKeypair]) {
        self.set_keys_with_delay(keys, Duration::ZERO).await;
    }

    /// Publish a new key set served after `delay`.
    ///
    /// Request counters restart from zero.
    pub async fn set_keys_with_delay(&self, keys: &[&TestKeypair], delay: Duration) {
        self.server.reset().await;
        self.mount(jwks_document(keys), delay).await;
    }

    /// Keep discovery working but answer JWKS requests with `status`.
    ///
    /// Request counters restart from zero.
    pub async fn fail_jwks(&self, status: u16) {
        self.fail_jwks_with_delay(status, Duration::ZERO).await;
    }

    /// Like [`fail_jwks`](Self::fail_jwks), answering only after `delay`.
    pub async fn fail_jwks_with_delay(&self, status: u16, delay: Duration) {
        self.server.reset().await;
        self.mount_discovery().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// JWKS requests received since start or the last reset.
    pub async fn jwks_request_count(&self) -> usize {
        self.request_count(JWKS_PATH).await
    }

    /// Discovery requests received since start or the last reset.
    pub async fn discovery_request_count(&self) -> usize {
        self.request_count(DISCOVERY_PATH).await
    }

    async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    async fn mount(&self, jwks: Value, delay: Duration) {
        self.mount_discovery().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.issuer(),
                "jwks_uri": self.jwks_url(),
                "id_token_signing_alg_values_supported": ["EdDSA"]
            })))
            .mount(&self.server)
            .await;
    }
}

fn jwks_document(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk_json()).collect::<Vec<_>>() })
}
