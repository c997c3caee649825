//! OIDC discovery for the trusted issuer.
//!
//! Fetches `<issuer>/.well-known/openid-configuration` and extracts the
//! fields the key cache needs.

use crate::auth::AuthError;
use serde::Deserialize;
use tracing::instrument;

/// Well-known path of the discovery document relative to the issuer.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The subset of the provider metadata this server consumes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuerMetadata {
    /// Issuer identifier as advertised by the provider.
    pub issuer: String,

    /// Location of the provider's signing keys.
    pub jwks_uri: String,

    /// Signing algorithms the provider says it uses (informational).
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Discovery document URL for an issuer.
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{}", issuer.trim_end_matches('/'), DISCOVERY_PATH)
}

fn same_issuer(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Fetch and check the issuer's discovery document.
///
/// # Errors
///
/// - `AuthError::DiscoveryUnavailable` - connection failure, timeout, or non-2xx status
/// - `AuthError::MalformedDiscoveryDocument` - unparseable body, empty `jwks_uri`,
///   or an `issuer` that is not the configured one
#[instrument(skip_all, name = "rs.auth.discovery")]
pub async fn fetch_issuer_metadata(
    http_client: &reqwest::Client,
    issuer: &str,
) -> Result<IssuerMetadata, AuthError> {
    let url = discovery_url(issuer);
    tracing::debug!(target: "rs.auth.discovery", url = %url, "Fetching discovery document");

    let response = http_client.get(&url).send().await.map_err(|e| {
        tracing::error!(target: "rs.auth.discovery", error = %e, "Failed to fetch discovery document");
        AuthError::DiscoveryUnavailable(format!("discovery request failed: {e}"))
    })?;

    if !response.status().is_success() {
        tracing::error!(
            target: "rs.auth.discovery",
            status = %response.status(),
            "Discovery endpoint returned error"
        );
        return Err(AuthError::DiscoveryUnavailable(format!(
            "discovery endpoint returned {}",
            response.status()
        )));
    }

    let metadata: IssuerMetadata = response.json().await.map_err(|e| {
        tracing::error!(target: "rs.auth.discovery", error = %e, "Failed to parse discovery document");
        AuthError::MalformedDiscoveryDocument(format!("unparseable discovery document: {e}"))
    })?;

    if !same_issuer(&metadata.issuer, issuer) {
        tracing::error!(
            target: "rs.auth.discovery",
            advertised = %metadata.issuer,
            expected = %issuer,
            "Discovery document issuer does not match configured issuer"
        );
        return Err(AuthError::MalformedDiscoveryDocument(
            "discovery document issuer mismatch".to_string(),
        ));
    }

    if metadata.jwks_uri.trim().is_empty() {
        return Err(AuthError::MalformedDiscoveryDocument(
            "discovery document has empty jwks_uri".to_string(),
        ));
    }

    tracing::info!(
        target: "rs.auth.discovery",
        jwks_uri = %metadata.jwks_uri,
        algorithms = ?metadata.id_token_signing_alg_values_supported,
        "Discovered issuer metadata"
    );

    Ok(metadata)
}
