//! JWKS client for fetching and caching the issuer's signing keys.
//!
//! Keys are located through OIDC discovery (or an explicit JWKS URL) and held
//! as an immutable [`SigningKeySet`] snapshot that is swapped wholesale on
//! refresh. Readers always see either the old or the new set.
//!
//! # Cache lifecycle
//!
//! - A snapshot older than `refresh_interval` is refreshed on next use.
//! - If that refresh fails, a snapshot younger than `max_staleness` keeps
//!   being served. Older snapshots fail closed.
//! - An unknown `kid` triggers one refresh, unless the snapshot is younger
//!   than `min_refresh_interval`.
//! - Refreshes are single-flight: callers queue on an async mutex and reuse
//!   the outcome of the attempt that finished while they waited, whether it
//!   installed a new snapshot or failed.
//! - A failed attempt suppresses further on-demand attempts for
//!   `min_refresh_interval`.
//!
//! # Security
//!
//! - Keys marked for encryption, keys without `kid`, and keys of unsupported
//!   types are never loaded
//! - HTTPS should be used in production (enforced by deployment config)

use crate::auth::discovery::{fetch_issuer_metadata, IssuerMetadata};
use crate::auth::AuthError;
use crate::config::Config;
use crate::observability::metrics::record_jwks_refresh;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Ed25519 public keys are always 32 bytes.
const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// JSON Web Key from the JWKS endpoint.
///
/// Every field is optional so one odd key cannot fail the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC", or "OKP").
    #[serde(default)]
    pub kty: Option<String>,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is bound to, if the provider pins one.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Key family, as named by the JWK `kty` member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Okp,
}

impl KeyFamily {
    fn from_kty(kty: &str) -> Option<Self> {
        match kty {
            "RSA" => Some(KeyFamily::Rsa),
            "EC" => Some(KeyFamily::Ec),
            "OKP" => Some(KeyFamily::Okp),
            _ => None,
        }
    }

    /// The key family an algorithm verifies with. `None` for HMAC.
    pub fn for_algorithm(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(KeyFamily::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(KeyFamily::Ec),
            Algorithm::EdDSA => Some(KeyFamily::Okp),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
        }
    }
}

/// One loaded public verification key.
#[derive(Clone)]
pub struct SigningKey {
    /// Key ID.
    pub kid: String,

    /// Key family from `kty`.
    pub family: KeyFamily,

    /// Algorithm pinned by the JWK, if any.
    pub alg: Option<Algorithm>,

    decoding_key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Load a JWK into verification key material.
    ///
    /// # Errors
    ///
    /// Returns a description of why the key was skipped.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let kid = jwk
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or("missing kid")?
            .to_string();

        if jwk.key_use.as_deref() == Some("enc") {
            return Err("encryption key".to_string());
        }

        let kty = jwk.kty.as_deref().ok_or("missing kty")?;
        let family = KeyFamily::from_kty(kty).ok_or_else(|| format!("unsupported kty {kty}"))?;

        let alg = match jwk.alg.as_deref() {
            Some(name) => {
                let alg = Algorithm::from_str(name)
                    .map_err(|_| format!("unsupported alg {name}"))?;
                if KeyFamily::for_algorithm(alg) != Some(family) {
                    return Err(format!("alg {name} does not match kty {kty}"));
                }
                Some(alg)
            }
            None => None,
        };

        let decoding_key = match family {
            KeyFamily::Rsa => {
                let n = jwk.n.as_deref().ok_or("RSA key missing n")?;
                let e = jwk.e.as_deref().ok_or("RSA key missing e")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| format!("invalid RSA components: {e}"))?
            }
            KeyFamily::Ec => {
                match jwk.crv.as_deref() {
                    Some("P-256" | "P-384") => {}
                    other => return Err(format!("unsupported EC curve {other:?}")),
                }
                let x = jwk.x.as_deref().ok_or("EC key missing x")?;
                let y = jwk.y.as_deref().ok_or("EC key missing y")?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| format!("invalid EC components: {e}"))?
            }
            KeyFamily::Okp => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(format!("unsupported OKP curve {:?}", jwk.crv));
                }
                let x = jwk.x.as_deref().ok_or("OKP key missing x")?;
                let public_key = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| format!("invalid Ed25519 key encoding: {e}"))?;
                if public_key.len() != ED25519_PUBLIC_KEY_LEN {
                    return Err(format!(
                        "Ed25519 key has {} bytes, expected {}",
                        public_key.len(),
                        ED25519_PUBLIC_KEY_LEN
                    ));
                }
                DecodingKey::from_ed_der(&public_key)
            }
        };

        Ok(Self {
            kid,
            family,
            alg,
            decoding_key,
        })
    }

    /// Verification key material.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Immutable map of key ID to verification key.
#[derive(Debug, Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document, skipping unusable keys.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedDiscoveryDocument` if no key is usable.
    pub fn from_jwks(jwks: &JwksResponse) -> Result<Self, AuthError> {
        let mut keys = HashMap::new();

        for jwk in &jwks.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "rs.auth.jwks",
                        kid = ?jwk.kid,
                        reason = %reason,
                        "Skipping JWK"
                    );
                }
            }
        }

        if keys.is_empty() {
            return Err(AuthError::MalformedDiscoveryDocument(
                "JWKS contains no usable signing key".to_string(),
            ));
        }

        Ok(Self { keys })
    }

    /// Look up a key by ID.
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in sorted order.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Timing policy of the key cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCachePolicy {
    /// Soft TTL: older snapshots are refreshed on next use.
    pub refresh_interval: Duration,

    /// Hard expiry: older snapshots are never served.
    pub max_staleness: Duration,

    /// Snapshots younger than this never refresh because of an unknown kid.
    /// Also the back-off after a failed on-demand refresh.
    pub min_refresh_interval: Duration,
}

impl KeyCachePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_interval: Duration::from_secs(config.jwks_refresh_interval_seconds),
            max_staleness: Duration::from_secs(config.jwks_max_staleness_seconds),
            min_refresh_interval: Duration::from_secs(config.jwks_min_refresh_interval_seconds),
        }
    }
}

/// One installed key set.
struct CachedKeySet {
    keys: Arc<SigningKeySet>,
    fetched_at: Instant,
    /// Incremented on every successful refresh.
    generation: u64,
}

impl CachedKeySet {
    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Outcome of the most recent fetch, kept under the refresh gate.
struct RefreshAttempt {
    finished_at: Instant,
    result: Result<Arc<CachedKeySet>, AuthError>,
}

/// JWKS client for fetching and caching the issuer's signing keys.
///
/// Thread-safe; shared by every request through the `TokenGate`.
pub struct JwksClient {
    /// Trusted issuer, used for discovery.
    issuer: String,

    /// Explicit JWKS URL that bypasses discovery.
    jwks_url_override: Option<String>,

    /// HTTP client with the IdP timeout applied.
    http_client: reqwest::Client,

    policy: KeyCachePolicy,

    /// Discovery result, kept until a JWKS fetch through it fails.
    metadata: RwLock<Option<Arc<IssuerMetadata>>>,

    /// Current key set snapshot.
    cache: RwLock<Option<Arc<CachedKeySet>>>,

    /// Serializes refreshes and holds the last attempt's outcome.
    refresh_gate: Mutex<Option<RefreshAttempt>>,
}

impl JwksClient {
    /// Create a new JWKS client.
    ///
    /// # Arguments
    ///
    /// * `issuer` - Trusted issuer URL (discovery base)
    /// * `jwks_url_override` - Fetch keys here instead of the discovered `jwks_uri`
    /// * `http_timeout` - Timeout applied to every IdP request
    /// * `policy` - Cache timing
    pub fn new(
        issuer: String,
        jwks_url_override: Option<String>,
        http_timeout: Duration,
        policy: KeyCachePolicy,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "rs.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            issuer,
            jwks_url_override,
            http_client,
            policy,
            metadata: RwLock::new(None),
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(None),
        }
    }

    /// Create a client from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.issuer.clone(),
            config.jwks_url.clone(),
            Duration::from_secs(config.idp_http_timeout_seconds),
            KeyCachePolicy::from_config(config),
        )
    }

    async fn snapshot(&self) -> Option<Arc<CachedKeySet>> {
        self.cache.read().await.clone()
    }

    /// Get a signing key by key ID.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnknownSigningKey` - the issuer does not publish `kid`
    /// - `AuthError::DiscoveryUnavailable` / `MalformedDiscoveryDocument` -
    ///   no usable key set could be obtained
    #[instrument(skip_all, name = "rs.auth.jwks.get_key", fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        let Some(current) = self.snapshot().await else {
            // Cold cache
            let fresh = self.refresh_unless_changed(None).await?;
            return lookup(&fresh, kid);
        };

        if current.age() >= self.policy.refresh_interval {
            return self.get_key_from_expired(current, kid).await;
        }

        if let Some(key) = current.keys.get(kid) {
            tracing::debug!(target: "rs.auth.jwks", kid = %kid, "JWKS cache hit");
            return Ok(key);
        }

        if current.age() < self.policy.min_refresh_interval {
            tracing::debug!(
                target: "rs.auth.jwks",
                kid = %kid,
                "Key not found in recently refreshed JWKS cache"
            );
            return Err(AuthError::UnknownSigningKey);
        }

        // Unknown kid may be a freshly rotated key
        match self.refresh_unless_changed(Some(current.generation)).await {
            Ok(fresh) => lookup(&fresh, kid),
            Err(e) => {
                tracing::warn!(
                    target: "rs.auth.jwks",
                    kid = %kid,
                    error = %e,
                    "Refresh for unknown key failed"
                );
                Err(AuthError::UnknownSigningKey)
            }
        }
    }

    async fn get_key_from_expired(
        &self,
        current: Arc<CachedKeySet>,
        kid: &str,
    ) -> Result<Arc<SigningKey>, AuthError> {
        match self.refresh_unless_changed(Some(current.generation)).await {
            Ok(fresh) => lookup(&fresh, kid),
            Err(e) if current.age() < self.policy.max_staleness => {
                tracing::warn!(
                    target: "rs.auth.jwks",
                    error = %e,
                    age_secs = current.age().as_secs(),
                    "JWKS refresh failed, serving stale keys"
                );
                lookup(&current, kid)
            }
            Err(e) => {
                tracing::error!(
                    target: "rs.auth.jwks",
                    error = %e,
                    age_secs = current.age().as_secs(),
                    "JWKS refresh failed and cached keys exceed max staleness"
                );
                Err(e)
            }
        }
    }

    /// Refresh unless another caller settled the question while this one
    /// waited for the refresh gate.
    ///
    /// A waiter reuses the snapshot a concurrent refresh installed, or the
    /// error of an attempt that finished after it queued. A failure younger
    /// than `min_refresh_interval` is returned without another fetch.
    async fn refresh_unless_changed(
        &self,
        seen_generation: Option<u64>,
    ) -> Result<Arc<CachedKeySet>, AuthError> {
        let queued_at = Instant::now();
        let mut last_attempt = self.refresh_gate.lock().await;

        if let Some(current) = self.snapshot().await {
            if Some(current.generation) != seen_generation {
                tracing::debug!(
                    target: "rs.auth.jwks",
                    generation = current.generation,
                    "Reusing key set installed by concurrent refresh"
                );
                return Ok(current);
            }
        }

        if let Some(attempt) = last_attempt.as_ref() {
            if attempt.finished_at > queued_at {
                tracing::debug!(
                    target: "rs.auth.jwks",
                    "Reusing outcome of refresh that completed while waiting"
                );
                return attempt.result.clone();
            }

            if attempt.result.is_err()
                && attempt.finished_at.elapsed() < self.policy.min_refresh_interval
            {
                tracing::debug!(
                    target: "rs.auth.jwks",
                    "Recent refresh failed, backing off"
                );
                return attempt.result.clone();
            }
        }

        let result = self.fetch_and_install().await;
        *last_attempt = Some(RefreshAttempt {
            finished_at: Instant::now(),
            result: result.clone(),
        });
        result
    }

    /// Force a refresh of the key set.
    ///
    /// Used by the background refresher and at startup. Ignores the failure
    /// back-off, but its outcome is shared with callers queued behind it.
    ///
    /// # Errors
    ///
    /// `AuthError::DiscoveryUnavailable` or `AuthError::MalformedDiscoveryDocument`.
    /// The previously cached set is left in place on error.
    #[instrument(skip_all, name = "rs.auth.jwks.refresh")]
    pub async fn refresh(&self) -> Result<Arc<SigningKeySet>, AuthError> {
        let mut last_attempt = self.refresh_gate.lock().await;
        let result = self.fetch_and_install().await;
        *last_attempt = Some(RefreshAttempt {
            finished_at: Instant::now(),
            result: result.clone(),
        });
        let installed = result?;
        Ok(Arc::clone(&installed.keys))
    }

    /// Must be called with the refresh gate held.
    async fn fetch_and_install(&self) -> Result<Arc<CachedKeySet>, AuthError> {
        let start = Instant::now();
        let result = self.fetch_key_set().await;
        let duration = start.elapsed();

        let keys = match result {
            Ok(keys) => {
                record_jwks_refresh("success", duration);
                keys
            }
            Err(e) => {
                record_jwks_refresh("error", duration);
                return Err(e);
            }
        };

        let mut cache = self.cache.write().await;
        let generation = cache.as_ref().map_or(1, |c| c.generation.wrapping_add(1));
        let installed = Arc::new(CachedKeySet {
            keys: Arc::new(keys),
            fetched_at: Instant::now(),
            generation,
        });
        *cache = Some(Arc::clone(&installed));

        tracing::info!(
            target: "rs.auth.jwks",
            key_count = installed.keys.len(),
            generation = generation,
            "JWKS cache refreshed"
        );

        Ok(installed)
    }

    async fn fetch_key_set(&self) -> Result<SigningKeySet, AuthError> {
        if let Some(url) = &self.jwks_url_override {
            return self.fetch_jwks(url).await;
        }

        let metadata = self.issuer_metadata().await?;
        let result = self.fetch_jwks(&metadata.jwks_uri).await;

        if result.is_err() {
            // The jwks_uri may have moved; discover again next time
            *self.metadata.write().await = None;
        }

        result
    }

    async fn issuer_metadata(&self) -> Result<Arc<IssuerMetadata>, AuthError> {
        if let Some(metadata) = self.metadata.read().await.as_ref() {
            return Ok(Arc::clone(metadata));
        }

        let metadata = Arc::new(fetch_issuer_metadata(&self.http_client, &self.issuer).await?);
        *self.metadata.write().await = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    async fn fetch_jwks(&self, url: &str) -> Result<SigningKeySet, AuthError> {
        tracing::debug!(target: "rs.auth.jwks", url = %url, "Fetching JWKS");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "rs.auth.jwks", error = %e, "Failed to fetch JWKS");
            AuthError::DiscoveryUnavailable(format!("JWKS request failed: {e}"))
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "rs.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(AuthError::DiscoveryUnavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "rs.auth.jwks", error = %e, "Failed to parse JWKS response");
            AuthError::MalformedDiscoveryDocument(format!("unparseable JWKS: {e}"))
        })?;

        SigningKeySet::from_jwks(&jwks)
    }

    /// Whether a key set within the hard expiry is cached.
    pub async fn has_usable_keys(&self) -> bool {
        self.snapshot()
            .await
            .is_some_and(|c| c.age() < self.policy.max_staleness)
    }
}

fn lookup(snapshot: &CachedKeySet, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
    snapshot.keys.get(kid).ok_or_else(|| {
        tracing::warn!(target: "rs.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        AuthError::UnknownSigningKey
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 32 bytes of 0x01, base64url
    const ED25519_X: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE";

    fn okp_jwk(kid: &str) -> serde_json::Value {
        json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": ED25519_X, "alg": "EdDSA", "use": "sig"})
    }

    fn policy(refresh_ms: u64, staleness_ms: u64, min_refresh_ms: u64) -> KeyCachePolicy {
        KeyCachePolicy {
            refresh_interval: Duration::from_millis(refresh_ms),
            max_staleness: Duration::from_millis(staleness_ms),
            min_refresh_interval: Duration::from_millis(min_refresh_ms),
        }
    }

    async fn mount_jwks(server: &MockServer, keys: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(server)
            .await;
    }

    fn client_for(server: &MockServer, policy: KeyCachePolicy) -> JwksClient {
        JwksClient::new(
            server.uri(),
            Some(format!("{}/keys", server.uri())),
            Duration::from_secs(2),
            policy,
        )
    }

    async fn jwks_requests(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/keys")
            .count()
    }

    #[test]
    fn test_jwk_deserialization() {
        let jwk: Jwk = serde_json::from_value(okp_jwk("test-key-01")).unwrap();

        assert_eq!(jwk.kty.as_deref(), Some("OKP"));
        assert_eq!(jwk.kid.as_deref(), Some("test-key-01"));
        assert_eq!(jwk.crv.as_deref(), Some("Ed25519"));
        assert_eq!(jwk.alg.as_deref(), Some("EdDSA"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_signing_key_from_each_family() {
        let okp: Jwk = serde_json::from_value(okp_jwk("ed")).unwrap();
        let key = SigningKey::from_jwk(&okp).unwrap();
        assert_eq!(key.family, KeyFamily::Okp);
        assert_eq!(key.alg, Some(Algorithm::EdDSA));

        let rsa: Jwk = serde_json::from_value(json!({
            "kty": "RSA", "kid": "rsa", "n": "xfW71Unq36yYzR6HUtWHdNkW0d5s_GtEkxb30NjlJWWd5OahiHCtJjSCyhAN9oKS-6d76KNFoxotp3oCBPj-hg4uCF3tkxQgZma55VGL2HaDvOIQx_0H9Zn_Lg20Tv-bSQWX5B5eGC_TzKWq1xRa1t1bLSlNH49kAJPW4lVuQzp9lcbL0wFGYgziQwSL1RfbfsPD8lgmYj_vcrGzWjK7NUjH5ERaCZ6eKMiz1x1Ang65uu-PS-1j97w7h099bYiUSIPQ2gLChsr84U3B9tV5w7s6q69r7mSIX14lqj7au09TCwkZTW0cAh2CQGheASCa9GR5ZftJcXJxHo2ajy_ymA",
            "e": "AQAB", "alg": "RS256"
        }))
        .unwrap();
        let key = SigningKey::from_jwk(&rsa).unwrap();
        assert_eq!(key.family, KeyFamily::Rsa);

        let ec: Jwk = serde_json::from_value(json!({
            "kty": "EC", "kid": "ec", "crv": "P-256",
            "x": "ECPGRVakjl_1kj_ErEwScSsGEwTQ-fA0NlTGnzRs-hA",
            "y": "d5m7ssa9Be_ixGNFB0dc5NU-ZHKivEWJvJ3v-nkMJgw"
        }))
        .unwrap();
        let key = SigningKey::from_jwk(&ec).unwrap();
        assert_eq!(key.family, KeyFamily::Ec);
        assert!(key.alg.is_none());
    }

    #[test]
    fn test_signing_key_rejections() {
        let cases = [
            json!({"kty": "OKP", "crv": "Ed25519", "x": ED25519_X}),
            json!({"kty": "OKP", "crv": "Ed25519", "kid": "", "x": ED25519_X}),
            json!({"kty": "OKP", "crv": "Ed25519", "kid": "enc", "x": ED25519_X, "use": "enc"}),
            json!({"kty": "oct", "kid": "hmac", "k": "c2VjcmV0"}),
            json!({"kty": "OKP", "crv": "X25519", "kid": "x", "x": ED25519_X}),
            json!({"kty": "OKP", "crv": "Ed25519", "kid": "short", "x": "AQID"}),
            json!({"kty": "OKP", "crv": "Ed25519", "kid": "bad", "x": "!!!"}),
            json!({"kty": "OKP", "crv": "Ed25519", "kid": "mismatch", "x": ED25519_X, "alg": "RS256"}),
            json!({"kty": "RSA", "kid": "no-e", "n": "AQAB"}),
        ];

        for case in cases {
            let jwk: Jwk = serde_json::from_value(case.clone()).unwrap();
            assert!(SigningKey::from_jwk(&jwk).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn test_signing_key_debug_omits_material() {
        let jwk: Jwk = serde_json::from_value(okp_jwk("ed")).unwrap();
        let debug = format!("{:?}", SigningKey::from_jwk(&jwk).unwrap());
        assert!(debug.contains("ed"));
        assert!(!debug.contains(ED25519_X));
    }

    #[test]
    fn test_key_set_skips_unusable_keys() {
        let jwks: JwksResponse = serde_json::from_value(json!({
            "keys": [
                okp_jwk("good"),
                {"kty": "OKP", "crv": "Ed25519", "kid": "enc", "x": ED25519_X, "use": "enc"},
                {"kty": "oct", "kid": "hmac"}
            ]
        }))
        .unwrap();

        let set = SigningKeySet::from_jwks(&jwks).unwrap();
        assert_eq!(set.kids(), vec!["good"]);
        assert!(set.get("enc").is_none());
    }

    #[test]
    fn test_key_set_with_no_usable_key_is_malformed() {
        let jwks: JwksResponse = serde_json::from_value(json!({"keys": []})).unwrap();
        assert!(matches!(
            SigningKeySet::from_jwks(&jwks),
            Err(AuthError::MalformedDiscoveryDocument(_))
        ));
    }

    #[test]
    fn test_family_for_algorithm() {
        assert_eq!(KeyFamily::for_algorithm(Algorithm::PS384), Some(KeyFamily::Rsa));
        assert_eq!(KeyFamily::for_algorithm(Algorithm::ES256), Some(KeyFamily::Ec));
        assert_eq!(KeyFamily::for_algorithm(Algorithm::EdDSA), Some(KeyFamily::Okp));
        assert_eq!(KeyFamily::for_algorithm(Algorithm::HS256), None);
    }

    #[tokio::test]
    async fn test_get_key_cold_cache_fetches_once() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(60_000, 120_000, 0));

        assert!(!client.has_usable_keys().await);
        assert_eq!(client.get_key("k1").await.unwrap().kid, "k1");
        assert_eq!(client.get_key("k1").await.unwrap().kid, "k1");
        assert!(client.has_usable_keys().await);
        assert_eq!(jwks_requests(&server).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_within_min_interval_skips_network() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(60_000, 120_000, 60_000));

        client.refresh().await.unwrap();
        let result = client.get_key("rotated").await;

        assert!(matches!(result, Err(AuthError::UnknownSigningKey)));
        assert_eq!(jwks_requests(&server).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refreshes_and_finds_rotated_key() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(60_000, 120_000, 0));
        client.refresh().await.unwrap();

        server.reset().await;
        mount_jwks(&server, json!([okp_jwk("k1"), okp_jwk("k2")])).await;

        assert_eq!(client.get_key("k2").await.unwrap().kid, "k2");
        assert!(matches!(
            client.get_key("k3").await,
            Err(AuthError::UnknownSigningKey)
        ));
    }

    #[tokio::test]
    async fn test_stale_keys_served_while_idp_down() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(50, 60_000, 0));
        client.refresh().await.unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(client.get_key("k1").await.unwrap().kid, "k1");
        assert!(client.has_usable_keys().await);
    }

    #[tokio::test]
    async fn test_keys_beyond_max_staleness_fail_closed() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(50, 100, 0));
        client.refresh().await.unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(matches!(
            client.get_key("k1").await,
            Err(AuthError::DiscoveryUnavailable(_))
        ));
        assert!(!client.has_usable_keys().await);
        // Cached set is kept for when the IdP comes back
        assert!(client.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_cold_lookups_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "keys": [okp_jwk("k1")] }))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        let client = Arc::new(client_for(&server, policy(60_000, 120_000, 0)));

        let lookups = (0..16).map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key("k1").await })
        });
        for handle in futures::future::join_all(lookups).await {
            assert_eq!(handle.unwrap().unwrap().kid, "k1");
        }

        assert_eq!(jwks_requests(&server).await, 1);
    }

    async fn mount_failing_jwks(server: &MockServer, delay: Duration) {
        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(503).set_delay(delay))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_concurrent_stale_lookups_share_one_failed_refresh() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = Arc::new(client_for(&server, policy(50, 60_000, 0)));
        client.refresh().await.unwrap();

        mount_failing_jwks(&server, Duration::from_millis(200)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let lookups = (0..8).map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key("k1").await })
        });
        for handle in futures::future::join_all(lookups).await {
            assert_eq!(handle.unwrap().unwrap().kid, "k1");
        }

        assert_eq!(jwks_requests(&server).await, 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_concurrent_unknown_kids_share_one_failed_refresh() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = Arc::new(client_for(&server, policy(60_000, 120_000, 10)));
        client.refresh().await.unwrap();

        mount_failing_jwks(&server, Duration::from_millis(200)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let lookups = (0..8).map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key(&format!("random-{i}")).await })
        });
        for handle in futures::future::join_all(lookups).await {
            assert!(matches!(
                handle.unwrap(),
                Err(AuthError::UnknownSigningKey)
            ));
        }

        assert_eq!(jwks_requests(&server).await, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_backs_off_for_min_interval() {
        let server = MockServer::start().await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;
        let client = client_for(&server, policy(50, 60_000, 60_000));
        client.refresh().await.unwrap();

        mount_failing_jwks(&server, Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // All served stale; only the first one asks the IdP
        for _ in 0..3 {
            assert_eq!(client.get_key("k1").await.unwrap().kid, "k1");
        }
        assert_eq!(jwks_requests(&server).await, 1);

        // Forced refresh ignores the back-off
        assert!(client.refresh().await.is_err());
        assert_eq!(jwks_requests(&server).await, 2);
    }

    #[tokio::test]
    async fn test_discovery_used_when_no_override() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/keys", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_jwks(&server, json!([okp_jwk("k1")])).await;

        let client = JwksClient::new(
            server.uri(),
            None,
            Duration::from_secs(2),
            policy(60_000, 120_000, 0),
        );

        client.refresh().await.unwrap();
        client.refresh().await.unwrap();
        assert_eq!(jwks_requests(&server).await, 2);
    }

    #[tokio::test]
    async fn test_failed_jwks_fetch_forces_rediscovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/keys", server.uri())
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = JwksClient::new(
            server.uri(),
            None,
            Duration::from_secs(2),
            policy(60_000, 120_000, 0),
        );

        assert!(client.refresh().await.is_err());
        assert!(client.refresh().await.is_err());
        // expect(2) on the discovery mock is verified when the server drops
    }
}
