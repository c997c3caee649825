//! Test server harness for E2E testing
//!
//! Provides `TestServer` for spawning real resource server instances that
//! trust a [`MockIdentityProvider`].

use crate::idp_mock::MockIdentityProvider;
use crate::token_builders::TEST_AUDIENCE;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use resource_server::auth::TokenGate;
use resource_server::config::Config;
use resource_server::observability::metrics::init_metrics_recorder;
use resource_server::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Origin the test server allows for CORS.
pub const TEST_ORIGIN: &str = "http://localhost:3000";

/// Global metrics handle shared by every test server in the process.
///
/// The global recorder can only be installed once; later calls (or other
/// test binaries that installed one first) fall back to a detached handle.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the resource server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_public_data() -> Result<()> {
///     let keypair = TestKeypair::new(1, "key-1");
///     let idp = MockIdentityProvider::start(&[&keypair]).await;
///     let server = TestServer::spawn(&idp).await?;
///
///     let response = reqwest::get(format!("{}/api/public-data", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestServer {
    addr: SocketAddr,
    config: Config,
    token_gate: Arc<TokenGate>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server trusting `idp`, with test defaults.
    pub async fn spawn(idp: &MockIdentityProvider) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(idp, &[]).await
    }

    /// Spawn a server trusting `idp`, overriding configuration variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Expect [`TEST_AUDIENCE`] and allow [`TEST_ORIGIN`]
    /// - Refresh keys for an unknown kid without a minimum interval
    /// - Start the HTTP server in the background, without warming the key cache
    pub async fn spawn_with_vars(
        idp: &MockIdentityProvider,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("OIDC_ISSUER".to_string(), idp.issuer()),
            ("OIDC_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("CORS_ALLOWED_ORIGIN".to_string(), TEST_ORIGIN.to_string()),
            (
                "JWKS_MIN_REFRESH_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ),
            ("IDP_HTTP_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let token_gate = Arc::new(TokenGate::new(&config));
        let state = Arc::new(AppState {
            config: config.clone(),
            token_gate: Arc::clone(&token_gate),
        });

        // Build routes using the server's real route builder
        let app = routes::build_routes(state, test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            token_gate,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The gate the server validates tokens with.
    pub fn token_gate(&self) -> &Arc<TokenGate> {
        &self.token_gate
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Abort the HTTP server task so each test releases its port
        self._handle.abort();
    }
}
