//! Protected Resource Server
//!
//! Entry point. Validates bearer tokens from the configured OIDC issuer and
//! serves `/api/data` and `/api/public-data`.

use resource_server::auth::TokenGate;
use resource_server::config::Config;
use resource_server::observability::metrics::init_metrics_recorder;
use resource_server::routes::{self, AppState};
use resource_server::tasks::start_key_refresher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default drain period after a shutdown signal.
const DEFAULT_DRAIN_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resource_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resource server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_url = ?config.jwks_url,
        allowed_algorithms = ?config.allowed_algorithms,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    // Metrics recorder must exist before anything is recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let token_gate = Arc::new(TokenGate::new(&config));

    // Warm and periodically refresh the signing key cache
    let shutdown_token = CancellationToken::new();
    let refresher = tokio::spawn(start_key_refresher(
        Arc::clone(&token_gate),
        Duration::from_secs(config.jwks_refresh_interval_seconds),
        shutdown_token.child_token(),
    ));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState { config, token_gate });
    let app = routes::build_routes(state, metrics_handle);

    // Bind before serving to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Resource server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown_token.cancel();
    if let Err(e) = refresher.await {
        warn!("Key refresher task ended abnormally: {}", e);
    }

    info!("Resource server shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("RS_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DRAIN_SECONDS);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (RS_DRAIN_SECONDS=0)");
    }
}
