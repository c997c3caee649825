//! Signing key refresher background task.
//!
//! Warms the key cache at startup and refreshes it every refresh interval,
//! so request-path lookups rarely have to wait on the identity provider.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the token
//! is cancelled, the task completes its current iteration and exits cleanly.

use crate::auth::TokenGate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Start the key refresher background task.
///
/// The first tick fires immediately. Failed refreshes are logged and retried
/// on the next tick; cached keys are left untouched.
///
/// # Arguments
///
/// * `token_gate` - Gate whose key cache to keep warm
/// * `refresh_interval` - Time between refreshes (the cache's soft TTL)
/// * `cancel_token` - Token for graceful shutdown
///
/// # Returns
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "rs.task.key_refresh")]
pub async fn start_key_refresher(
    token_gate: Arc<TokenGate>,
    refresh_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "rs.task.key_refresh",
        refresh_interval_secs = refresh_interval.as_secs(),
        "Starting key refresher task"
    );

    let mut interval = tokio::time::interval(refresh_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match token_gate.refresh_keys().await {
                    Ok(keys) => {
                        info!(
                            target: "rs.task.key_refresh",
                            key_count = keys.len(),
                            "Signing keys refreshed"
                        );
                    }
                    Err(e) => {
                        // Cached keys stay in place until max staleness
                        warn!(
                            target: "rs.task.key_refresh",
                            reason = e.kind(),
                            error = %e,
                            "Failed to refresh signing keys"
                        );
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "rs.task.key_refresh",
                    "Key refresher task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "rs.task.key_refresh",
        "Key refresher task stopped"
    );
}
