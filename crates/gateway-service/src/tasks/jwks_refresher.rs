//! Key-set refresher background task.
//!
//! Calls [`KeySource::refresh_now`] every interval. The first tick fires one
//! interval after start because startup already performed an eager refresh.
//! Failed refreshes are logged by the key source and the previous keys stay
//! cached, so the loop never exits on error.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A refresh in
//! progress at that moment is dropped; the cache is only written after a
//! complete, successful fetch.

use crate::auth::KeySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Start the key-set refresher.
///
/// # Returns
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "gateway.task.jwks_refresher")]
pub async fn start_jwks_refresher(
    key_source: Arc<KeySource>,
    refresh_interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gateway.task.jwks_refresher",
        interval_secs = refresh_interval.as_secs_f64(),
        "Starting key-set refresher task"
    );

    let mut interval = interval_at(Instant::now() + refresh_interval, refresh_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = key_source.refresh_now().await;
                debug!(
                    target: "gateway.task.jwks_refresher",
                    refreshed = outcome.is_refreshed(),
                    "Scheduled key-set refresh finished"
                );
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "gateway.task.jwks_refresher",
                    "Key-set refresher received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "gateway.task.jwks_refresher", "Key-set refresher task stopped");
}
