//! Background expiry of stale pending transfers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use super::WalletService;

/// Periodically cancels pending transfers older than the service TTL.
///
/// Owned by the process lifecycle; stops when the shutdown channel flips
/// to `true`.
pub struct PendingSweeper {
    service: Arc<WalletService>,
    interval: Duration,
}

impl PendingSweeper {
    pub fn new(service: Arc<WalletService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run until shutdown. A failed sweep is logged and retried on the next tick.
    #[instrument(skip_all, fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("🧹 Starting pending transfer sweeper");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match self.service.expire_pending_transfers(Utc::now()).await {
                        Ok(0) => debug!("No expired transfers"),
                        Ok(count) => debug!(count, "Sweep complete"),
                        Err(e) => error!(error = ?e, "❌ Pending transfer sweep failed"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Sweeper stopping");
                        return;
                    }
                }
            }
        }
    }
}
