//! Background task closing expired leases.
//!
//! Owned by the process: started once the cache exists and stopped through a
//! [`CancellationToken`] before [`LeaseCache::shutdown`] runs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LeaseCache;

/// Default delay between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(7 * 60);

pub struct SweepDaemon {
    cache: Arc<LeaseCache>,
    interval: Duration,
}

impl SweepDaemon {
    pub fn new(cache: Arc<LeaseCache>) -> Self {
        Self {
            cache,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sets a custom sweep interval. Zero is bumped to one millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Lease sweep daemon starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Lease sweep daemon shutting down");
                    break;
                }

                _ = interval.tick() => {
                    // Releasing data units touches storage, keep it off the async workers.
                    let cache = Arc::clone(&self.cache);
                    match tokio::task::spawn_blocking(move || cache.sweep()).await {
                        Ok(report) if report.evicted > 0 || !report.executions_released.is_empty() => {
                            info!(
                                evicted = report.evicted,
                                failed_releases = report.failed_releases,
                                executions_released = report.executions_released.len(),
                                "Expired leases swept"
                            );
                        }
                        Ok(_) => debug!("Sweep found nothing to close"),
                        Err(e) => warn!(error = %e, "Sweep task failed"),
                    }
                }
            }
        }
    }
}
