//! Prefetch Scheduler Task
//!
//! Re-runs a fixed set of prefetch jobs on an interval, off the request path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::strategy::{CacheEngine, PrefetchJob};

/// Spawns a task that prefetches `jobs` immediately and then every
/// `interval_secs` seconds.
///
/// # Returns
/// A JoinHandle the host aborts on shutdown.
pub fn spawn_prefetch_task(
    engine: Arc<CacheEngine>,
    jobs: Vec<PrefetchJob>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        info!(
            "Starting prefetch task for {} key(s) every {} seconds",
            jobs.len(),
            interval_secs
        );

        loop {
            ticker.tick().await;
            let report = engine.prefetch(&jobs).await;
            if report.failed > 0 {
                warn!("Prefetch: {} of {} job(s) failed", report.failed, jobs.len());
            } else {
                debug!(
                    "Prefetch: {} loaded, {} skipped",
                    report.loaded, report.skipped
                );
            }
        }
    })
}
