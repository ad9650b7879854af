//! Proactive cache population.
//!
//! A prefetch value is stamped with the time its load *started*. If a caller
//! wrote the key after that, the cached entry is newer than the prefetched
//! one and is left in place.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::CacheKey;
use crate::error::Result;
use crate::strategy::CacheEngine;

// == Prefetch Source ==
/// Loads the current value for a prefetched key.
#[async_trait]
pub trait PrefetchSource: Send + Sync + 'static {
    async fn load(&self) -> anyhow::Result<serde_json::Value>;
}

#[async_trait]
impl<F, Fut> PrefetchSource for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn load(&self) -> anyhow::Result<serde_json::Value> {
        (self)().await
    }
}

/// One key to keep warm.
#[derive(Clone)]
pub struct PrefetchJob {
    pub key: CacheKey,
    /// TTL in seconds (`None` = engine default)
    pub ttl: Option<u64>,
    pub source: Arc<dyn PrefetchSource>,
}

impl PrefetchJob {
    pub fn new(key: CacheKey, ttl: Option<u64>, source: impl PrefetchSource) -> Self {
        Self {
            key,
            ttl,
            source: Arc::new(source),
        }
    }
}

/// Counts for one prefetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    /// Entries written
    pub loaded: usize,
    /// Entries left alone because a newer value was already cached
    pub skipped: usize,
    /// Jobs whose source or cache write failed
    pub failed: usize,
}

enum Outcome {
    Loaded,
    Skipped,
}

impl CacheEngine {
    // == Prefetch ==
    /// Loads every job's value and writes it to the cache unless a newer
    /// value got there first. Failures are logged and counted, never returned.
    pub async fn prefetch(&self, jobs: &[PrefetchJob]) -> PrefetchReport {
        let mut report = PrefetchReport::default();

        for job in jobs {
            match self.prefetch_one(job).await {
                Ok(Outcome::Loaded) => report.loaded += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!("Prefetch of '{}' failed: {}", job.key, err);
                    self.metrics.record_error();
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Prefetch run: {} loaded, {} skipped, {} failed",
            report.loaded, report.skipped, report.failed
        );
        report
    }

    async fn prefetch_one(&self, job: &PrefetchJob) -> Result<Outcome> {
        let started_ms = self.clock.now_ms();
        let value = job
            .source
            .load()
            .await
            .map_err(crate::error::CacheError::loader)?;

        let physical = self.physical(&job.key).await?;
        if let Some(existing) = self.store.get(&physical).await? {
            // An unreadable entry is treated as older than anything
            if let Ok(written_at) = self.serializer.written_at(&existing) {
                if written_at > started_ms {
                    debug!("Prefetch of '{}' skipped, cached value is newer", job.key);
                    return Ok(Outcome::Skipped);
                }
            }
        }

        let bytes = self.serializer.encode(&value, started_ms)?;
        self.store
            .set(&physical, bytes, self.resolve_ttl(job.ttl))
            .await?;
        Ok(Outcome::Loaded)
    }
}
