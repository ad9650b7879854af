//! Cache Layer Facade
//!
//! Wires every component around one shared store, key codec, clock and
//! metrics collector.

use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::codec::KeyCodec;
use crate::config::Config;
use crate::error::Result;
use crate::invalidation::InvalidationManager;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;
use crate::store::CacheStore;
use crate::strategy::{CacheEngine, EngineOptions};

/// Every component of the caching layer, sharing one store.
#[derive(Clone)]
pub struct CacheLayer {
    /// Read/write strategies
    pub engine: Arc<CacheEngine>,
    /// Tag, version and dependency invalidation
    pub invalidation: InvalidationManager,
    /// Request quotas
    pub rate_limiter: RateLimiter,
    /// Sliding-TTL sessions
    pub sessions: SessionStore,
    /// Shared counters
    pub metrics: Arc<MetricsCollector>,
}

impl CacheLayer {
    // == Constructor ==
    /// Builds the layer on the system clock.
    ///
    /// Starts the write-behind workers, so it must run inside a tokio runtime.
    pub fn from_config(config: &Config, store: Arc<dyn CacheStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Builds the layer on the given clock.
    pub fn with_clock(
        config: &Config,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let codec = KeyCodec::new(&config.key_prefix)?;
        let metrics = Arc::new(MetricsCollector::new());

        let engine = Arc::new(CacheEngine::new(
            store.clone(),
            codec.clone(),
            clock.clone(),
            metrics.clone(),
            EngineOptions::from_config(config),
        ));
        let invalidation = InvalidationManager::new(
            store.clone(),
            codec.clone(),
            metrics.clone(),
            config.max_dependency_depth,
        );
        let rate_limiter = RateLimiter::new(store, codec, clock, config.rate_limit_algorithm)
            .with_defaults(config.rate_limit, config.rate_window);
        let sessions = SessionStore::new(engine.clone(), config.session_ttl);

        info!(
            "Cache layer ready: prefix='{}', default_ttl={}s, single_flight={}, rate_limit={} per {}s ({})",
            config.key_prefix,
            config.default_ttl,
            config.single_flight,
            config.rate_limit,
            config.rate_window,
            config.rate_limit_algorithm
        );

        Ok(Self {
            engine,
            invalidation,
            rate_limiter,
            sessions,
            metrics,
        })
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drains pending write-behind work and stops its workers.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
