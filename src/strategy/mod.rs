//! Strategy Engine Module
//!
//! Read and write orchestration over the store:
//! - cache-aside reads with an optional single-flight mode
//! - write-through and write-behind writes
//! - proactive prefetch (see [`prefetch`])
//!
//! The cache is an optimization here, never the source of truth: store
//! failures on the read path degrade to a miss, while loader failures always
//! reach the caller.

mod key_lock;
mod prefetch;
mod single_flight;
mod write_behind;
mod writer;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::codec::{CacheKey, KeyCodec, Serializer};
use crate::config::{Config, WriteBehindConfig};
use crate::error::{CacheError, Result};
use crate::invalidation::VersionRegistry;
use crate::metrics::MetricsCollector;
use crate::models::{Fetched, PutAck};
use crate::store::CacheStore;

pub use key_lock::{KeyGuard, KeyLocks};
pub use prefetch::{PrefetchJob, PrefetchReport, PrefetchSource};
pub use single_flight::{Flight, SingleFlight};
pub use write_behind::{QueueSlot, WriteBehindFailure, WriteBehindQueue};
pub use writer::{BackingWriter, WriteStrategy};

// == Engine Options ==
/// Behaviour switches for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// TTL applied when a call passes `None` (0 = no expiry)
    pub default_ttl: u64,
    /// Coalesce concurrent loads of the same key
    pub single_flight: bool,
    /// Start a write-behind queue with these settings
    pub write_behind: Option<WriteBehindConfig>,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_ttl: config.default_ttl,
            single_flight: config.single_flight,
            write_behind: Some(config.write_behind()),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            single_flight: false,
            write_behind: None,
        }
    }
}

// == Cache Engine ==
/// Orchestrates reads and writes between callers, the cache and the
/// backing store.
pub struct CacheEngine {
    store: Arc<dyn CacheStore>,
    codec: KeyCodec,
    versions: VersionRegistry,
    serializer: Serializer,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    flights: Option<SingleFlight>,
    default_ttl: u64,
    write_behind: Option<WriteBehindQueue>,
}

impl CacheEngine {
    // == Constructor ==
    /// Creates an engine. With a write-behind config this spawns the worker
    /// pool, so it must run inside a tokio runtime.
    pub fn new(
        store: Arc<dyn CacheStore>,
        codec: KeyCodec,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
        options: EngineOptions,
    ) -> Self {
        let write_behind = options
            .write_behind
            .map(|config| WriteBehindQueue::start(config, metrics.clone(), clock.clone()));

        Self {
            versions: VersionRegistry::new(store.clone(), codec.clone()),
            store,
            codec,
            serializer: Serializer::new(),
            metrics,
            clock,
            flights: options.single_flight.then(SingleFlight::new),
            default_ttl: options.default_ttl,
            write_behind,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// The write-behind queue, when enabled.
    pub fn write_behind(&self) -> Option<&WriteBehindQueue> {
        self.write_behind.as_ref()
    }

    // == Get (cache-aside) ==
    /// Returns the cached value for `key`, or loads, caches and returns it.
    ///
    /// - A store failure while reading counts as an error and a miss.
    /// - A store failure while writing back is logged; the loaded value is
    ///   still returned.
    /// - A loader failure is returned unchanged as `LoaderFailure`.
    ///
    /// # Arguments
    /// * `key` - Logical key
    /// * `loader` - Produces the value on a miss
    /// * `ttl` - TTL in seconds for the written entry (`None` = default)
    pub async fn get<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        loader: F,
        ttl: Option<u64>,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        E: Into<anyhow::Error>,
    {
        let base = self.codec.render(key)?;
        let physical = match self.versions.physical(&base).await {
            Ok(physical) => Some(physical),
            Err(err) if err.is_store_unavailable() => {
                warn!("Version lookup for '{}' failed, bypassing cache: {}", base, err);
                self.metrics.record_error();
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(physical) = &physical {
            if let Some(value) = self.read_cached::<T>(physical).await {
                self.metrics.record_hit();
                return Ok(Fetched::cached(value));
            }
        }
        self.metrics.record_miss();

        let ttl = self.resolve_ttl(ttl);
        match (&self.flights, physical) {
            (Some(flights), Some(physical)) => {
                let flight = flights
                    .run(&physical, self.load_for_flight::<T, F, Fut, E>(&physical, loader, ttl))
                    .await?;
                let decoded = self.serializer.decode::<T>(&flight.bytes)?;
                Ok(Fetched {
                    value: decoded.value,
                    from_cache: flight.from_cache,
                })
            }
            (_, physical) => {
                let value = loader().await.map_err(CacheError::loader)?;
                if let Some(physical) = physical {
                    match self.serializer.encode(&value, self.clock.now_ms()) {
                        Ok(bytes) => self.write_best_effort(&physical, bytes, ttl).await,
                        Err(err) => {
                            warn!("Could not encode loaded value for '{}': {}", physical, err);
                            self.metrics.record_error();
                        }
                    }
                }
                Ok(Fetched::loaded(value))
            }
        }
    }

    // == Put ==
    /// Writes `value` to the backing store and the cache per `strategy`.
    ///
    /// - Write-through: writer first; a writer or cache failure fails the
    ///   call, and a writer failure skips the cache write.
    /// - Write-behind: cache now, writer later. Fails with `QueueFull` when
    ///   no queue space frees up in time, before anything is written.
    pub async fn put<T>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<u64>,
        strategy: WriteStrategy,
    ) -> Result<PutAck>
    where
        T: Serialize + Sync + ?Sized,
    {
        let base = self.codec.render(key)?;
        let ttl = self.resolve_ttl(ttl);
        let record = self.serializer.encode_value(value)?;
        let cached = self.serializer.encode(value, self.clock.now_ms())?;

        match strategy {
            WriteStrategy::WriteThrough(writer) => {
                writer
                    .write(&base, &record)
                    .await
                    .map_err(CacheError::loader)?;
                let physical = self.versions.physical(&base).await?;
                self.store.set(&physical, cached, ttl).await?;
                debug!("Write-through for '{}' complete", base);
                Ok(PutAck::Written)
            }
            WriteStrategy::WriteBehind(writer) => {
                let queue = self.write_behind.as_ref().ok_or_else(|| {
                    CacheError::InvalidRequest("write-behind is not enabled".to_string())
                })?;
                let _key_guard = queue.lock_key(&base).await;
                let slot = queue.reserve(&base).await?;
                let physical = self.versions.physical(&base).await?;
                self.store.set(&physical, cached, ttl).await?;
                let sequence = slot.commit(base, record, writer);
                Ok(PutAck::Queued { sequence })
            }
        }
    }

    // == Set ==
    /// Writes `value` to the cache only.
    pub async fn set<T>(&self, key: &CacheKey, value: &T, ttl: Option<u64>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let physical = self.physical(key).await?;
        let bytes = self.serializer.encode(value, self.clock.now_ms())?;
        self.store.set(&physical, bytes, self.resolve_ttl(ttl)).await
    }

    // == Peek ==
    /// Reads a cached value without loading on a miss.
    ///
    /// Unlike [`CacheEngine::get`], store and decoding failures are returned.
    pub async fn peek<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let physical = self.physical(key).await?;
        match self.store.get(&physical).await? {
            Some(bytes) => {
                let decoded = self.serializer.decode::<T>(&bytes)?;
                self.metrics.record_hit();
                Ok(Some(decoded.value))
            }
            None => {
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    // == Delete ==
    /// Removes the current entry of `key`. Returns whether it existed.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let physical = self.physical(key).await?;
        self.store.delete(&physical).await
    }

    // == Refresh ==
    /// Resets the TTL of the current entry of `key`. Returns whether it
    /// existed.
    pub async fn refresh(&self, key: &CacheKey, ttl: Option<u64>) -> Result<bool> {
        let physical = self.physical(key).await?;
        self.store.expire(&physical, self.resolve_ttl(ttl)).await
    }

    /// Physical key of the current version of `key`.
    pub async fn physical(&self, key: &CacheKey) -> Result<String> {
        let base = self.codec.render(key)?;
        self.versions.physical(&base).await
    }

    /// Waits until queued write-behind work has finished.
    pub async fn flush(&self) {
        if let Some(queue) = &self.write_behind {
            queue.flush().await;
        }
    }

    /// Drains and stops the write-behind workers.
    pub async fn shutdown(&self) {
        if let Some(queue) = &self.write_behind {
            queue.shutdown().await;
        }
    }

    // == Helpers ==
    fn resolve_ttl(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.default_ttl)
    }

    /// Reads and decodes an entry; any failure is logged and reads as a miss.
    async fn read_cached<T: DeserializeOwned>(&self, physical: &str) -> Option<T> {
        match self.store.get(physical).await {
            Ok(Some(bytes)) => match self.serializer.decode::<T>(&bytes) {
                Ok(decoded) => Some(decoded.value),
                Err(err) => {
                    warn!("Undecodable entry at '{}', treating as miss: {}", physical, err);
                    self.metrics.record_error();
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!("Cache read for '{}' failed, treating as miss: {}", physical, err);
                self.metrics.record_error();
                None
            }
        }
    }

    async fn write_best_effort(&self, physical: &str, bytes: Vec<u8>, ttl: u64) {
        if let Err(err) = self.store.set(physical, bytes, ttl).await {
            warn!("Cache write-back for '{}' failed: {}", physical, err);
            self.metrics.record_error();
        }
    }

    async fn load_for_flight<T, F, Fut, E>(
        &self,
        physical: &str,
        loader: F,
        ttl: u64,
    ) -> Result<Flight>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        // A flight that landed just before this one started may have filled it
        if let Ok(Some(bytes)) = self.store.get(physical).await {
            if self.serializer.decode::<T>(&bytes).is_ok() {
                return Ok(Flight {
                    bytes,
                    from_cache: true,
                });
            }
        }

        let value = loader().await.map_err(CacheError::loader)?;
        let bytes = self.serializer.encode(&value, self.clock.now_ms())?;
        self.write_best_effort(physical, bytes.clone(), ttl).await;
        Ok(Flight {
            bytes,
            from_cache: false,
        })
    }
}
