//! Write-Behind Queue
//!
//! Bounded queue of deferred backing-store writes drained by a worker pool.
//!
//! Keys are hashed onto shards, one worker per shard, so writes to the same
//! key are applied in enqueue order. Every write carries a sequence number;
//! a worker skips a write once a newer one for the same key is queued, so
//! the last write enqueued wins.
//!
//! Producers hold a per-key lock from reservation to commit, so the order of
//! cache writes for a key matches the order of its sequence numbers.
//!
//! When a shard is full, producers wait up to `enqueue_timeout` for space and
//! then fail with `QueueFull`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::WriteBehindConfig;
use crate::error::{CacheError, Result};
use crate::metrics::MetricsCollector;
use crate::strategy::key_lock::{KeyGuard, KeyLocks};
use crate::strategy::BackingWriter;

// == Write-Behind Failure ==
/// A deferred write that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBehindFailure {
    /// Rendered logical key
    pub key: String,
    /// Sequence number of the failed write
    pub sequence: u64,
    /// Attempts made
    pub attempts: u32,
    /// Last writer error
    pub error: String,
    /// When the write was given up
    pub failed_at: DateTime<Utc>,
}

struct Job {
    key: String,
    payload: Arc<Vec<u8>>,
    writer: Arc<dyn BackingWriter>,
    sequence: u64,
}

struct Shared {
    config: WriteBehindConfig,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    /// Highest sequence enqueued per key
    latest: DashMap<String, u64>,
    /// Keys whose latest deferred write failed for good
    degraded: DashMap<String, WriteBehindFailure>,
    /// Jobs enqueued and not yet finished
    pending: AtomicUsize,
    /// Signalled when `pending` drops to zero
    idle: Notify,
    failures: mpsc::UnboundedSender<WriteBehindFailure>,
}

impl Shared {
    fn is_superseded(&self, job: &Job) -> bool {
        self.latest
            .get(&job.key)
            .is_some_and(|latest| *latest > job.sequence)
    }

    fn finish(&self, job: &Job) {
        self.latest
            .remove_if(&job.key, |_, latest| *latest == job.sequence);
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

// == Write-Behind Queue ==
/// Sharded, bounded queue with a background worker per shard.
pub struct WriteBehindQueue {
    shards: Vec<mpsc::Sender<Job>>,
    shared: Arc<Shared>,
    sequence: AtomicU64,
    key_locks: KeyLocks,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    failures: Mutex<Option<mpsc::UnboundedReceiver<WriteBehindFailure>>>,
}

impl WriteBehindQueue {
    // == Start ==
    /// Creates the queue and spawns its workers on the current tokio runtime.
    ///
    /// Capacity is split evenly across workers, at least one slot each.
    pub fn start(
        config: WriteBehindConfig,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let workers = config.workers.max(1);
        let per_shard = (config.queue_size / workers).max(1);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            config,
            metrics,
            clock,
            latest: DashMap::new(),
            degraded: DashMap::new(),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            failures: failures_tx,
        });

        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(per_shard);
            shards.push(tx);
            handles.push(tokio::spawn(run_worker(
                id,
                rx,
                shared.clone(),
                shutdown_rx.clone(),
            )));
        }

        info!(
            "Write-behind queue started: {} worker(s), {} slot(s) each",
            workers, per_shard
        );

        Self {
            shards,
            shared,
            sequence: AtomicU64::new(0),
            key_locks: KeyLocks::new(),
            shutdown: shutdown_tx,
            workers: Mutex::new(handles),
            failures: Mutex::new(Some(failures_rx)),
        }
    }

    // == Key Lock ==
    /// Excludes other producers for `key` until the guard is dropped.
    ///
    /// Hold it across reserve, cache write and commit so a later cache
    /// write always carries a later sequence number.
    pub async fn lock_key(&self, key: &str) -> KeyGuard<'_> {
        self.key_locks.lock(key).await
    }

    // == Reserve ==
    /// Waits for queue space for a write to `key`.
    ///
    /// Reserving before touching the cache means a full queue rejects the
    /// whole `put` rather than leaving a cached value with no deferred write.
    pub async fn reserve(&self, key: &str) -> Result<QueueSlot<'_>> {
        let shard = &self.shards[self.shard_for(key)];
        let timeout = self.shared.config.enqueue_timeout;

        match tokio::time::timeout(timeout, shard.reserve()).await {
            Ok(Ok(permit)) => Ok(QueueSlot {
                permit,
                queue: self,
            }),
            Ok(Err(_)) => Err(CacheError::Internal(
                "write-behind queue is shut down".to_string(),
            )),
            Err(_) => {
                self.shared.metrics.record_error();
                warn!("Write-behind queue full for '{}' after {:?}", key, timeout);
                Err(CacheError::QueueFull(format!(
                    "no space for '{}' within {:?}",
                    key, timeout
                )))
            }
        }
    }

    // == Degraded ==
    /// Returns true if the latest deferred write for `key` failed for good.
    pub fn is_degraded(&self, key: &str) -> bool {
        self.shared.degraded.contains_key(key)
    }

    /// Failure details for a degraded key.
    pub fn degraded(&self, key: &str) -> Option<WriteBehindFailure> {
        self.shared.degraded.get(key).map(|entry| entry.clone())
    }

    /// Takes the receiving end of the failure channel. Only the first call
    /// gets it.
    pub async fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<WriteBehindFailure>> {
        self.failures.lock().await.take()
    }

    /// Writes enqueued and not yet finished.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    // == Flush ==
    /// Waits until every enqueued write has finished (succeeded, failed for
    /// good, or been superseded).
    pub async fn flush(&self) {
        loop {
            let idle = self.shared.idle.notified();
            tokio::pin!(idle);
            // Register before checking so a wake-up in between is not lost
            idle.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    // == Shutdown ==
    /// Stops accepting writes, drains what is queued and waits for workers.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!("Write-behind worker ended abnormally: {}", err);
            }
        }
        info!("Write-behind queue drained and stopped");
    }

    fn shard_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }
}

// == Queue Slot ==
/// Reserved space for one deferred write.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, Job>,
    queue: &'a WriteBehindQueue,
}

impl QueueSlot<'_> {
    /// Enqueues the write and returns its sequence number.
    pub fn commit(self, key: String, payload: Vec<u8>, writer: Arc<dyn BackingWriter>) -> u64 {
        let sequence = self.queue.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = &self.queue.shared;

        shared
            .latest
            .entry(key.clone())
            .and_modify(|latest| *latest = (*latest).max(sequence))
            .or_insert(sequence);
        shared.pending.fetch_add(1, Ordering::SeqCst);

        self.permit.send(Job {
            key,
            payload: Arc::new(payload),
            writer,
            sequence,
        });
        sequence
    }
}

// == Worker ==
async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<Job>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Write-behind worker {} started", id);

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => process(&shared, job).await,
                None => break,
            },
            _ = shutdown.changed() => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    process(&shared, job).await;
                }
                break;
            }
        }
    }

    debug!("Write-behind worker {} stopped", id);
}

async fn process(shared: &Shared, job: Job) {
    let mut attempt: u32 = 0;

    loop {
        if shared.is_superseded(&job) {
            debug!(
                "Write-behind #{} for '{}' superseded by a newer write",
                job.sequence, job.key
            );
            break;
        }

        attempt += 1;
        match attempt_write(&job).await {
            Ok(()) => {
                shared.degraded.remove(&job.key);
                debug!(
                    "Write-behind #{} for '{}' applied (attempt {})",
                    job.sequence, job.key, attempt
                );
                break;
            }
            Err(err) if attempt < shared.config.max_attempts => {
                let delay = shared.config.backoff(attempt);
                warn!(
                    "Write-behind #{} for '{}' failed (attempt {}/{}), retrying in {:?}: {:#}",
                    job.sequence, job.key, attempt, shared.config.max_attempts, delay, err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                let failure = WriteBehindFailure {
                    key: job.key.clone(),
                    sequence: job.sequence,
                    attempts: attempt,
                    error: format!("{:#}", err),
                    failed_at: shared.clock.now(),
                };
                error!(
                    "Write-behind #{} for '{}' gave up after {} attempt(s): {}; entry marked degraded",
                    job.sequence, job.key, attempt, failure.error
                );
                shared.metrics.record_error();
                shared.degraded.insert(job.key.clone(), failure.clone());
                if shared.failures.send(failure).is_err() {
                    error!("Write-behind failure channel closed; failure for '{}' only logged", job.key);
                }
                break;
            }
        }
    }

    shared.finish(&job);
}

/// Runs one writer call on its own task so a panicking writer costs an
/// attempt rather than the worker.
async fn attempt_write(job: &Job) -> anyhow::Result<()> {
    let writer = job.writer.clone();
    let key = job.key.clone();
    let payload = job.payload.clone();

    match tokio::spawn(async move { writer.write(&key, &payload).await }).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(anyhow::anyhow!("backing writer panicked")),
        Err(err) => Err(anyhow::anyhow!("backing writer task failed: {}", err)),
    }
}
