//! Store wrapper that can be switched offline or slowed down, for
//! failure-path and interleaving tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::store::{CacheStore, InMemoryStore};

/// Operation a delay applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOp {
    /// Matched against the key
    Get,
    /// Matched against the written value
    Set,
    /// Matched against the set key
    SetMembers,
}

#[derive(Debug)]
struct Delay {
    op: StoreOp,
    needle: Vec<u8>,
    by: Duration,
}

#[derive(Debug)]
pub(crate) struct FlakyStore {
    pub inner: InMemoryStore,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
    delays: Mutex<Vec<Delay>>,
    pub sets: AtomicUsize,
}

impl FlakyStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryStore::with_clock(clock),
            reads_down: AtomicBool::new(false),
            writes_down: AtomicBool::new(false),
            delays: Mutex::new(Vec::new()),
            sets: AtomicUsize::new(0),
        }
    }

    pub fn fail_reads(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// Sleeps for `by` after every completed `op` whose subject contains
    /// `needle`.
    pub fn delay_after(&self, op: StoreOp, needle: &str, by: Duration) {
        self.delays.lock().unwrap().push(Delay {
            op,
            needle: needle.as_bytes().to_vec(),
            by,
        });
    }

    async fn pause(&self, op: StoreOp, subject: &[u8]) {
        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.op == op && subject.windows(d.needle.len()).any(|w| w == d.needle))
            .map(|d| d.by);
        if let Some(by) = delay {
            tokio::time::sleep(by).await;
        }
    }

    fn check_reads(&self) -> Result<()> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_reads()?;
        let value = self.inner.get(key).await;
        self.pause(StoreOp::Get, key.as_bytes()).await;
        value
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        self.check_writes()?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        let subject = value.clone();
        self.inner.set(key, value, ttl_seconds).await?;
        self.pause(StoreOp::Set, &subject).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_writes()?;
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.check_writes()?;
        self.inner.increment(key).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        self.check_writes()?;
        self.inner.expire(key, ttl_seconds).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.check_writes()?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.check_writes()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check_reads()?;
        let members = self.inner.set_members(key).await;
        self.pause(StoreOp::SetMembers, key.as_bytes()).await;
        members
    }
}
