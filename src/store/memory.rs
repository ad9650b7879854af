//! In-Memory Store Module
//!
//! Sharded in-process implementation of the store contract with lazy TTL
//! expiration. Locks are per shard, never across the whole keyspace.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::store::{CacheEntry, CacheStore, StoredValue, MAX_VALUE_SIZE};

// == In-Memory Store ==
/// Key-value store held in process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    /// Key-value storage
    entries: DashMap<String, CacheEntry>,
    /// Time source for expiry
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    // == Constructor ==
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    // == Time To Live ==
    /// Remaining TTL of a live key in milliseconds.
    ///
    /// `Some(None)` means the key exists without expiry; `None` means absent.
    pub fn ttl_remaining_ms(&self, key: &str) -> Option<Option<u64>> {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.ttl_remaining_ms(now))
    }

    // == Length ==
    /// Returns the number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops `key` if it has expired, so entry-based updates start fresh.
    fn purge_if_expired(&self, key: &str, now: i64) {
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now_ms();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                return match &entry.value {
                    StoredValue::Bytes(bytes) => Ok(Some(bytes.clone())),
                    StoredValue::Set(_) => Err(CacheError::WrongType(key.to_string())),
                }
            }
        };

        if expired {
            self.purge_if_expired(key, now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        // Validate value size
        if value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::InvalidRequest(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        let entry = CacheEntry::new(StoredValue::Bytes(value), ttl_seconds, self.clock.now_ms());
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = self.clock.now_ms();
        self.purge_if_expired(key, now);

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(StoredValue::Bytes(b"0".to_vec()), 0, now));

        let current = match &entry.value {
            StoredValue::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or_else(|| CacheError::WrongType(format!("{} is not an integer", key)))?,
            StoredValue::Set(_) => return Err(CacheError::WrongType(key.to_string())),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| CacheError::InvalidRequest(format!("{} would overflow", key)))?;
        entry.value = StoredValue::Bytes(next.to_string().into_bytes());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let now = self.clock.now_ms();
        self.purge_if_expired(key, now);

        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.set_ttl(ttl_seconds, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        self.purge_if_expired(key, now);

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(StoredValue::Set(BTreeSet::new()), 0, now));

        match &mut entry.value {
            StoredValue::Set(members) => Ok(members.insert(member.to_string())),
            StoredValue::Bytes(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        self.purge_if_expired(key, now);

        let removed = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(mut entry) => match &mut entry.value {
                StoredValue::Set(members) => members.remove(member),
                StoredValue::Bytes(_) => return Err(CacheError::WrongType(key.to_string())),
            },
        };

        // An emptied set disappears, like an absent one
        self.entries.remove_if(key, |_, entry| {
            matches!(&entry.value, StoredValue::Set(members) if members.is_empty())
        });
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        match self.entries.get(key) {
            None => Ok(Vec::new()),
            Some(entry) if entry.is_expired(now) => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                StoredValue::Set(members) => Ok(members.iter().cloned().collect()),
                StoredValue::Bytes(_) => Err(CacheError::WrongType(key.to_string())),
            },
        }
    }
}
