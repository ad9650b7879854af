//! Cache Entry Module
//!
//! Defines the structure for individual store entries with TTL support.

use std::collections::BTreeSet;

// == Stored Value ==
/// The kinds of value a store key can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Opaque bytes; counters are stored as decimal text
    Bytes(Vec<u8>),
    /// A set of unique members
    Set(BTreeSet<String>),
}

// == Cache Entry ==
/// Represents a single store entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: StoredValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry written at `now_ms`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_seconds` - TTL in seconds, `0` for no expiration
    /// * `now_ms` - Current time in Unix milliseconds
    pub fn new(value: StoredValue, ttl_seconds: u64, now_ms: i64) -> Self {
        Self {
            value,
            created_at: now_ms,
            expires_at: expiry_for(ttl_seconds, now_ms),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once the current time reaches the expiration time,
    /// so a TTL of T seconds makes the entry unreadable from exactly T onwards.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// Replaces the expiry; a TTL of 0 removes it.
    pub fn set_ttl(&mut self, ttl_seconds: u64, now_ms: i64) {
        self.expires_at = expiry_for(ttl_seconds, now_ms);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> Option<u64> {
        self.expires_at
            .map(|expires| if expires > now_ms { (expires - now_ms) as u64 } else { 0 })
    }
}

fn expiry_for(ttl_seconds: u64, now_ms: i64) -> Option<i64> {
    if ttl_seconds == 0 {
        None
    } else {
        Some(now_ms.saturating_add((ttl_seconds as i64).saturating_mul(1000)))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn bytes(value: &str) -> StoredValue {
        StoredValue::Bytes(value.as_bytes().to_vec())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(bytes("test_value"), 0, NOW);

        assert_eq!(entry.value, bytes("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(NOW + 10_000_000));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(bytes("test_value"), 60, NOW);

        assert_eq!(entry.expires_at, Some(NOW + 60_000));
        assert!(!entry.is_expired(NOW));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(bytes("test"), 5, NOW);

        assert!(!entry.is_expired(NOW + 4_999), "Entry should live until the boundary");
        assert!(entry.is_expired(NOW + 5_000), "Entry should be expired at boundary");
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(bytes("test_value"), 10, NOW);

        assert_eq!(entry.ttl_remaining_ms(NOW + 1_000), Some(9_000));
        assert_eq!(entry.ttl_remaining_ms(NOW + 20_000), Some(0));
    }

    #[test]
    fn test_set_ttl_zero_persists() {
        let mut entry = CacheEntry::new(bytes("test_value"), 10, NOW);
        entry.set_ttl(0, NOW);

        assert!(entry.ttl_remaining_ms(NOW).is_none());
        assert!(!entry.is_expired(NOW + 60_000));
    }
}
