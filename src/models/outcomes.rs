//! Result types returned by the strategy engine and the rate limiter.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Value returned by a cache-aside read, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched<T> {
    /// The value
    pub value: T,
    /// True when the value was read from the cache rather than loaded
    pub from_cache: bool,
}

impl<T> Fetched<T> {
    pub fn cached(value: T) -> Self {
        Self {
            value,
            from_cache: true,
        }
    }

    pub fn loaded(value: T) -> Self {
        Self {
            value,
            from_cache: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Acknowledgement of a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PutAck {
    /// Backing store and cache both written
    Written,
    /// Cache written; backing write queued with this sequence number
    Queued { sequence: u64 },
}

/// Outcome of a rate check. A denial is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateDecision {
    /// Whether this request fits in the quota
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}
