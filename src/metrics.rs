//! Metrics Module
//!
//! Process-wide counters for cache outcomes. Counters only ever grow; they
//! reset when the process restarts.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Metrics Collector ==
/// Lock-free counters shared by every component.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Reads answered from the cache
    hits: AtomicU64,
    /// Reads that fell through to a loader
    misses: AtomicU64,
    /// Store, serialization and deferred-write failures
    errors: AtomicU64,
    /// Keys removed by explicit invalidation
    invalidations: AtomicU64,
}

impl MetricsCollector {
    // == Constructor ==
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Error ==
    /// Increments the error counter.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Invalidation ==
    /// Adds `count` invalidated keys.
    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits(), self.misses())
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        MetricsSnapshot {
            hits,
            misses,
            errors: self.errors(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
        }
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Metrics Snapshot ==
/// Serializable view of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}
