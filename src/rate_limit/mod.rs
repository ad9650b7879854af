//! Rate Limit Module
//!
//! Quota tracking over store counters. Every increment goes through the
//! store's atomic `increment`, so concurrent checks never undercount.
//! Each hit re-arms the counter's expiry in the same batch.

mod fixed;
mod sliding;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::codec::KeyCodec;
use crate::error::{CacheError, Result};
use crate::models::RateDecision;
use crate::store::{BatchOp, BatchReply, CacheStore};

// == Rate Limit Algorithm ==
/// Window accounting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitAlgorithm {
    /// One counter per `floor(now / window)` bucket. Allows up to 2x the
    /// limit across a bucket edge.
    #[default]
    FixedWindow,
    /// Current bucket plus the previous bucket weighted by how much of it
    /// still overlaps the trailing window.
    SlidingWindow,
}

impl FromStr for RateLimitAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "fixed_window" => Ok(RateLimitAlgorithm::FixedWindow),
            "sliding" | "sliding_window" => Ok(RateLimitAlgorithm::SlidingWindow),
            other => Err(CacheError::InvalidRequest(format!(
                "unknown rate limit algorithm '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RateLimitAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitAlgorithm::FixedWindow => write!(f, "fixed"),
            RateLimitAlgorithm::SlidingWindow => write!(f, "sliding"),
        }
    }
}

// == Rate Limiter ==
/// Checks request quotas per identity.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    codec: KeyCodec,
    clock: Arc<dyn Clock>,
    algorithm: RateLimitAlgorithm,
    default_limit: u64,
    default_window: u64,
}

impl RateLimiter {
    // == Constructor ==
    /// Creates a limiter with defaults of 100 requests per 60 seconds.
    pub fn new(
        store: Arc<dyn CacheStore>,
        codec: KeyCodec,
        clock: Arc<dyn Clock>,
        algorithm: RateLimitAlgorithm,
    ) -> Self {
        Self {
            store,
            codec,
            clock,
            algorithm,
            default_limit: 100,
            default_window: 60,
        }
    }

    /// Replaces the quota used by [`RateLimiter::check_default`].
    pub fn with_defaults(mut self, limit: u64, window_secs: u64) -> Self {
        self.default_limit = limit;
        self.default_window = window_secs;
        self
    }

    pub fn algorithm(&self) -> RateLimitAlgorithm {
        self.algorithm
    }

    // == Check Rate ==
    /// Counts one request for `identity` and reports whether it fits.
    ///
    /// Denied requests are still counted.
    ///
    /// # Arguments
    /// * `identity` - Caller identity (user id, IP, API key...)
    /// * `limit` - Requests allowed per window, > 0
    /// * `window_secs` - Window size in seconds, > 0
    pub async fn check_rate(
        &self,
        identity: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<RateDecision> {
        if limit == 0 || window_secs == 0 {
            return Err(CacheError::InvalidRequest(
                "limit and window must be greater than 0".to_string(),
            ));
        }

        let now_ms = self.clock.now_ms();
        let window = Window::containing(now_ms, window_secs);
        let decision = match self.algorithm {
            RateLimitAlgorithm::FixedWindow => {
                fixed::check(self.store.as_ref(), &self.codec, identity, limit, &window).await?
            }
            RateLimitAlgorithm::SlidingWindow => {
                sliding::check(self.store.as_ref(), &self.codec, identity, limit, &window, now_ms)
                    .await?
            }
        };

        if !decision.allowed {
            debug!(
                "Rate limit reached for '{}' ({} per {}s, {})",
                identity, limit, window_secs, self.algorithm
            );
        }
        Ok(decision)
    }

    /// Checks against the configured default quota.
    pub async fn check_default(&self, identity: &str) -> Result<RateDecision> {
        self.check_rate(identity, self.default_limit, self.default_window)
            .await
    }
}

// == Counting ==
/// Increments `key` and re-arms its expiry in one batch, returning the count.
async fn count_hit(store: &dyn CacheStore, key: &str, ttl_seconds: u64) -> Result<i64> {
    let mut replies = store
        .batch(vec![
            BatchOp::Increment {
                key: key.to_string(),
            },
            BatchOp::Expire {
                key: key.to_string(),
                ttl_seconds,
            },
        ])
        .await
        .into_iter();

    let count = match replies.next() {
        Some(Ok(BatchReply::Count(count))) => count,
        Some(Err(err)) => return Err(err),
        other => {
            return Err(CacheError::Internal(format!(
                "unexpected increment reply: {:?}",
                other
            )))
        }
    };
    if let Some(reply) = replies.next() {
        reply?;
    }
    Ok(count)
}

// == Window ==
/// The bucket a timestamp falls into.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    pub size_secs: u64,
    pub bucket: i64,
}

impl Window {
    fn containing(now_ms: i64, size_secs: u64) -> Self {
        let now_secs = now_ms.div_euclid(1000);
        Self {
            size_secs,
            bucket: now_secs.div_euclid(size_secs as i64),
        }
    }

    fn start_ms(&self) -> i64 {
        self.bucket * self.size_secs as i64 * 1000
    }

    fn reset_at(&self) -> DateTime<Utc> {
        let secs = (self.bucket + 1) * self.size_secs as i64;
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn limiter(algorithm: RateLimitAlgorithm) -> (RateLimiter, Arc<ManualClock>) {
        // 600 is a multiple of 60, so tests start at a window edge
        let clock = Arc::new(ManualClock::at_secs(600));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let limiter = RateLimiter::new(
            store,
            KeyCodec::new("test").unwrap(),
            clock.clone(),
            algorithm,
        );
        (limiter, clock)
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(
            "Sliding".parse::<RateLimitAlgorithm>().unwrap(),
            RateLimitAlgorithm::SlidingWindow
        );
        assert_eq!(
            "fixed_window".parse::<RateLimitAlgorithm>().unwrap(),
            RateLimitAlgorithm::FixedWindow
        );
        assert!("token".parse::<RateLimitAlgorithm>().is_err());
    }

    #[tokio::test]
    async fn test_fixed_sixth_call_denied() {
        let (limiter, _) = limiter(RateLimitAlgorithm::FixedWindow);

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check_rate("alice", 5, 60).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let sixth = limiter.check_rate("alice", 5, 60).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_at.timestamp(), 660);
    }

    #[tokio::test]
    async fn test_fixed_identities_are_independent() {
        let (limiter, _) = limiter(RateLimitAlgorithm::FixedWindow);

        limiter.check_rate("alice", 1, 60).await.unwrap();
        assert!(!limiter.check_rate("alice", 1, 60).await.unwrap().allowed);
        assert!(limiter.check_rate("bob", 1, 60).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_fixed_rollover_resets_count() {
        let (limiter, clock) = limiter(RateLimitAlgorithm::FixedWindow);

        limiter.check_rate("alice", 1, 60).await.unwrap();
        assert!(!limiter.check_rate("alice", 1, 60).await.unwrap().allowed);

        clock.advance(Duration::from_secs(60));
        let decision = limiter.check_rate("alice", 1, 60).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reset_at.timestamp(), 720);
    }

    #[tokio::test]
    async fn test_sliding_carries_previous_window() {
        let (limiter, clock) = limiter(RateLimitAlgorithm::SlidingWindow);

        for _ in 0..10 {
            assert!(limiter.check_rate("alice", 10, 60).await.unwrap().allowed);
        }

        // Right after the edge the previous window still weighs ~fully
        clock.advance(Duration::from_secs(61));
        let decision = limiter.check_rate("alice", 10, 60).await.unwrap();
        assert!(!decision.allowed, "Fixed window would allow this burst");

        // Halfway through, half of the previous window has slid out
        clock.advance(Duration::from_secs(29));
        let decision = limiter.check_rate("alice", 10, 60).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3);
    }

    #[tokio::test]
    async fn test_sliding_sixth_call_denied() {
        let (limiter, _) = limiter(RateLimitAlgorithm::SlidingWindow);

        for _ in 0..5 {
            assert!(limiter.check_rate("alice", 5, 60).await.unwrap().allowed);
        }
        let sixth = limiter.check_rate("alice", 5, 60).await.unwrap();
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
    }

    #[tokio::test]
    async fn test_counter_without_expiry_is_rearmed() {
        let clock = Arc::new(ManualClock::at_secs(600));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let codec = KeyCodec::new("test").unwrap();
        let limiter = RateLimiter::new(
            store.clone(),
            codec.clone(),
            clock.clone(),
            RateLimitAlgorithm::FixedWindow,
        );
        let fixed_key = codec.rate_key("fixed", "alice", 60, 10);
        let sliding_key = codec.rate_key("sliding", "alice", 60, 10);

        // Counted earlier but the expiry never landed
        store.increment(&fixed_key).await.unwrap();
        store.increment(&sliding_key).await.unwrap();
        assert_eq!(store.ttl_remaining_ms(&fixed_key), Some(None));

        let decision = limiter.check_rate("alice", 5, 60).await.unwrap();
        assert_eq!(decision.remaining, 3);
        assert_eq!(store.ttl_remaining_ms(&fixed_key), Some(Some(60_000)));

        let sliding = RateLimiter::new(
            store.clone(),
            codec,
            clock,
            RateLimitAlgorithm::SlidingWindow,
        );
        sliding.check_rate("alice", 5, 60).await.unwrap();
        assert_eq!(store.ttl_remaining_ms(&sliding_key), Some(Some(120_000)));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let (limiter, _) = limiter(RateLimitAlgorithm::FixedWindow);
        assert!(matches!(
            limiter.check_rate("alice", 0, 60).await,
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(limiter.check_rate("alice", 5, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_check_default_uses_configured_quota() {
        let (limiter, _) = limiter(RateLimitAlgorithm::FixedWindow);
        let limiter = limiter.with_defaults(2, 10);

        assert!(limiter.check_default("svc").await.unwrap().allowed);
        assert!(limiter.check_default("svc").await.unwrap().allowed);
        assert!(!limiter.check_default("svc").await.unwrap().allowed);
    }
}
