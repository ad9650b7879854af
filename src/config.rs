//! Configuration Module
//!
//! Handles loading and managing caching-layer configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::rate_limit::RateLimitAlgorithm;

/// Caching-layer configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for every key this layer writes
    pub key_prefix: String,
    /// Default TTL in seconds for writes without explicit TTL (0 = no expiry)
    pub default_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Coalesce concurrent cache-aside loads of the same key
    pub single_flight: bool,
    /// Capacity of the write-behind queue
    pub write_behind_queue_size: usize,
    /// Number of write-behind workers
    pub write_behind_workers: usize,
    /// Attempts per deferred write before it is flagged degraded
    pub write_behind_max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt
    pub write_behind_base_backoff_ms: u64,
    /// Upper bound on the retry delay in milliseconds
    pub write_behind_max_backoff_ms: u64,
    /// How long `put` waits for queue space before failing with QueueFull
    pub write_behind_enqueue_timeout_ms: u64,
    /// Maximum depth of a dependency invalidation traversal
    pub max_dependency_depth: usize,
    /// Session TTL in seconds
    pub session_ttl: u64,
    /// Default requests allowed per rate window
    pub rate_limit: u64,
    /// Default rate window size in seconds
    pub rate_window: u64,
    /// Fixed or sliding window accounting
    pub rate_limit_algorithm: RateLimitAlgorithm,
    /// Prefetch task interval in seconds
    pub prefetch_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_KEY_PREFIX` - Key prefix (default: cache)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `SINGLE_FLIGHT` - Coalesce concurrent loads (default: false)
    /// - `WRITE_BEHIND_QUEUE_SIZE` - Queue capacity (default: 1024)
    /// - `WRITE_BEHIND_WORKERS` - Worker count (default: 4)
    /// - `WRITE_BEHIND_MAX_ATTEMPTS` - Attempts per write (default: 5)
    /// - `WRITE_BEHIND_BASE_BACKOFF_MS` - First retry delay (default: 100)
    /// - `WRITE_BEHIND_MAX_BACKOFF_MS` - Retry delay cap (default: 5000)
    /// - `WRITE_BEHIND_ENQUEUE_TIMEOUT_MS` - Backpressure timeout (default: 250)
    /// - `MAX_DEPENDENCY_DEPTH` - Invalidation traversal depth (default: 16)
    /// - `SESSION_TTL` - Session TTL in seconds (default: 1800)
    /// - `RATE_LIMIT` - Requests per window (default: 100)
    /// - `RATE_WINDOW` - Window size in seconds (default: 60)
    /// - `RATE_LIMIT_ALGORITHM` - `fixed` or `sliding` (default: fixed)
    /// - `PREFETCH_INTERVAL` - Prefetch frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            single_flight: env_or("SINGLE_FLIGHT", defaults.single_flight),
            write_behind_queue_size: env_or(
                "WRITE_BEHIND_QUEUE_SIZE",
                defaults.write_behind_queue_size,
            ),
            write_behind_workers: env_or("WRITE_BEHIND_WORKERS", defaults.write_behind_workers),
            write_behind_max_attempts: env_or(
                "WRITE_BEHIND_MAX_ATTEMPTS",
                defaults.write_behind_max_attempts,
            ),
            write_behind_base_backoff_ms: env_or(
                "WRITE_BEHIND_BASE_BACKOFF_MS",
                defaults.write_behind_base_backoff_ms,
            ),
            write_behind_max_backoff_ms: env_or(
                "WRITE_BEHIND_MAX_BACKOFF_MS",
                defaults.write_behind_max_backoff_ms,
            ),
            write_behind_enqueue_timeout_ms: env_or(
                "WRITE_BEHIND_ENQUEUE_TIMEOUT_MS",
                defaults.write_behind_enqueue_timeout_ms,
            ),
            max_dependency_depth: env_or("MAX_DEPENDENCY_DEPTH", defaults.max_dependency_depth),
            session_ttl: env_or("SESSION_TTL", defaults.session_ttl),
            rate_limit: env_or("RATE_LIMIT", defaults.rate_limit),
            rate_window: env_or("RATE_WINDOW", defaults.rate_window),
            rate_limit_algorithm: env_or("RATE_LIMIT_ALGORITHM", defaults.rate_limit_algorithm),
            prefetch_interval: env_or("PREFETCH_INTERVAL", defaults.prefetch_interval),
        }
    }

    /// Rejects settings the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.write_behind_queue_size == 0 {
            return Err(invalid("write_behind_queue_size must be greater than 0"));
        }
        if self.write_behind_workers == 0 {
            return Err(invalid("write_behind_workers must be greater than 0"));
        }
        if self.write_behind_max_attempts == 0 {
            return Err(invalid("write_behind_max_attempts must be greater than 0"));
        }
        if self.rate_limit == 0 || self.rate_window == 0 {
            return Err(invalid("rate_limit and rate_window must be greater than 0"));
        }
        Ok(())
    }

    /// Write-behind settings derived from this config.
    pub fn write_behind(&self) -> WriteBehindConfig {
        WriteBehindConfig {
            queue_size: self.write_behind_queue_size,
            workers: self.write_behind_workers,
            max_attempts: self.write_behind_max_attempts,
            base_backoff: Duration::from_millis(self.write_behind_base_backoff_ms),
            max_backoff: Duration::from_millis(self.write_behind_max_backoff_ms),
            enqueue_timeout: Duration::from_millis(self.write_behind_enqueue_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "cache".to_string(),
            default_ttl: 300,
            cleanup_interval: 1,
            single_flight: false,
            write_behind_queue_size: 1024,
            write_behind_workers: 4,
            write_behind_max_attempts: 5,
            write_behind_base_backoff_ms: 100,
            write_behind_max_backoff_ms: 5_000,
            write_behind_enqueue_timeout_ms: 250,
            max_dependency_depth: 16,
            session_ttl: 1_800,
            rate_limit: 100,
            rate_window: 60,
            rate_limit_algorithm: RateLimitAlgorithm::FixedWindow,
            prefetch_interval: 60,
        }
    }
}

// == Write-Behind Config ==
/// Queue and retry settings for deferred writes.
#[derive(Debug, Clone)]
pub struct WriteBehindConfig {
    pub queue_size: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub enqueue_timeout: Duration,
}

impl WriteBehindConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn invalid(message: &str) -> CacheError {
    CacheError::InvalidRequest(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.key_prefix, "cache");
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.cleanup_interval, 1);
        assert!(!config.single_flight);
        assert_eq!(config.write_behind_workers, 4);
        assert_eq!(config.rate_limit_algorithm, RateLimitAlgorithm::FixedWindow);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("DEFAULT_TTL");
        env::remove_var("CLEANUP_INTERVAL");
        env::remove_var("SESSION_TTL");
        env::remove_var("MAX_DEPENDENCY_DEPTH");

        let config = Config::from_env();
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.cleanup_interval, 1);
        assert_eq!(config.session_ttl, 1_800);
        assert_eq!(config.max_dependency_depth, 16);
    }

    #[test]
    fn test_config_from_env_overrides() {
        env::set_var("RATE_LIMIT_ALGORITHM", "sliding");
        env::set_var("WRITE_BEHIND_QUEUE_SIZE", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.rate_limit_algorithm, RateLimitAlgorithm::SlidingWindow);
        assert_eq!(config.write_behind_queue_size, 1024);

        env::remove_var("RATE_LIMIT_ALGORITHM");
        env::remove_var("WRITE_BEHIND_QUEUE_SIZE");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            write_behind_workers: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let wb = Config::default().write_behind();
        assert_eq!(wb.backoff(1), Duration::from_millis(100));
        assert_eq!(wb.backoff(2), Duration::from_millis(200));
        assert_eq!(wb.backoff(4), Duration::from_millis(800));
        assert_eq!(wb.backoff(10), Duration::from_millis(5_000));
        assert_eq!(wb.backoff(64), Duration::from_millis(5_000));
    }
}
