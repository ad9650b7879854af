//! Cachelayer - A backend-agnostic caching and rate-limiting layer
//!
//! Cache-aside, write-through, write-behind and prefetch strategies,
//! tag/version/dependency invalidation, rate limiting and sessions over any
//! store implementing [`CacheStore`].

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod layer;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod strategy;
pub mod tasks;


pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CacheKey, KeyCodec};
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationManager, InvalidationReport, InvalidationWarning};
pub use layer::CacheLayer;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use models::{Fetched, PutAck, RateDecision, Session};
pub use rate_limit::{RateLimitAlgorithm, RateLimiter};
pub use session::SessionStore;
pub use store::{CacheStore, InMemoryStore};
pub use strategy::{
    BackingWriter, CacheEngine, EngineOptions, PrefetchJob, PrefetchReport, PrefetchSource,
    WriteBehindFailure, WriteStrategy,
};
pub use tasks::{spawn_cleanup_task, spawn_prefetch_task};
