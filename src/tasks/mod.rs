//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - TTL Cleanup: Sweeps expired entries out of the in-memory store
//! - Prefetch: Keeps a fixed set of keys warm

mod cleanup;
mod prefetch;

pub use cleanup::spawn_cleanup_task;
pub use prefetch::spawn_prefetch_task;
