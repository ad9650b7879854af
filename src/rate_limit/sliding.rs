//! Sliding-window counting.
//!
//! Estimates the requests in the trailing window as
//! `previous * (1 - elapsed / size) + current`, where `elapsed` is how far
//! into the current bucket `now` is.

use crate::codec::KeyCodec;
use crate::error::Result;
use crate::models::RateDecision;
use crate::rate_limit::{count_hit, Window};
use crate::store::CacheStore;

pub(super) async fn check(
    store: &dyn CacheStore,
    codec: &KeyCodec,
    identity: &str,
    limit: u64,
    window: &Window,
    now_ms: i64,
) -> Result<RateDecision> {
    let current_key = codec.rate_key("sliding", identity, window.size_secs, window.bucket);
    let previous_key = codec.rate_key("sliding", identity, window.size_secs, window.bucket - 1);

    // Kept for a second window so it can serve as the previous bucket
    let current = count_hit(store, &current_key, window.size_secs * 2).await?;

    let previous = store
        .get(&previous_key)
        .await?
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse::<i64>().ok())
        .unwrap_or(0)
        .max(0);

    let size_ms = (window.size_secs * 1000) as f64;
    let elapsed_ms = (now_ms - window.start_ms()) as f64;
    let overlap = (1.0 - elapsed_ms / size_ms).clamp(0.0, 1.0);
    let estimate = previous as f64 * overlap + current.max(0) as f64;

    Ok(RateDecision {
        allowed: estimate <= limit as f64,
        remaining: (limit as f64 - estimate).floor().max(0.0) as u64,
        reset_at: window.reset_at(),
    })
}
