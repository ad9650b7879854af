//! Fixed-window counting: one counter per window bucket.

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
) -> Result<RateDecision> {
    let key = codec.rate_key("fixed", identity, window.size_secs, window.bucket);

    let count = count_hit(store, &key, window.size_secs).await?;

    let count = count.max(0) as u64;
    Ok(RateDecision {
        allowed: count <= limit,
        remaining: limit.saturating_sub(count),
        reset_at: window.reset_at(),
    })
}
