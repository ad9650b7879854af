//! Version counters for logical keys.
//!
//! A logical key's data lives at `{base}:v{version}`. The version is one more
//! than the number of bumps recorded in the store, so a key that was never
//! bumped reads version 1 without any counter existing.

use std::sync::Arc;

use crate::codec::KeyCodec;
use crate::error::Result;
use crate::store::CacheStore;

// == Version Registry ==
/// Reads and bumps per-key versions.
#[derive(Clone)]
pub struct VersionRegistry {
    store: Arc<dyn CacheStore>,
    codec: KeyCodec,
}

impl VersionRegistry {
    pub fn new(store: Arc<dyn CacheStore>, codec: KeyCodec) -> Self {
        Self { store, codec }
    }

    /// Current version of a rendered base (always >= 1).
    pub async fn current(&self, base: &str) -> Result<u64> {
        let bumps = self
            .store
            .get(&self.codec.version_key(base))
            .await?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|text| text.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(bumps + 1)
    }

    /// Physical key of the current version of a base.
    pub async fn physical(&self, base: &str) -> Result<String> {
        let version = self.current(base).await?;
        Ok(self.codec.physical(base, version))
    }

    /// Advances the version, returning the new one.
    pub async fn bump(&self, base: &str) -> Result<u64> {
        let bumps = self.store.increment(&self.codec.version_key(base)).await?;
        Ok(bumps.max(0) as u64 + 1)
    }
}
