//! Store Module
//!
//! The narrow contract every component uses to reach the external key-value
//! store, plus an in-memory implementation of it.

mod batch;
mod entry;
mod memory;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;

pub use batch::{BatchOp, BatchReply};
pub use entry::{CacheEntry, StoredValue};
pub use memory::InMemoryStore;

// == Public Constants ==
/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

// == Cache Store ==
/// Primitive operations of the external key-value store.
///
/// TTLs are whole seconds; `0` means the key does not expire. Every operation
/// except [`CacheStore::increment`] is idempotent.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Reads a byte value. Absent and expired keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a byte value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;

    /// Removes a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increments an integer counter, creating it at zero first.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Replaces the TTL of an existing key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool>;

    /// Adds a member to a set. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Removes a member from a set. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Lists the members of a set; an absent set is empty.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Runs operations in order and reports each outcome separately.
    ///
    /// A failing operation does not stop the ones after it.
    async fn batch(&self, ops: Vec<BatchOp>) -> Vec<Result<BatchReply>> {
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            let reply = match op {
                BatchOp::Get { key } => self.get(&key).await.map(BatchReply::Value),
                BatchOp::Set {
                    key,
                    value,
                    ttl_seconds,
                } => self
                    .set(&key, value, ttl_seconds)
                    .await
                    .map(|_| BatchReply::Done),
                BatchOp::Delete { key } => self.delete(&key).await.map(BatchReply::Flag),
                BatchOp::Increment { key } => self.increment(&key).await.map(BatchReply::Count),
                BatchOp::Expire { key, ttl_seconds } => {
                    self.expire(&key, ttl_seconds).await.map(BatchReply::Flag)
                }
                BatchOp::SetAdd { key, member } => {
                    self.set_add(&key, &member).await.map(BatchReply::Flag)
                }
                BatchOp::SetRemove { key, member } => {
                    self.set_remove(&key, &member).await.map(BatchReply::Flag)
                }
                BatchOp::SetMembers { key } => {
                    self.set_members(&key).await.map(BatchReply::Members)
                }
            };
            replies.push(reply);
        }
        replies
    }
}
