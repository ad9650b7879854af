//! Caller-supplied writers to the authoritative backing store.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

// == Backing Writer ==
/// Writes a value to the system of record.
///
/// `payload` is the JSON encoding of the value; `key` is the rendered
/// logical key.
#[async_trait]
pub trait BackingWriter: Send + Sync + 'static {
    async fn write(&self, key: &str, payload: &[u8]) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> BackingWriter for F
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn write(&self, key: &str, payload: &[u8]) -> anyhow::Result<()> {
        (self)(key.to_string(), payload.to_vec()).await
    }
}

// == Write Strategy ==
/// How `put` reaches the backing store.
#[derive(Clone)]
pub enum WriteStrategy {
    /// Writer first; cache only after the writer succeeds
    WriteThrough(Arc<dyn BackingWriter>),
    /// Cache now; writer later from the write-behind queue
    WriteBehind(Arc<dyn BackingWriter>),
}

impl WriteStrategy {
    pub fn write_through(writer: impl BackingWriter) -> Self {
        WriteStrategy::WriteThrough(Arc::new(writer))
    }

    pub fn write_behind(writer: impl BackingWriter) -> Self {
        WriteStrategy::WriteBehind(Arc::new(writer))
    }
}

impl fmt::Debug for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStrategy::WriteThrough(_) => write!(f, "WriteThrough"),
            WriteStrategy::WriteBehind(_) => write!(f, "WriteBehind"),
        }
    }
}
