//! Error types for the caching layer
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching layer.
///
/// The type is `Clone` so a single outcome can be handed to every caller
/// coalesced onto the same load.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The backing key-value store could not be reached (transient)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A caller-supplied loader or writer failed
    #[error("Loader failed: {0}")]
    LoaderFailure(Arc<anyhow::Error>),

    /// The write-behind queue stayed full past the enqueue timeout
    #[error("Write-behind queue full: {0}")]
    QueueFull(String),

    /// A key component or namespace violates the naming rules
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The stored value has the wrong kind for the operation
    #[error("Wrong type for key: {0}")]
    WrongType(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps a caller-supplied function's error without altering it.
    pub fn loader(err: impl Into<anyhow::Error>) -> Self {
        CacheError::LoaderFailure(Arc::new(err.into()))
    }

    /// Returns true for failures of the store itself, which reads degrade past.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;
