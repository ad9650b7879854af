//! Codec Module
//!
//! Key rendering and payload serialization.

mod key;
mod serializer;

pub use key::{CacheKey, KeyCodec};
pub use serializer::{Decoded, Serializer};

// == Public Constants ==
/// Maximum allowed rendered key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
