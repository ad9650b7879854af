//! Serializer Module
//!
//! JSON wire form for cached values. Every payload is wrapped in an envelope
//! that records when it was written, which prefetch uses to avoid replacing
//! newer data.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    #[serde(rename = "w")]
    written_at_ms: i64,
    #[serde(rename = "d")]
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "w")]
    written_at_ms: i64,
    #[serde(rename = "d")]
    data: T,
}

// == Decoded ==
/// A decoded value with its write timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub written_at_ms: i64,
}

// == Serializer ==
/// Encodes values into envelope bytes and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer;

impl Serializer {
    pub fn new() -> Self {
        Self
    }

    /// Encodes `value` stamped with `written_at_ms`.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T, written_at_ms: i64) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            written_at_ms,
            data: value,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Plain JSON for `value`, without an envelope.
    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decodes an envelope into a typed value.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Decoded<T>> {
        let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
        Ok(Decoded {
            value: envelope.data,
            written_at_ms: envelope.written_at_ms,
        })
    }

    /// Reads only the write timestamp of an envelope.
    pub fn written_at(&self, bytes: &[u8]) -> Result<i64> {
        let envelope: Envelope<IgnoredAny> = serde_json::from_slice(bytes)?;
        Ok(envelope.written_at_ms)
    }
}
