//! # Error Types
//!
//! Errors raised while turning wire records into bytes and back.

use thiserror::Error;

/// Errors from the JSON message codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The record could not be serialized.
    #[error("Failed to encode {record}: {source}")]
    Encode {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The payload is not a valid encoding of the expected record.
    #[error("Failed to decode {record}: {source}")]
    Decode {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl CodecError {
    /// Whether this error came from a malformed inbound payload.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, CodecError::Decode { .. })
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
