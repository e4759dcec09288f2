//! # Message Codec
//!
//! JSON encoding of the wire records. Every payload published to the broker
//! goes through these functions so both sides agree on the bytes.

use crate::entities::{TransactionRequest, TransactionResponse};
use crate::errors::{CodecError, CodecResult};

/// Content type attached to every published payload.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Encode a request for broadcast.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode_request(request: &TransactionRequest) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(request).map_err(|source| CodecError::Encode {
        record: "TransactionRequest",
        source,
    })
}

/// Decode a broadcast request.
///
/// # Errors
///
/// Returns `CodecError::Decode` for malformed payloads.
pub fn decode_request(payload: &[u8]) -> CodecResult<TransactionRequest> {
    serde_json::from_slice(payload).map_err(|source| CodecError::Decode {
        record: "TransactionRequest",
        source,
    })
}

/// Encode a worker response.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode_response(response: &TransactionResponse) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(response).map_err(|source| CodecError::Encode {
        record: "TransactionResponse",
        source,
    })
}

/// Decode a worker response.
///
/// # Errors
///
/// Returns `CodecError::Decode` for malformed payloads.
pub fn decode_response(payload: &[u8]) -> CodecResult<TransactionResponse> {
    serde_json::from_slice(payload).map_err(|source| CodecError::Decode {
        record: "TransactionResponse",
        source,
    })
}
