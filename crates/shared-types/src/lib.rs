//! # Shared Types Crate
//!
//! Wire records exchanged over the broker and the codec that turns them into
//! bytes.
//!
//! ## Payloads
//!
//! ```text
//! Coordinator ──TransactionRequest──→ [fanout exchange] ──→ Workers
//!                                                              │
//! Coordinator ←──TransactionResponse── [reply queue] ←─────────┘
//! ```
//!
//! - Requests: `{transaction_id, txn_hash, from, to, value}`
//! - Responses: `{transaction_id, is_valid}` plus an optional `responder_id`
//!
//! Both records are JSON on the wire (`application/json`) and must round-trip
//! byte-exact so that any producer speaking the legacy format interoperates.

pub mod codec;
pub mod entities;
pub mod errors;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, JSON_CONTENT_TYPE,
};
pub use entities::*;
pub use errors::*;
