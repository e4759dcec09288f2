//! # Core Wire Entities
//!
//! ## Records
//!
//! - `TransactionRequest`: broadcast once per submission by the coordinator
//! - `TransactionResponse`: one per worker per request, matched to its request
//!   solely by `transaction_id`
//! - `ComplianceResponse`: the verdict shape handed back to the inbound caller
//!
//! Field order is the wire order; serde emits fields in declaration order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for coordinator-generated transaction identifiers.
pub const TRANSACTION_ID_PREFIX: &str = "txn_";

/// Generate a fresh, never-reused transaction identifier.
///
/// The identifier doubles as the reply queue name, so it only contains
/// characters every broker accepts in a queue name.
#[must_use]
pub fn new_transaction_id() -> String {
    format!("{TRANSACTION_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// A transaction submitted for compliance checking.
///
/// `transaction_id` is empty until the coordinator assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Opaque unique id; also names the reply queue.
    #[serde(default)]
    pub transaction_id: String,
    /// Transaction hash as supplied by the caller.
    #[serde(rename = "txn_hash")]
    pub hash: String,
    /// Sender.
    pub from: String,
    /// Receiver.
    pub to: String,
    /// Amount sent from the sender to the receiver.
    pub value: i64,
}

impl TransactionRequest {
    /// Build a request without an id; the coordinator assigns one on submit.
    pub fn new(
        hash: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: i64,
    ) -> Self {
        Self {
            transaction_id: String::new(),
            hash: hash.into(),
            from: from.into(),
            to: to.into(),
            value,
        }
    }

    /// Set the transaction id.
    #[must_use]
    pub fn with_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = transaction_id.into();
        self
    }

    /// Whether an id has been assigned.
    #[must_use]
    pub fn has_id(&self) -> bool {
        !self.transaction_id.is_empty()
    }
}

/// A single worker's verdict on one request.
///
/// Without `responder_id` there is no way to tell a redelivered response from
/// a second worker's response, so both count toward quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// Echo of the request's id.
    pub transaction_id: String,
    /// Verdict of the responding worker.
    pub is_valid: bool,
    /// Stable identity of the responding worker, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_id: Option<String>,
}

impl TransactionResponse {
    /// Build an anonymous response.
    pub fn new(transaction_id: impl Into<String>, is_valid: bool) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            is_valid,
            responder_id: None,
        }
    }

    /// Attach the responder's identity.
    #[must_use]
    pub fn from_responder(mut self, responder_id: impl Into<String>) -> Self {
        self.responder_id = Some(responder_id.into());
        self
    }
}

/// Verdict payload returned to the inbound caller: `{"is_compliant": bool}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResponse {
    pub is_compliant: bool,
}
