//! Error types for the worker.

use shared_bus::TransportError;
use shared_types::CodecError;
use thiserror::Error;

/// Worker error types.
///
/// Only `Setup`, `Ack` and `StreamEnded` end a run. `Encode` and `Reply`
/// are per-message and are logged by the service.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to set up subscription: {0}")]
    Setup(#[source] TransportError),

    #[error("Failed to acknowledge delivery: {0}")]
    Ack(#[source] TransportError),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] CodecError),

    #[error("Failed to publish response: {0}")]
    Reply(#[source] TransportError),

    #[error("Subscription on '{queue}' ended unexpectedly")]
    StreamEnded { queue: String },

    #[error("Invalid worker configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;
