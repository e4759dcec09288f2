//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by broker operations.
///
/// None of these are retried by the transport itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection (or the broker behind it) is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The broker rejected the supplied credential.
    #[error("Authentication failed for user '{username}'")]
    AuthenticationFailed { username: String },

    /// Publish or bind against an exchange that was never declared.
    #[error("Exchange not found: '{0}'")]
    ExchangeNotFound(String),

    /// Operation against a queue that does not exist.
    #[error("Queue not found: '{0}'")]
    QueueNotFound(String),

    /// The queue is exclusive to another connection.
    #[error("Queue '{queue}' is locked by another connection")]
    ResourceLocked { queue: String },

    /// Redeclaration with different arguments, or an illegal operation.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The queue already has a consumer.
    #[error("Queue '{0}' already has a consumer")]
    QueueBusy(String),

    /// The broker did not confirm a publish in time.
    #[error("Publish to exchange '{exchange}' not confirmed within {timeout:?}")]
    PublishTimeout { exchange: String, timeout: Duration },

    /// Ack for a delivery the broker is not tracking.
    #[error("Unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    /// The consumer was cancelled by the broker (queue deleted, connection lost).
    #[error("Consumer on queue '{0}' was cancelled")]
    ConsumerCancelled(String),

    /// No connection could be opened to the broker.
    #[error("Broker at {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// The broker negatively acknowledged a publish.
    #[error("Publish to exchange '{0}' rejected by the broker")]
    PublishRejected(String),

    /// Any other broker-reported failure.
    #[error("Broker error: {0}")]
    Broker(String),
}

impl TransportError {
    /// Whether the error means the connection itself is unusable.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionClosed
                | TransportError::AuthenticationFailed { .. }
                | TransportError::Unreachable { .. }
        )
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
