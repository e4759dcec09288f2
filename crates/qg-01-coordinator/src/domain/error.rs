//! Error types for the coordinator.

use shared_bus::TransportError;
use shared_types::CodecError;
use thiserror::Error;

/// Coordinator error types.
///
/// A deadline expiring is not an error; it yields a non-compliant verdict.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Failed to declare broadcast exchange: {0}")]
    ExchangeSetup(#[source] TransportError),

    #[error("Failed to set up reply queue '{queue}': {source}")]
    QueueSetup {
        queue: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to publish transaction {transaction_id}: {source}")]
    Publish {
        transaction_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to encode transaction: {0}")]
    Encode(#[from] CodecError),

    #[error("Transport failed while collecting responses for {transaction_id}: {source}")]
    Transport {
        transaction_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Transaction {0} is already in flight")]
    DuplicateTransaction(String),

    #[error("Invalid coordinator configuration: {0}")]
    InvalidConfig(String),
}

impl CoordinatorError {
    /// HTTP status the inbound layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            CoordinatorError::DuplicateTransaction(_) => 409,
            // Losing the reply stream mid-collection means the broker is gone.
            CoordinatorError::Transport { .. } => 503,
            CoordinatorError::Publish { source, .. }
            | CoordinatorError::QueueSetup { source, .. }
                if source.is_connection_level() =>
            {
                503
            }
            _ => 500,
        }
    }

    /// The transport failure behind this error, if any.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            CoordinatorError::ExchangeSetup(source)
            | CoordinatorError::QueueSetup { source, .. }
            | CoordinatorError::Publish { source, .. }
            | CoordinatorError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let publish = CoordinatorError::Publish {
            transaction_id: "t1".into(),
            source: TransportError::ExchangeNotFound("x".into()),
        };
        assert_eq!(publish.http_status(), 500);

        let closed = CoordinatorError::Transport {
            transaction_id: "t1".into(),
            source: TransportError::ConnectionClosed,
        };
        assert_eq!(closed.http_status(), 503);

        let dup = CoordinatorError::DuplicateTransaction("t1".into());
        assert_eq!(dup.http_status(), 409);
        assert!(dup.transport_error().is_none());
    }
}
