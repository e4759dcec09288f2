//! Driven ports (Outbound dependencies)

use async_trait::async_trait;
use shared_types::TransactionRequest;

/// Decides whether a transaction is valid.
///
/// Implementations may take arbitrary time; the worker acknowledges the
/// request only after the verdict has been published.
#[async_trait]
pub trait TransactionValidator: Send + Sync {
    async fn validate(&self, request: &TransactionRequest) -> bool;
}
