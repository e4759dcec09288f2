//! Driving ports (Inbound API)

use crate::domain::{ComplianceReport, CoordinatorResult};
use async_trait::async_trait;
use shared_types::TransactionRequest;
use tokio::time::Instant;

/// Entry point the inbound layer calls.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Broadcast `request` and wait for a verdict under the configured
    /// deadline.
    ///
    /// # Returns
    ///
    /// `Ok(true)` once the quorum is reached, `Ok(false)` if the deadline
    /// expires first. Errors only for setup, publish or transport failures.
    async fn submit(&self, request: TransactionRequest) -> CoordinatorResult<bool>;

    /// As `submit`, bounded by the earlier of `deadline` and the configured
    /// deadline.
    async fn submit_with_deadline(
        &self,
        request: TransactionRequest,
        deadline: Instant,
    ) -> CoordinatorResult<bool>;

    /// Submit and return the full report.
    async fn submit_detailed(
        &self,
        request: TransactionRequest,
        deadline: Option<Instant>,
    ) -> CoordinatorResult<ComplianceReport>;
}
