//! Driving ports (Inbound API)

use crate::domain::WorkerResult;
use async_trait::async_trait;
use tokio::sync::watch;

/// Lifecycle the node runtime drives.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Identity stamped on this worker's responses.
    fn responder_id(&self) -> &str;

    /// Answer broadcasts until `shutdown` flips to `true`.
    ///
    /// # Returns
    ///
    /// `Ok(())` on shutdown. `Err` when the subscription is lost or an
    /// acknowledgement fails.
    async fn run(&self, shutdown: watch::Receiver<bool>) -> WorkerResult<()>;
}
