//! Ownership guards for per-submission resources.

use crate::domain::CoordinatorError;
use parking_lot::Mutex;
use shared_bus::Transport;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exclusive lease on a reply queue.
///
/// `release` deletes the queue. If the lease is dropped without being
/// released (the submitting future was cancelled), deletion is spawned onto
/// the current runtime instead. Either way the transaction id stays in flight
/// until the delete has finished, so a retry under the same id can never
/// adopt the old queue.
pub(crate) struct ReplyQueueLease<T: Transport + 'static> {
    transport: Arc<T>,
    name: String,
    in_flight: Option<InFlightGuard>,
    released: bool,
}

impl<T: Transport + 'static> ReplyQueueLease<T> {
    pub(crate) fn new(transport: Arc<T>, name: String, in_flight: InFlightGuard) -> Self {
        Self {
            transport,
            name,
            in_flight: Some(in_flight),
            released: false,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Delete the queue. Failures are logged, never returned.
    pub(crate) async fn release(mut self) {
        self.released = true;
        match self.transport.delete_queue(&self.name).await {
            Ok(()) => debug!(queue = %self.name, "[coordinator] Reply queue deleted"),
            Err(e) => warn!(
                queue = %self.name,
                error = %e,
                "[coordinator] Failed to delete reply queue"
            ),
        }
        self.in_flight.take();
    }
}

impl<T: Transport + 'static> Drop for ReplyQueueLease<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.name, "[coordinator] No runtime to delete abandoned reply queue");
            return;
        };

        let transport = self.transport.clone();
        let name = std::mem::take(&mut self.name);
        let in_flight = self.in_flight.take();
        runtime.spawn(async move {
            if let Err(e) = transport.delete_queue(&name).await {
                warn!(
                    queue = %name,
                    error = %e,
                    "[coordinator] Failed to delete abandoned reply queue"
                );
            } else {
                debug!(queue = %name, "[coordinator] Abandoned reply queue deleted");
            }
            drop(in_flight);
        });
    }
}

/// Registration of a transaction id as in flight on this coordinator.
///
/// Removed from the set when dropped.
pub(crate) struct InFlightGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    transaction_id: String,
}

impl InFlightGuard {
    pub(crate) fn register(
        registry: &Arc<Mutex<HashSet<String>>>,
        transaction_id: &str,
    ) -> Result<Self, CoordinatorError> {
        if !registry.lock().insert(transaction_id.to_string()) {
            return Err(CoordinatorError::DuplicateTransaction(
                transaction_id.to_string(),
            ));
        }
        Ok(Self {
            registry: registry.clone(),
            transaction_id: transaction_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.transaction_id);
    }
}
