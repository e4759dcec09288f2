//! # Consumer Side
//!
//! Delivery streams handed out by `Transport::consume`, and the
//! acknowledgement hook attached to manual-ack deliveries.

use crate::errors::TransportResult;
use crate::message::Delivery;
use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// Lazy sequence of deliveries from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// Settles manually acknowledged deliveries.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Acknowledge the delivery identified by `delivery_tag`.
    async fn ack(&self, delivery_tag: u64) -> TransportResult<()>;
}

/// Hook run exactly once when a consumer goes away.
pub(crate) type CancelHook = Box<dyn FnOnce() + Send>;

/// A consumer registration backed by a channel.
///
/// When dropped, the cancel hook runs so the broker can requeue unacked
/// messages and apply auto-delete.
pub struct ConsumerStream {
    queue: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    on_cancel: Option<CancelHook>,
}

impl ConsumerStream {
    pub(crate) fn new(
        queue: String,
        receiver: mpsc::UnboundedReceiver<Delivery>,
        on_cancel: CancelHook,
    ) -> Self {
        Self {
            queue,
            receiver,
            on_cancel: Some(on_cancel),
        }
    }

    /// Queue this stream consumes.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Stream for ConsumerStream {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for ConsumerStream {
    fn drop(&mut self) {
        // Deliveries still buffered in the channel are returned to the broker
        // by the hook; close first so nothing new lands here.
        self.receiver.close();
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
        debug!(queue = %self.queue, "[broker] Consumer cancelled");
    }
}
