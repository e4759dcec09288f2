//! # Transport Port
//!
//! The broker operations the coordinator and workers depend on. Implementations
//! must be safe for concurrent use: many in-flight submissions publish and
//! consume through one handle at the same time.

use crate::errors::TransportResult;
use crate::message::{AckMode, ExchangeKind, OutboundMessage, QueueOptions};
use crate::subscriber::DeliveryStream;
use async_trait::async_trait;
use std::time::Duration;

/// A connection to a publish/subscribe broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare an exchange. Idempotent for identical arguments.
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> TransportResult<()>;

    /// Declare a queue and return its name.
    ///
    /// An empty `name` asks the broker to generate a unique one.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> TransportResult<String>;

    /// Bind `queue` to `exchange` with `routing_key`.
    async fn bind_queue(&self, queue: &str, routing_key: &str, exchange: &str)
        -> TransportResult<()>;

    /// Publish a message and wait up to `timeout` for the broker to accept it.
    ///
    /// # Returns
    ///
    /// The number of queues the message was routed to. Zero is not an error:
    /// unroutable messages are dropped by the broker.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        timeout: Duration,
    ) -> TransportResult<usize>;

    /// Start consuming a queue.
    ///
    /// The stream ends when the consumer is cancelled by the broker (queue
    /// deleted, connection closed). Dropping the stream cancels the consumer.
    async fn consume(&self, queue: &str, ack_mode: AckMode) -> TransportResult<DeliveryStream>;

    /// Delete a queue. Deleting a queue that does not exist succeeds.
    async fn delete_queue(&self, name: &str) -> TransportResult<()>;

    /// Close the connection, releasing every exclusive queue it owns.
    async fn close(&self) -> TransportResult<()>;
}
