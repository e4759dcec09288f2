//! # Messages and Declaration Options
//!
//! Value types exchanged with a `Transport`.

use crate::errors::TransportResult;
use crate::subscriber::Acknowledger;
use std::fmt;
use std::sync::Arc;

/// Exchange routing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Deliver to every bound queue, ignoring the routing key.
    Fanout,
    /// Deliver to queues bound with a routing key equal to the message's.
    Direct,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Direct => write!(f, "direct"),
        }
    }
}

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    /// Survive a broker restart.
    pub durable: bool,
    /// Owned by the declaring connection; deleted when it closes.
    pub exclusive: bool,
    /// Deleted when its consumer is cancelled.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Per-request reply mailbox: exclusive, non-durable, explicitly deleted.
    #[must_use]
    pub fn reply_queue() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: false,
        }
    }

    /// A subscriber's private queue: exclusive and auto-deleting.
    #[must_use]
    pub fn anonymous_subscriber() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// How deliveries are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Settled as soon as the broker hands the message out.
    Auto,
    /// Settled only by `Delivery::ack`; redelivered if the consumer goes away.
    Manual,
}

/// Message properties carried alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    /// Queue the receiver should address its reply to.
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

/// A message about to be published.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
}

impl OutboundMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            properties: MessageProperties::default(),
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.properties.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, queue: impl Into<String>) -> Self {
        self.properties.reply_to = Some(queue.into());
        self
    }

    #[must_use]
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.properties.correlation_id = Some(id.into());
        self
    }
}

/// A message handed to a consumer.
pub struct Delivery {
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key it was published with.
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
    /// Set when this message was handed out before and not acknowledged.
    pub redelivered: bool,
    /// Present only for manually acknowledged deliveries.
    pub(crate) acker: Option<(Arc<dyn Acknowledger>, u64)>,
}

impl Delivery {
    /// Build a delivery from its parts.
    ///
    /// Transports attach an acknowledger for manual-ack consumers.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
        properties: MessageProperties,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            payload,
            properties,
            redelivered: false,
            acker: None,
        }
    }

    #[must_use]
    pub fn with_acknowledger(mut self, acker: Arc<dyn Acknowledger>, delivery_tag: u64) -> Self {
        self.acker = Some((acker, delivery_tag));
        self
    }

    /// Broker-assigned tag, for manually acknowledged deliveries.
    #[must_use]
    pub fn delivery_tag(&self) -> Option<u64> {
        self.acker.as_ref().map(|(_, tag)| *tag)
    }

    /// Acknowledge the delivery. A no-op for auto-ack deliveries.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed or the tag is no longer tracked.
    pub async fn ack(self) -> TransportResult<()> {
        match self.acker {
            Some((acker, tag)) => acker.ack(tag).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .field("properties", &self.properties)
            .field("redelivered", &self.redelivered)
            .field("delivery_tag", &self.delivery_tag())
            .finish()
    }
}
