//! # Shared Bus - Broker Transport
//!
//! The publish/subscribe substrate both the coordinator and the workers talk
//! to. It follows the AMQP 0-9-1 model: messages are published to exchanges,
//! exchanges route them into queues, consumers read queues and acknowledge.
//!
//! ## Routing
//!
//! ```text
//!                     ┌──────────────────────┐
//!  publish(x, "") ──→ │ fanout exchange "x"  │ ──→ every bound queue
//!                     └──────────────────────┘
//!                     ┌──────────────────────┐
//!  publish("", q) ──→ │ default exchange ""  │ ──→ queue named `q` (if any)
//!                     └──────────────────────┘
//! ```
//!
//! ## Queue ownership
//!
//! - **Exclusive** queues belong to the declaring connection and vanish when it
//!   closes; other connections may publish into them but not consume, rebind,
//!   redeclare or delete them.
//! - **Auto-delete** queues vanish when their consumer is cancelled.
//! - Manually acknowledged deliveries that are still unacked when a consumer
//!   goes away are requeued and redelivered.
//!
//! `Transport` is the port. `AmqpConnection` talks to a network broker;
//! `InMemoryBroker` is the in-process implementation used by tests and
//! single-process deployments.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod amqp;
pub mod broker;
pub mod errors;
pub mod message;
pub mod subscriber;
pub mod transport;

// Re-export main types
pub use amqp::{AmqpConnection, AmqpSettings};
pub use broker::{BrokerConnection, BrokerCredentials, InMemoryBroker};
pub use errors::{TransportError, TransportResult};
pub use message::{
    AckMode, Delivery, ExchangeKind, MessageProperties, OutboundMessage, QueueOptions,
};
pub use subscriber::{Acknowledger, DeliveryStream};
pub use transport::Transport;

/// Name of the nameless default exchange (routes by queue name).
pub const DEFAULT_EXCHANGE: &str = "";

/// Prefix of server-generated queue names.
pub const SERVER_NAMED_QUEUE_PREFIX: &str = "amq.gen-";

/// Default broker port.
pub const DEFAULT_BROKER_PORT: u16 = 5672;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_exchange_is_nameless() {
        assert!(DEFAULT_EXCHANGE.is_empty());
    }
}
