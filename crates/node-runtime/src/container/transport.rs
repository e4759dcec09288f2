//! Broker selection: every component connection goes through `NodeTransport`,
//! whichever broker the node was configured with.

use super::config::{BrokerConfig, BrokerMode};
use async_trait::async_trait;
use shared_bus::{
    AckMode, AmqpConnection, AmqpSettings, BrokerConnection, BrokerCredentials, DeliveryStream,
    ExchangeKind, InMemoryBroker, OutboundMessage, QueueOptions, Transport, TransportResult,
};
use std::time::Duration;
use tracing::info;

/// A connection to either broker.
#[derive(Debug)]
pub enum NodeTransport {
    InMemory(BrokerConnection),
    Amqp(AmqpConnection),
}

#[async_trait]
impl Transport for NodeTransport {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> TransportResult<()> {
        match self {
            NodeTransport::InMemory(c) => c.declare_exchange(name, kind, durable).await,
            NodeTransport::Amqp(c) => c.declare_exchange(name, kind, durable).await,
        }
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> TransportResult<String> {
        match self {
            NodeTransport::InMemory(c) => c.declare_queue(name, options).await,
            NodeTransport::Amqp(c) => c.declare_queue(name, options).await,
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        routing_key: &str,
        exchange: &str,
    ) -> TransportResult<()> {
        match self {
            NodeTransport::InMemory(c) => c.bind_queue(queue, routing_key, exchange).await,
            NodeTransport::Amqp(c) => c.bind_queue(queue, routing_key, exchange).await,
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        timeout: Duration,
    ) -> TransportResult<usize> {
        match self {
            NodeTransport::InMemory(c) => c.publish(exchange, routing_key, message, timeout).await,
            NodeTransport::Amqp(c) => c.publish(exchange, routing_key, message, timeout).await,
        }
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> TransportResult<DeliveryStream> {
        match self {
            NodeTransport::InMemory(c) => c.consume(queue, ack_mode).await,
            NodeTransport::Amqp(c) => c.consume(queue, ack_mode).await,
        }
    }

    async fn delete_queue(&self, name: &str) -> TransportResult<()> {
        match self {
            NodeTransport::InMemory(c) => c.delete_queue(name).await,
            NodeTransport::Amqp(c) => c.delete_queue(name).await,
        }
    }

    async fn close(&self) -> TransportResult<()> {
        match self {
            NodeTransport::InMemory(c) => c.close().await,
            NodeTransport::Amqp(c) => c.close().await,
        }
    }
}

/// Opens connections to the configured broker.
pub(crate) enum Connector {
    InMemory {
        broker: InMemoryBroker,
        credentials: BrokerCredentials,
    },
    Amqp(AmqpSettings),
}

impl Connector {
    /// Start an in-process broker, or remember where the network one is.
    pub(crate) fn from_config(config: &BrokerConfig) -> Self {
        match config.mode {
            BrokerMode::InMemory => {
                let broker = if config.bearer_token.is_empty() {
                    InMemoryBroker::new()
                } else {
                    InMemoryBroker::with_credential(config.bearer_token.clone())
                };
                info!("[broker] In-process broker started");
                Connector::InMemory {
                    broker,
                    credentials: config.credentials(),
                }
            }
            BrokerMode::Amqp => {
                let settings = config.amqp_settings();
                info!(
                    address = %settings.address(),
                    vhost = %settings.vhost,
                    "[broker] Using AMQP broker"
                );
                Connector::Amqp(settings)
            }
        }
    }

    pub(crate) async fn connect(&self) -> TransportResult<NodeTransport> {
        match self {
            Connector::InMemory {
                broker,
                credentials,
            } => broker.connect(credentials).map(NodeTransport::InMemory),
            Connector::Amqp(settings) => AmqpConnection::connect(settings)
                .await
                .map(NodeTransport::Amqp),
        }
    }

    /// The in-process broker, if that is what the node runs.
    pub(crate) fn in_memory(&self) -> Option<&InMemoryBroker> {
        match self {
            Connector::InMemory { broker, .. } => Some(broker),
            Connector::Amqp(_) => None,
        }
    }
}
