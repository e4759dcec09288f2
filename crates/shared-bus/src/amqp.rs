//! # AMQP Adapter
//!
//! `Transport` over a network broker speaking AMQP 0-9-1, built on `lapin`.
//!
//! One `AmqpConnection` owns one broker connection:
//!
//! - a shared command channel in publisher-confirm mode carries declarations,
//!   binds, deletes and publishes; it is reopened if the broker closes it
//!   after a channel-level error
//! - every consumer gets a channel of its own, closed when the stream is
//!   dropped, so the broker requeues whatever that consumer left unacked
//!
//! Bearer tokens are presented through SASL PLAIN as the password, with an
//! empty username.

use crate::broker::BrokerCredentials;
use crate::errors::{TransportError, TransportResult};
use crate::message::{
    AckMode, Delivery, ExchangeKind, MessageProperties, OutboundMessage, QueueOptions,
};
use crate::subscriber::{Acknowledger, DeliveryStream};
use crate::transport::Transport;
use crate::{DEFAULT_BROKER_PORT, DEFAULT_EXCHANGE};
use async_trait::async_trait;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{FieldTable, ShortString};
use lapin::uri::AMQPUri;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Reply code for a normal channel or connection close.
const REPLY_SUCCESS: u16 = 200;

/// Where a network broker lives and how to log in.
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub credentials: BrokerCredentials,
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_BROKER_PORT,
            vhost: "/".to_string(),
            credentials: BrokerCredentials::anonymous(),
        }
    }
}

impl AmqpSettings {
    /// `host:port`, for logs and errors.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The connection URI handed to `lapin`.
    #[must_use]
    pub fn uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority.host = self.host.clone();
        uri.authority.port = self.port;
        uri.authority.userinfo.username = self.credentials.username.clone();
        uri.authority.userinfo.password = self.credentials.password.clone();
        uri.vhost = self.vhost.clone();
        uri
    }
}

impl fmt::Debug for AmqpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// What a failed operation was acting on.
#[derive(Clone, Copy)]
enum Target<'a> {
    Exchange(&'a str),
    Queue(&'a str),
}

fn map_error(error: lapin::Error, target: Target<'_>) -> TransportError {
    match error {
        lapin::Error::InvalidConnectionState(_)
        | lapin::Error::InvalidChannelState(_)
        | lapin::Error::IOError(_) => TransportError::ConnectionClosed,
        lapin::Error::ProtocolError(amqp) => {
            let message = amqp.get_message().to_string();
            match (amqp.kind(), target) {
                (AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND), Target::Exchange(name)) => {
                    TransportError::ExchangeNotFound(name.to_string())
                }
                (AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND), Target::Queue(name)) => {
                    TransportError::QueueNotFound(name.to_string())
                }
                (AMQPErrorKind::Soft(AMQPSoftError::RESOURCELOCKED), Target::Queue(name)) => {
                    TransportError::ResourceLocked {
                        queue: name.to_string(),
                    }
                }
                (AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED), _) => {
                    TransportError::PreconditionFailed(message)
                }
                // Raised when a second exclusive consumer attaches.
                (AMQPErrorKind::Soft(AMQPSoftError::ACCESSREFUSED), Target::Queue(name)) => {
                    TransportError::QueueBusy(name.to_string())
                }
                (AMQPErrorKind::Hard(_), _) => TransportError::ConnectionClosed,
                _ => TransportError::Broker(message),
            }
        }
        other => TransportError::Broker(other.to_string()),
    }
}

fn map_connect_error(error: lapin::Error, settings: &AmqpSettings) -> TransportError {
    if let lapin::Error::ProtocolError(amqp) = &error {
        if matches!(
            amqp.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::ACCESSREFUSED)
                | AMQPErrorKind::Hard(lapin::protocol::AMQPHardError::NOTALLOWED)
        ) {
            return TransportError::AuthenticationFailed {
                username: settings.credentials.username.clone(),
            };
        }
    }
    TransportError::Unreachable {
        address: settings.address(),
        reason: error.to_string(),
    }
}

fn short(value: &Option<ShortString>) -> Option<String> {
    value.as_ref().map(|s| s.as_str().to_string())
}

/// A client connection to a network AMQP broker.
pub struct AmqpConnection {
    address: String,
    connection: Connection,
    commands: Mutex<Option<Channel>>,
}

impl AmqpConnection {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when the broker refuses the credential,
    /// `Unreachable` for anything else that prevents the handshake.
    pub async fn connect(settings: &AmqpSettings) -> TransportResult<Self> {
        let address = settings.address();
        let connection = Connection::connect_uri(settings.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| {
                warn!(address = %address, error = %e, "[amqp] Connection failed");
                map_connect_error(e, settings)
            })?;
        info!(address = %address, vhost = %settings.vhost, "[amqp] Connected");

        Ok(Self {
            address,
            connection,
            commands: Mutex::new(None),
        })
    }

    async fn open_channel(&self) -> TransportResult<Channel> {
        self.connection
            .create_channel()
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// The shared command channel, opened on first use and after the broker
    /// closes it.
    async fn commands(&self) -> TransportResult<Channel> {
        let mut slot = self.commands.lock().await;
        if let Some(channel) = slot.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.open_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        debug!(channel = channel.id(), "[amqp] Command channel opened");
        *slot = Some(channel.clone());
        Ok(channel)
    }
}

impl fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("address", &self.address)
            .field("connected", &self.connection.status().connected())
            .finish()
    }
}

#[async_trait]
impl Transport for AmqpConnection {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> TransportResult<()> {
        if name == DEFAULT_EXCHANGE {
            return Ok(());
        }
        let kind = match kind {
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        };
        let options = ExchangeDeclareOptions {
            durable,
            ..Default::default()
        };
        self.commands()
            .await?
            .exchange_declare(name, kind, options, FieldTable::default())
            .await
            .map_err(|e| map_error(e, Target::Exchange(name)))?;
        debug!(exchange = %name, durable, "[amqp] Exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> TransportResult<String> {
        let declare = QueueDeclareOptions {
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            ..Default::default()
        };
        let queue = self
            .commands()
            .await?
            .queue_declare(name, declare, FieldTable::default())
            .await
            .map_err(|e| map_error(e, Target::Queue(name)))?;
        let name = queue.name().as_str().to_string();
        debug!(queue = %name, ?options, "[amqp] Queue declared");
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        routing_key: &str,
        exchange: &str,
    ) -> TransportResult<()> {
        if exchange == DEFAULT_EXCHANGE {
            return Err(TransportError::PreconditionFailed(
                "cannot bind to the default exchange".to_string(),
            ));
        }
        self.commands()
            .await?
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| map_error(e, Target::Queue(queue)))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        timeout: Duration,
    ) -> TransportResult<usize> {
        let mut properties = BasicProperties::default();
        if let Some(content_type) = message.properties.content_type {
            properties = properties.with_content_type(content_type.into());
        }
        if let Some(reply_to) = message.properties.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }
        if let Some(correlation_id) = message.properties.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }

        // Mandatory, so an unroutable message comes back with the confirm
        // instead of vanishing.
        let options = BasicPublishOptions {
            mandatory: true,
            ..Default::default()
        };
        let channel = self.commands().await?;
        let confirmed = async {
            channel
                .basic_publish(exchange, routing_key, options, &message.payload, properties)
                .await?
                .await
        };

        let confirmation = tokio::time::timeout(timeout, confirmed)
            .await
            .map_err(|_| TransportError::PublishTimeout {
                exchange: exchange.to_string(),
                timeout,
            })?
            .map_err(|e| map_error(e, Target::Exchange(exchange)))?;

        // The protocol does not report how many queues received a message,
        // only whether it was returned.
        match confirmation {
            Confirmation::Ack(Some(_)) => {
                debug!(
                    exchange = %exchange,
                    routing_key = %routing_key,
                    "[amqp] Message unroutable, returned"
                );
                Ok(0)
            }
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(1),
            Confirmation::Nack(_) => Err(TransportError::PublishRejected(exchange.to_string())),
        }
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> TransportResult<DeliveryStream> {
        let channel = self.open_channel().await?;
        let options = BasicConsumeOptions {
            no_ack: ack_mode == AckMode::Auto,
            exclusive: true,
            ..Default::default()
        };
        let consumer = match channel
            .basic_consume(queue, "", options, FieldTable::default())
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                close_channel(channel, queue.to_string());
                return Err(map_error(e, Target::Queue(queue)));
            }
        };
        debug!(queue = %queue, ?ack_mode, "[amqp] Consumer started");

        Ok(Box::pin(AmqpConsumerStream {
            queue: queue.to_string(),
            channel,
            consumer,
            manual: ack_mode == AckMode::Manual,
        }))
    }

    async fn delete_queue(&self, name: &str) -> TransportResult<()> {
        let result = self
            .commands()
            .await?
            .queue_delete(name, QueueDeleteOptions::default())
            .await
            .map_err(|e| map_error(e, Target::Queue(name)));
        match result {
            Ok(_) | Err(TransportError::QueueNotFound(_)) => {
                debug!(queue = %name, "[amqp] Queue deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.connection.status().connected() {
            return Ok(());
        }
        match self.connection.close(REPLY_SUCCESS, "client shutdown").await {
            Ok(()) | Err(lapin::Error::InvalidConnectionState(_)) => {
                info!(address = %self.address, "[amqp] Connection closed");
                Ok(())
            }
            Err(e) => Err(map_error(e, Target::Exchange(DEFAULT_EXCHANGE))),
        }
    }
}

/// Close a consumer channel in the background.
fn close_channel(channel: Channel, queue: String) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = channel.close(REPLY_SUCCESS, "consumer cancelled").await {
            debug!(queue = %queue, error = %e, "[amqp] Consumer channel already closed");
        }
    });
}

/// Acks one delivery on the channel it arrived on.
struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self, delivery_tag: u64) -> TransportResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| match map_error(e, Target::Queue("")) {
                TransportError::PreconditionFailed(_) => {
                    TransportError::UnknownDeliveryTag(delivery_tag)
                }
                other => other,
            })
    }
}

fn to_delivery(delivery: lapin::message::Delivery, manual: bool) -> Delivery {
    let properties = MessageProperties {
        content_type: short(delivery.properties.content_type()),
        reply_to: short(delivery.properties.reply_to()),
        correlation_id: short(delivery.properties.correlation_id()),
    };
    let mut converted = Delivery::new(
        delivery.exchange.as_str(),
        delivery.routing_key.as_str(),
        delivery.data,
        properties,
    );
    converted.redelivered = delivery.redelivered;
    if manual {
        let acker = Arc::new(AmqpAcker(delivery.acker));
        converted = converted.with_acknowledger(acker, delivery.delivery_tag);
    }
    converted
}

/// Deliveries from one consumer channel.
struct AmqpConsumerStream {
    queue: String,
    channel: Channel,
    consumer: Consumer,
    manual: bool,
}

impl Stream for AmqpConsumerStream {
    type Item = Delivery;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.consumer).poll_next(cx) {
            Poll::Ready(Some(Ok(delivery))) => {
                Poll::Ready(Some(to_delivery(delivery, this.manual)))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(queue = %this.queue, error = %e, "[amqp] Consumer failed");
                Poll::Ready(None)
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for AmqpConsumerStream {
    fn drop(&mut self) {
        close_channel(self.channel.clone(), std::mem::take(&mut self.queue));
    }
}
