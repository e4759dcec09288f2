//! # In-Memory Broker
//!
//! An in-process broker with AMQP 0-9-1 routing and ownership semantics.
//! Each `BrokerConnection` is an independent client handle implementing
//! `Transport`; connections share the broker's exchanges and queues.
//!
//! All broker state lives behind one mutex that is never held across an
//! `.await`, so every operation completes synchronously.

use crate::errors::{TransportError, TransportResult};
use crate::message::{
    AckMode, Delivery, ExchangeKind, MessageProperties, OutboundMessage, QueueOptions,
};
use crate::subscriber::{Acknowledger, ConsumerStream, DeliveryStream};
use crate::transport::Transport;
use crate::{DEFAULT_EXCHANGE, SERVER_NAMED_QUEUE_PREFIX};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type ConnectionId = u64;

/// Credentials presented when opening a connection.
///
/// Bearer tokens travel as the password with an empty username.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

impl BrokerCredentials {
    /// Credentials carrying an opaque bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            password: token.into(),
        }
    }

    /// No credentials at all.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A message at rest in a queue.
#[derive(Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    payload: Vec<u8>,
    properties: MessageProperties,
    redelivered: bool,
}

impl StoredMessage {
    fn into_delivery(self) -> Delivery {
        let mut delivery =
            Delivery::new(self.exchange, self.routing_key, self.payload, self.properties);
        delivery.redelivered = self.redelivered;
        delivery
    }
}

struct Binding {
    queue: String,
    routing_key: String,
}

struct ExchangeState {
    kind: ExchangeKind,
    durable: bool,
    bindings: Vec<Binding>,
}

struct ConsumerState {
    tag: u64,
    connection: ConnectionId,
    ack_mode: AckMode,
    sender: mpsc::UnboundedSender<Delivery>,
    acker: Arc<dyn Acknowledger>,
    /// Manually acknowledged deliveries still outstanding, by delivery tag.
    unacked: BTreeMap<u64, StoredMessage>,
}

struct QueueState {
    options: QueueOptions,
    owner: Option<ConnectionId>,
    ready: VecDeque<StoredMessage>,
    consumer: Option<ConsumerState>,
}

impl QueueState {
    fn check_access(&self, name: &str, connection: ConnectionId) -> TransportResult<()> {
        match self.owner {
            Some(owner) if owner != connection => Err(TransportError::ResourceLocked {
                queue: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Hand a message to the consumer, or park it if there is none.
    fn push(&mut self, message: StoredMessage, next_tag: &mut u64) {
        let Some(consumer) = self.consumer.as_mut() else {
            self.ready.push_back(message);
            return;
        };

        let mut delivery = message.clone().into_delivery();
        let mut tag = None;
        if consumer.ack_mode == AckMode::Manual {
            *next_tag += 1;
            let delivery_tag = *next_tag;
            consumer.unacked.insert(delivery_tag, message.clone());
            delivery = delivery.with_acknowledger(consumer.acker.clone(), delivery_tag);
            tag = Some(delivery_tag);
        }

        if consumer.sender.send(delivery).is_err() {
            // Stream dropped but its cancel hook has not run yet.
            if let Some(delivery_tag) = tag {
                consumer.unacked.remove(&delivery_tag);
            }
            self.ready.push_back(message);
        }
    }

    fn drain_ready(&mut self, next_tag: &mut u64) {
        if self.consumer.is_none() {
            return;
        }
        for message in std::mem::take(&mut self.ready) {
            self.push(message, next_tag);
        }
    }
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeState>,
    queues: HashMap<String, QueueState>,
    open_connections: HashSet<ConnectionId>,
    next_delivery_tag: u64,
    next_consumer_tag: u64,
}

impl BrokerState {
    fn check_open(&self, connection: ConnectionId) -> TransportResult<()> {
        if self.open_connections.contains(&connection) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }

    fn remove_queue(&mut self, name: &str) -> Option<QueueState> {
        let removed = self.queues.remove(name)?;
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|b| b.queue != name);
        }
        Some(removed)
    }

    /// Detach a consumer: requeue what it never acknowledged and apply
    /// auto-delete.
    fn cancel_consumer(&mut self, queue_name: &str, consumer_tag: u64) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };
        if queue.consumer.as_ref().map(|c| c.tag) != Some(consumer_tag) {
            return;
        }
        let Some(consumer) = queue.consumer.take() else {
            return;
        };

        let requeued = consumer.unacked.len();
        for (_, mut message) in consumer.unacked.into_iter().rev() {
            message.redelivered = true;
            queue.ready.push_front(message);
        }
        if requeued > 0 {
            debug!(queue = %queue_name, requeued, "[broker] Requeued unacked deliveries");
        }

        if queue.options.auto_delete {
            self.remove_queue(queue_name);
            debug!(queue = %queue_name, "[broker] Auto-deleted queue");
        }
    }

    fn close_connection(&mut self, connection: ConnectionId) {
        if !self.open_connections.remove(&connection) {
            return;
        }

        let owned: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, q)| q.owner == Some(connection))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &owned {
            self.remove_queue(name);
        }

        let consuming: Vec<(String, u64)> = self
            .queues
            .iter()
            .filter_map(|(name, q)| {
                q.consumer
                    .as_ref()
                    .filter(|c| c.connection == connection)
                    .map(|c| (name.clone(), c.tag))
            })
            .collect();
        for (name, tag) in consuming {
            self.cancel_consumer(&name, tag);
        }

        debug!(
            connection,
            exclusive_queues_removed = owned.len(),
            "[broker] Connection closed"
        );
    }
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    credential: Option<String>,
    next_connection: AtomicU64,
}

/// In-process broker.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create a broker that accepts any credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a broker that only accepts connections presenting `token` as
    /// their password.
    pub fn with_credential(token: impl Into<String>) -> Self {
        Self::build(Some(token.into()))
    }

    fn build(credential: Option<String>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                credential,
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` if the broker requires a credential and the
    /// password does not match it.
    pub fn connect(&self, credentials: &BrokerCredentials) -> TransportResult<BrokerConnection> {
        if let Some(expected) = &self.inner.credential {
            if credentials.password != *expected {
                warn!(username = %credentials.username, "[broker] Rejected connection");
                return Err(TransportError::AuthenticationFailed {
                    username: credentials.username.clone(),
                });
            }
        }

        let id = self.inner.next_connection.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().open_connections.insert(id);
        debug!(connection = id, "[broker] Connection opened");

        Ok(BrokerConnection {
            id,
            inner: self.inner.clone(),
        })
    }

    /// Simulate the broker going away: every connection is closed and every
    /// queue is dropped, ending all consumer streams.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        let connections: Vec<ConnectionId> = state.open_connections.iter().copied().collect();
        for connection in connections {
            state.close_connection(connection);
        }
        state.queues.clear();
        for exchange in state.exchanges.values_mut() {
            exchange.bindings.clear();
        }
        info!("[broker] Shut down");
    }

    #[must_use]
    pub fn queue_exists(&self, name: &str) -> bool {
        self.inner.state.lock().queues.contains_key(name)
    }

    /// Messages waiting in a queue (not counting unacked deliveries).
    #[must_use]
    pub fn message_count(&self, name: &str) -> Option<usize> {
        self.inner.state.lock().queues.get(name).map(|q| q.ready.len())
    }

    /// Deliveries handed to the consumer of `name` and not yet acknowledged.
    #[must_use]
    pub fn unacked_count(&self, name: &str) -> Option<usize> {
        self.inner
            .state
            .lock()
            .queues
            .get(name)
            .map(|q| q.consumer.as_ref().map_or(0, |c| c.unacked.len()))
    }

    #[must_use]
    pub fn has_consumer(&self, name: &str) -> bool {
        self.inner
            .state
            .lock()
            .queues
            .get(name)
            .is_some_and(|q| q.consumer.is_some())
    }

    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.inner.state.lock().queues.len()
    }

    #[must_use]
    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        self.inner.state.lock().exchanges.get(name).map(|x| x.kind)
    }

    /// Number of queues bound to an exchange.
    #[must_use]
    pub fn binding_count(&self, exchange: &str) -> usize {
        self.inner
            .state
            .lock()
            .exchanges
            .get(exchange)
            .map_or(0, |x| x.bindings.len())
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().open_connections.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Settles deliveries for one consumer registration.
struct QueueAcker {
    broker: Weak<BrokerInner>,
    queue: String,
    consumer_tag: u64,
    connection: ConnectionId,
}

#[async_trait]
impl Acknowledger for QueueAcker {
    async fn ack(&self, delivery_tag: u64) -> TransportResult<()> {
        let broker = self.broker.upgrade().ok_or(TransportError::ConnectionClosed)?;
        let mut state = broker.state.lock();
        state.check_open(self.connection)?;

        let consumer = state
            .queues
            .get_mut(&self.queue)
            .and_then(|q| q.consumer.as_mut())
            .filter(|c| c.tag == self.consumer_tag)
            .ok_or(TransportError::UnknownDeliveryTag(delivery_tag))?;

        consumer
            .unacked
            .remove(&delivery_tag)
            .map(|_| ())
            .ok_or(TransportError::UnknownDeliveryTag(delivery_tag))
    }
}

/// A client connection to an `InMemoryBroker`.
///
/// Dropping the connection closes it.
pub struct BrokerConnection {
    id: ConnectionId,
    inner: Arc<BrokerInner>,
}

impl BrokerConnection {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open_connections.contains(&self.id)
    }
}

impl fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnection").field("id", &self.id).finish()
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        self.inner.state.lock().close_connection(self.id);
    }
}

#[async_trait]
impl Transport for BrokerConnection {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> TransportResult<()> {
        if name == DEFAULT_EXCHANGE {
            return Err(TransportError::PreconditionFailed(
                "the default exchange cannot be declared".into(),
            ));
        }

        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        if let Some(existing) = state.exchanges.get(name) {
            if existing.kind != kind || existing.durable != durable {
                return Err(TransportError::PreconditionFailed(format!(
                    "exchange '{name}' already declared as {} (durable={})",
                    existing.kind, existing.durable
                )));
            }
            return Ok(());
        }

        state.exchanges.insert(
            name.to_string(),
            ExchangeState {
                kind,
                durable,
                bindings: Vec::new(),
            },
        );
        debug!(exchange = %name, kind = %kind, durable, "[broker] Exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> TransportResult<String> {
        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        let name = if name.is_empty() {
            format!("{SERVER_NAMED_QUEUE_PREFIX}{}", Uuid::new_v4().simple())
        } else {
            name.to_string()
        };

        if let Some(existing) = state.queues.get(&name) {
            existing.check_access(&name, self.id)?;
            if existing.options != options {
                return Err(TransportError::PreconditionFailed(format!(
                    "queue '{name}' already declared with different options"
                )));
            }
            return Ok(name);
        }

        state.queues.insert(
            name.clone(),
            QueueState {
                options,
                owner: options.exclusive.then_some(self.id),
                ready: VecDeque::new(),
                consumer: None,
            },
        );
        debug!(queue = %name, ?options, "[broker] Queue declared");
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
                "queues cannot be bound to the default exchange".into(),
            ));
        }

        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        state
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?
            .check_access(queue, self.id)?;

        let target = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;

        let already_bound = target
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.routing_key == routing_key);
        if !already_bound {
            target.bindings.push(Binding {
                queue: queue.to_string(),
                routing_key: routing_key.to_string(),
            });
        }
        debug!(
            queue = %queue,
            exchange = %exchange,
            routing_key = %routing_key,
            "[broker] Queue bound"
        );
        Ok(())
    }

    /// Routing and enqueueing happen under the broker lock, so the broker has
    /// accepted the message by the time this returns and `_timeout` never
    /// elapses.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
        _timeout: Duration,
    ) -> TransportResult<usize> {
        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        let targets: Vec<String> = if exchange == DEFAULT_EXCHANGE {
            if state.queues.contains_key(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            }
        } else {
            let target = state
                .exchanges
                .get(exchange)
                .ok_or_else(|| TransportError::ExchangeNotFound(exchange.to_string()))?;
            let mut seen = HashSet::new();
            target
                .bindings
                .iter()
                .filter(|b| match target.kind {
                    ExchangeKind::Fanout => true,
                    ExchangeKind::Direct => b.routing_key == routing_key,
                })
                .filter(|b| seen.insert(b.queue.clone()))
                .map(|b| b.queue.clone())
                .collect()
        };

        let stored = StoredMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: message.payload,
            properties: message.properties,
            redelivered: false,
        };

        let BrokerState {
            queues,
            next_delivery_tag,
            ..
        } = &mut *state;
        for name in &targets {
            if let Some(queue) = queues.get_mut(name) {
                queue.push(stored.clone(), next_delivery_tag);
            }
        }

        if targets.is_empty() {
            debug!(
                exchange = %exchange,
                routing_key = %routing_key,
                "[broker] Message unroutable, dropped"
            );
        }
        Ok(targets.len())
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> TransportResult<DeliveryStream> {
        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        state.next_consumer_tag += 1;
        let consumer_tag = state.next_consumer_tag;

        let BrokerState {
            queues,
            next_delivery_tag,
            ..
        } = &mut *state;
        let target = queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::QueueNotFound(queue.to_string()))?;
        target.check_access(queue, self.id)?;
        if target.consumer.is_some() {
            return Err(TransportError::QueueBusy(queue.to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let acker: Arc<dyn Acknowledger> = Arc::new(QueueAcker {
            broker: Arc::downgrade(&self.inner),
            queue: queue.to_string(),
            consumer_tag,
            connection: self.id,
        });
        target.consumer = Some(ConsumerState {
            tag: consumer_tag,
            connection: self.id,
            ack_mode,
            sender,
            acker,
            unacked: BTreeMap::new(),
        });
        target.drain_ready(next_delivery_tag);

        let broker = Arc::downgrade(&self.inner);
        let queue_name = queue.to_string();
        let on_cancel = Box::new(move || {
            if let Some(broker) = broker.upgrade() {
                broker.state.lock().cancel_consumer(&queue_name, consumer_tag);
            }
        });

        debug!(queue = %queue, consumer_tag, ?ack_mode, "[broker] Consumer registered");
        Ok(Box::pin(ConsumerStream::new(
            queue.to_string(),
            receiver,
            on_cancel,
        )))
    }

    async fn delete_queue(&self, name: &str) -> TransportResult<()> {
        let mut state = self.inner.state.lock();
        state.check_open(self.id)?;

        let Some(queue) = state.queues.get(name) else {
            return Ok(());
        };
        queue.check_access(name, self.id)?;

        state.remove_queue(name);
        debug!(queue = %name, "[broker] Queue deleted");
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.state.lock().close_connection(self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    const T: Duration = Duration::from_secs(1);

    fn msg(body: &str) -> OutboundMessage {
        OutboundMessage::new(body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_bound_queue() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_exchange("x", ExchangeKind::Fanout, true).await.unwrap();

        let q1 = conn.declare_queue("", QueueOptions::anonymous_subscriber()).await.unwrap();
        let q2 = conn.declare_queue("", QueueOptions::anonymous_subscriber()).await.unwrap();
        assert_ne!(q1, q2);
        assert!(q1.starts_with(SERVER_NAMED_QUEUE_PREFIX));
        conn.bind_queue(&q1, "", "x").await.unwrap();
        conn.bind_queue(&q2, "", "x").await.unwrap();

        let routed = conn.publish("x", "ignored", msg("hi"), T).await.unwrap();
        assert_eq!(routed, 2);
        assert_eq!(broker.message_count(&q1), Some(1));
        assert_eq!(broker.message_count(&q2), Some(1));
    }

    #[tokio::test]
    async fn test_direct_exchange_matches_routing_key() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_exchange("d", ExchangeKind::Direct, false).await.unwrap();
        let q = conn.declare_queue("only-a", QueueOptions::default()).await.unwrap();
        conn.bind_queue(&q, "a", "d").await.unwrap();

        assert_eq!(conn.publish("d", "b", msg("x"), T).await.unwrap(), 0);
        assert_eq!(conn.publish("d", "a", msg("x"), T).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_exchange_routes_by_queue_name() {
        let broker = InMemoryBroker::new();
        let owner = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        let other = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        owner.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap();

        // Publishing into another connection's exclusive queue is allowed.
        assert_eq!(other.publish("", "txn_1", msg("r"), T).await.unwrap(), 1);
        // Unknown queue: silently dropped.
        assert_eq!(other.publish("", "txn_missing", msg("r"), T).await.unwrap(), 0);

        let mut stream = owner.consume("txn_1", AckMode::Auto).await.unwrap();
        let delivery = stream.next().await.unwrap();
        assert_eq!(delivery.routing_key, "txn_1");
        assert_eq!(delivery.payload, b"r");
    }

    #[tokio::test]
    async fn test_publish_to_unknown_exchange_fails() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        let err = conn.publish("nope", "", msg("x"), T).await.unwrap_err();
        assert_eq!(err, TransportError::ExchangeNotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_exclusive_queue_is_locked_to_owner() {
        let broker = InMemoryBroker::new();
        let owner = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        let other = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        owner.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap();

        let locked = TransportError::ResourceLocked { queue: "txn_1".into() };
        assert_eq!(
            other.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap_err(),
            locked
        );
        assert_eq!(other.consume("txn_1", AckMode::Auto).await.err().unwrap(), locked);
        assert_eq!(other.delete_queue("txn_1").await.unwrap_err(), locked);

        // Owner may redeclare idempotently.
        owner.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap();
    }

    #[tokio::test]
    async fn test_redeclare_with_different_options_fails() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_exchange("x", ExchangeKind::Fanout, true).await.unwrap();
        assert!(matches!(
            conn.declare_exchange("x", ExchangeKind::Direct, true).await,
            Err(TransportError::PreconditionFailed(_))
        ));

        conn.declare_queue("q", QueueOptions::default()).await.unwrap();
        assert!(matches!(
            conn.declare_queue("q", QueueOptions::anonymous_subscriber()).await,
            Err(TransportError::PreconditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_closing_connection_removes_exclusive_queues() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap();
        conn.declare_queue("shared", QueueOptions::default()).await.unwrap();

        conn.close().await.unwrap();
        assert!(!broker.queue_exists("txn_1"));
        assert!(broker.queue_exists("shared"));
        assert_eq!(
            conn.declare_queue("q", QueueOptions::default()).await.unwrap_err(),
            TransportError::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_dropping_connection_closes_it() {
        let broker = InMemoryBroker::new();
        {
            let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
            conn.declare_queue("txn_1", QueueOptions::reply_queue()).await.unwrap();
            assert_eq!(broker.connection_count(), 1);
        }
        assert_eq!(broker.connection_count(), 0);
        assert!(!broker.queue_exists("txn_1"));
    }

    #[tokio::test]
    async fn test_auto_delete_on_consumer_cancel() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        let q = conn.declare_queue("", QueueOptions::anonymous_subscriber()).await.unwrap();

        let stream = conn.consume(&q, AckMode::Manual).await.unwrap();
        assert!(broker.has_consumer(&q));
        drop(stream);
        assert!(!broker.queue_exists(&q));
    }

    #[tokio::test]
    async fn test_unacked_deliveries_are_redelivered() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("work", QueueOptions::default()).await.unwrap();
        conn.publish("", "work", msg("one"), T).await.unwrap();
        conn.publish("", "work", msg("two"), T).await.unwrap();

        {
            let mut stream = conn.consume("work", AckMode::Manual).await.unwrap();
            let first = stream.next().await.unwrap();
            assert!(!first.redelivered);
            first.ack().await.unwrap();
            let second = stream.next().await.unwrap();
            assert_eq!(second.payload, b"two");
            // Dropped without ack.
        }

        assert_eq!(broker.message_count("work"), Some(1));
        let mut stream = conn.consume("work", AckMode::Manual).await.unwrap();
        let again = stream.next().await.unwrap();
        assert_eq!(again.payload, b"two");
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_double_ack_is_unknown_tag() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("work", QueueOptions::default()).await.unwrap();
        let mut stream = conn.consume("work", AckMode::Manual).await.unwrap();
        conn.publish("", "work", msg("one"), T).await.unwrap();

        let delivery = stream.next().await.unwrap();
        let tag = delivery.delivery_tag().unwrap();
        let acker = delivery.acker.clone().unwrap().0;
        delivery.ack().await.unwrap();
        assert_eq!(acker.ack(tag).await.unwrap_err(), TransportError::UnknownDeliveryTag(tag));
        assert_eq!(broker.unacked_count("work"), Some(0));
    }

    #[tokio::test]
    async fn test_second_consumer_is_rejected() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("q", QueueOptions::default()).await.unwrap();
        let _stream = conn.consume("q", AckMode::Auto).await.unwrap();
        assert_eq!(
            conn.consume("q", AckMode::Auto).await.err().unwrap(),
            TransportError::QueueBusy("q".into())
        );
    }

    #[tokio::test]
    async fn test_delete_queue_ends_stream() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("q", QueueOptions::reply_queue()).await.unwrap();
        let mut stream = conn.consume("q", AckMode::Auto).await.unwrap();

        conn.delete_queue("q").await.unwrap();
        assert!(stream.next().await.is_none());
        // Deleting again is fine.
        conn.delete_queue("q").await.unwrap();
    }

    #[tokio::test]
    async fn test_credentials_are_checked() {
        let broker = InMemoryBroker::with_credential("secret-token");
        assert!(matches!(
            broker.connect(&BrokerCredentials::bearer("wrong")),
            Err(TransportError::AuthenticationFailed { .. })
        ));
        let conn = broker.connect(&BrokerCredentials::bearer("secret-token")).unwrap();
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect(&BrokerCredentials::anonymous()).unwrap();
        conn.declare_queue("q", QueueOptions::default()).await.unwrap();
        let mut stream = conn.consume("q", AckMode::Manual).await.unwrap();

        broker.shutdown();
        assert!(stream.next().await.is_none());
        assert!(!conn.is_open());
        assert_eq!(broker.queue_count(), 0);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", BrokerCredentials::bearer("secret-token"));
        assert!(!rendered.contains("secret-token"));
    }
}
