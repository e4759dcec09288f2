//! Shared test fixtures.

use async_trait::async_trait;
use qg_01_coordinator::{CoordinatorConfig, CoordinatorService};
use qg_02_worker::{FixedValidator, WorkerApi, WorkerConfig, WorkerResult, WorkerService};
use shared_bus::{
    AckMode, BrokerConnection, BrokerCredentials, DeliveryStream, ExchangeKind, InMemoryBroker,
    OutboundMessage, QueueOptions, Transport, TransportError, TransportResult,
};
use shared_types::TransactionRequest;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A worker that answers `verdict` after `delay`.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPlan {
    pub verdict: bool,
    pub delay: Duration,
}

pub fn approve_after(ms: u64) -> WorkerPlan {
    WorkerPlan {
        verdict: true,
        delay: Duration::from_millis(ms),
    }
}

pub fn reject_after(ms: u64) -> WorkerPlan {
    WorkerPlan {
        verdict: false,
        delay: Duration::from_millis(ms),
    }
}

pub fn sample_request() -> TransactionRequest {
    TransactionRequest::new("0xdeadbeef", "alice", "bob", 1_000)
}

pub fn connect(broker: &InMemoryBroker) -> BrokerConnection {
    broker
        .connect(&BrokerCredentials::anonymous())
        .expect("anonymous broker accepts connections")
}

/// Coordinator plus workers over one in-process broker.
pub struct Cluster<T: Transport + 'static = BrokerConnection> {
    pub broker: InMemoryBroker,
    pub coordinator: Arc<CoordinatorService<T>>,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<WorkerResult<()>>>,
}

impl Cluster<BrokerConnection> {
    pub async fn start(plans: &[WorkerPlan], config: CoordinatorConfig) -> Self {
        let broker = InMemoryBroker::new();
        let transport = connect(&broker);
        Self::start_with(broker, transport, plans, config).await
    }
}

impl<T: Transport + 'static> Cluster<T> {
    /// Start workers on `broker`, then a coordinator on `transport`.
    pub async fn start_with(
        broker: InMemoryBroker,
        transport: T,
        plans: &[WorkerPlan],
        config: CoordinatorConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut workers = Vec::new();
        for (index, plan) in plans.iter().enumerate() {
            let validator = FixedValidator {
                verdict: plan.verdict,
                delay: plan.delay,
            };
            let worker_config = WorkerConfig {
                exchange: config.exchange.clone(),
                responder_id: format!("worker-{index}"),
                ..Default::default()
            };
            let worker = WorkerService::setup(Arc::new(connect(&broker)), validator, worker_config)
                .await
                .expect("worker setup");
            let rx = shutdown.subscribe();
            workers.push(tokio::spawn(async move { worker.run(rx).await }));
        }

        let coordinator = CoordinatorService::new(Arc::new(transport), config)
            .await
            .expect("coordinator setup");

        Self {
            broker,
            coordinator: Arc::new(coordinator),
            shutdown,
            workers,
        }
    }

    /// Stop all workers and return how each run ended.
    pub async fn stop(self) -> Vec<WorkerResult<()>> {
        let _ = self.shutdown.send(true);
        let mut results = Vec::new();
        for handle in self.workers {
            results.push(handle.await.expect("worker task panicked"));
        }
        results
    }
}

/// Transport wrapper that refuses every publish.
pub struct RejectingPublish {
    pub inner: BrokerConnection,
    pub attempts: AtomicUsize,
}

impl RejectingPublish {
    pub fn new(inner: BrokerConnection) -> Self {
        Self {
            inner,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for RejectingPublish {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> TransportResult<()> {
        self.inner.declare_exchange(name, kind, durable).await
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> TransportResult<String> {
        self.inner.declare_queue(name, options).await
    }

    async fn bind_queue(
        &self,
        queue: &str,
        routing_key: &str,
        exchange: &str,
    ) -> TransportResult<()> {
        self.inner.bind_queue(queue, routing_key, exchange).await
    }

    async fn publish(
        &self,
        exchange: &str,
        _routing_key: &str,
        _message: OutboundMessage,
        timeout: Duration,
    ) -> TransportResult<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::PublishTimeout {
            exchange: exchange.to_string(),
            timeout,
        })
    }

    async fn consume(&self, queue: &str, ack_mode: AckMode) -> TransportResult<DeliveryStream> {
        self.inner.consume(queue, ack_mode).await
    }

    async fn delete_queue(&self, name: &str) -> TransportResult<()> {
        self.inner.delete_queue(name).await
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.close().await
    }
}
