use super::config::NodeConfig;
use super::transport::{Connector, NodeTransport};
use anyhow::{Context, Result};
use qg_01_coordinator::{CoordinatorApi, CoordinatorService};
use qg_02_worker::{SimulatedValidator, WorkerApi, WorkerConfig, WorkerResult, WorkerService};
use serde::Serialize;
use shared_bus::{InMemoryBroker, Transport};
use shared_types::{ComplianceResponse, TransactionRequest};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// One line of output per submitted request:
/// `{"transaction_id": ..., "is_compliant": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutput {
    pub transaction_id: String,
    #[serde(flatten)]
    pub response: ComplianceResponse,
}

/// The components this node runs, over the configured broker.
pub struct NodeContainer {
    connector: Connector,
    coordinator: Option<Arc<CoordinatorService<NodeTransport>>>,
    workers: Vec<(String, JoinHandle<WorkerResult<()>>)>,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeContainer {
    /// Connect to the broker, then start the workers, then the coordinator,
    /// as far as the configured role asks for them.
    ///
    /// Workers are subscribed before this returns, so the first submission
    /// already reaches all of them.
    pub async fn start(config: &NodeConfig) -> Result<Self> {
        let connector = Connector::from_config(&config.broker);
        let (shutdown_tx, _) = watch::channel(false);

        let mut workers = Vec::new();
        if config.role.runs_workers() {
            let validator = SimulatedValidator::new(config.validator)
                .context("Invalid simulated validator configuration")?;

            for index in 0..config.workers.count {
                let connection = connector
                    .connect()
                    .await
                    .with_context(|| format!("Worker {index} failed to connect"))?;
                let worker_config = WorkerConfig {
                    exchange: config.coordinator.exchange.clone(),
                    exchange_durable: config.coordinator.exchange_durable,
                    publish_timeout: config.workers.publish_timeout,
                    verdict_cache_ttl: config.workers.verdict_cache_ttl,
                    ..Default::default()
                };
                let worker =
                    WorkerService::setup(Arc::new(connection), validator.clone(), worker_config)
                        .await
                        .with_context(|| format!("Worker {index} failed to subscribe"))?;

                let responder_id = worker.responder_id().to_string();
                let shutdown_rx = shutdown_tx.subscribe();
                let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });
                workers.push((responder_id, handle));
            }
        }

        let coordinator = if config.role.runs_coordinator() {
            let connection = connector
                .connect()
                .await
                .context("Coordinator failed to connect")?;
            let coordinator =
                CoordinatorService::new(Arc::new(connection), config.coordinator.clone())
                    .await
                    .context("Coordinator failed to start")?;
            Some(Arc::new(coordinator))
        } else {
            None
        };

        info!(
            role = %config.role,
            workers = workers.len(),
            coordinator = coordinator.is_some(),
            "[node] All components running"
        );

        Ok(Self {
            connector,
            coordinator,
            workers,
            shutdown_tx,
        })
    }

    /// The coordinator, unless this node runs workers only.
    #[must_use]
    pub fn coordinator(&self) -> Option<Arc<CoordinatorService<NodeTransport>>> {
        self.coordinator.clone()
    }

    /// The in-process broker, when the node is not using a network broker.
    #[must_use]
    pub fn broker(&self) -> Option<&InMemoryBroker> {
        self.connector.in_memory()
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to stop, wait for them, then close the
    /// coordinator's connection.
    pub async fn shutdown(self) {
        info!("[node] Initiating graceful shutdown...");

        if !self.workers.is_empty() && self.shutdown_tx.send(true).is_err() {
            // Every worker already exited.
            warn!("[node] No worker was listening for shutdown");
        }

        for (responder_id, handle) in self.workers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        responder_id = %responder_id,
                        error = %e,
                        "[node] Worker stopped with error"
                    );
                }
                Err(e) => {
                    error!(responder_id = %responder_id, error = %e, "[node] Worker task failed");
                }
            }
        }

        if let Some(coordinator) = &self.coordinator {
            if let Err(e) = coordinator.transport().close().await {
                warn!(error = %e, "[node] Coordinator connection did not close cleanly");
            }
        }

        info!("[node] Shutdown complete");
    }
}

/// Decode one NDJSON line, submit it and describe the outcome.
///
/// Returns `None` for blank or undecodable lines and for failed submissions;
/// both are logged.
pub async fn handle_line<C: CoordinatorApi + ?Sized>(
    coordinator: &C,
    line: &str,
) -> Option<SubmissionOutput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let request: TransactionRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "[node] Skipped undecodable request line");
            return None;
        }
    };

    match coordinator.submit_detailed(request, None).await {
        Ok(report) => Some(SubmissionOutput {
            response: report.to_response(),
            transaction_id: report.transaction_id,
        }),
        Err(e) => {
            match e.transport_error() {
                Some(cause) => error!(
                    status = e.http_status(),
                    error = %e,
                    connection_level = cause.is_connection_level(),
                    "[node] Submission failed"
                ),
                None => error!(status = e.http_status(), error = %e, "[node] Submission failed"),
            }
            None
        }
    }
}
