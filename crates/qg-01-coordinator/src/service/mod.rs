//! Coordinator Service
//!
//! One submission = one reply queue, one broadcast, one collection loop.
//! Nothing is shared between submissions except the transport handle.

mod reply_queue;


use crate::domain::{
    ComplianceReport, CoordinatorConfig, CoordinatorError, CoordinatorResult, IdPolicy,
    QuorumTally, TallyUpdate,
};
use crate::ports::CoordinatorApi;
use async_trait::async_trait;
use parking_lot::Mutex;
use reply_queue::{InFlightGuard, ReplyQueueLease};
use shared_bus::{
    AckMode, Delivery, DeliveryStream, ExchangeKind, OutboundMessage, QueueOptions, Transport,
    TransportError,
};
use shared_types::{
    decode_response, encode_request, new_transaction_id, TransactionRequest, JSON_CONTENT_TYPE,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Counters gathered by one collection loop.
#[derive(Debug, Default)]
struct CollectionStats {
    malformed: usize,
    foreign: usize,
}

/// Quorum-gated broadcast coordinator.
pub struct CoordinatorService<T: Transport + 'static> {
    transport: Arc<T>,
    config: CoordinatorConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<T: Transport + 'static> CoordinatorService<T> {
    /// Validate `config` and declare the broadcast exchange.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or `ExchangeSetup`.
    pub async fn new(transport: Arc<T>, config: CoordinatorConfig) -> CoordinatorResult<Self> {
        config.validate()?;

        transport
            .declare_exchange(&config.exchange, ExchangeKind::Fanout, config.exchange_durable)
            .await
            .map_err(CoordinatorError::ExchangeSetup)?;

        info!(
            exchange = %config.exchange,
            quorum_threshold = config.quorum_threshold,
            deadline_ms = config.deadline.as_millis() as u64,
            "[coordinator] Ready"
        );

        Ok(Self {
            transport,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The broker connection submissions go through.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Number of submissions currently collecting responses.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn assign_id(&self, request: &mut TransactionRequest) {
        let keep = self.config.id_policy == IdPolicy::AcceptCallerSupplied && request.has_id();
        if !keep {
            request.transaction_id = new_transaction_id();
        }
    }

    async fn run_submission(
        &self,
        mut request: TransactionRequest,
        caller_deadline: Option<Instant>,
    ) -> CoordinatorResult<ComplianceReport> {
        let started = Instant::now();
        let configured = started + self.config.deadline;
        let deadline = caller_deadline.map_or(configured, |d| d.min(configured));

        self.assign_id(&mut request);
        let transaction_id = request.transaction_id.clone();
        let in_flight = InFlightGuard::register(&self.in_flight, &transaction_id)?;

        let queue = self
            .transport
            .declare_queue(&transaction_id, QueueOptions::reply_queue())
            .await
            .map_err(|source| CoordinatorError::QueueSetup {
                queue: transaction_id.clone(),
                source,
            })?;
        let lease = ReplyQueueLease::new(self.transport.clone(), queue, in_flight);

        let outcome = self
            .broadcast_and_collect(&request, lease.name(), deadline)
            .await;
        lease.release().await;

        let (tally, stats, timed_out) = outcome?;
        let report = ComplianceReport {
            transaction_id,
            verdict: tally.verdict(),
            valid_responses: tally.valid_count(),
            invalid_responses: tally.invalid_count(),
            duplicate_responses: tally.duplicate_count(),
            malformed_responses: stats.malformed,
            foreign_responses: stats.foreign,
            elapsed: started.elapsed(),
            timed_out,
        };

        info!(
            transaction_id = %report.transaction_id,
            is_compliant = report.is_compliant(),
            valid = report.valid_responses,
            invalid = report.invalid_responses,
            timed_out = report.timed_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "[coordinator] Verdict"
        );
        Ok(report)
    }

    /// Publish the request and collect replies on `queue` until quorum or
    /// `deadline`. The caller owns the queue and deletes it afterwards.
    async fn broadcast_and_collect(
        &self,
        request: &TransactionRequest,
        queue: &str,
        deadline: Instant,
    ) -> CoordinatorResult<(QuorumTally, CollectionStats, bool)> {
        let transaction_id = request.transaction_id.as_str();

        // Consume before broadcasting so a consume failure aborts before any
        // worker sees the request.
        let replies = self
            .transport
            .consume(queue, AckMode::Auto)
            .await
            .map_err(|source| CoordinatorError::QueueSetup {
                queue: queue.to_string(),
                source,
            })?;

        let message = OutboundMessage::new(encode_request(request)?)
            .content_type(JSON_CONTENT_TYPE)
            .reply_to(queue)
            .correlation_id(transaction_id);

        let routed = self
            .transport
            .publish(&self.config.exchange, "", message, self.config.publish_timeout)
            .await
            .map_err(|source| {
                warn!(
                    transaction_id = %transaction_id,
                    error = %source,
                    "[coordinator] Broadcast failed"
                );
                CoordinatorError::Publish {
                    transaction_id: transaction_id.to_string(),
                    source,
                }
            })?;

        info!(
            transaction_id = %transaction_id,
            validators = routed,
            "[coordinator] Broadcast transaction, collecting responses"
        );

        self.collect(transaction_id, queue, replies, deadline).await
    }

    async fn collect(
        &self,
        transaction_id: &str,
        queue: &str,
        mut replies: DeliveryStream,
        deadline: Instant,
    ) -> CoordinatorResult<(QuorumTally, CollectionStats, bool)> {
        let mut tally = QuorumTally::new(self.config.quorum_threshold);
        let mut stats = CollectionStats::default();

        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                delivery = replies.next() => {
                    let Some(delivery) = delivery else {
                        return Err(CoordinatorError::Transport {
                            transaction_id: transaction_id.to_string(),
                            source: TransportError::ConsumerCancelled(queue.to_string()),
                        });
                    };
                    if self.record_reply(transaction_id, queue, &delivery, &mut tally, &mut stats) {
                        return Ok((tally, stats, false));
                    }
                }
                () = &mut expiry => {
                    debug!(
                        transaction_id = %transaction_id,
                        valid = tally.valid_count(),
                        threshold = tally.threshold(),
                        "[coordinator] Deadline reached before quorum"
                    );
                    return Ok((tally, stats, true));
                }
            }
        }
    }

    /// Fold one delivery into the tally. Returns true once the quorum is
    /// reached.
    fn record_reply(
        &self,
        transaction_id: &str,
        queue: &str,
        delivery: &Delivery,
        tally: &mut QuorumTally,
        stats: &mut CollectionStats,
    ) -> bool {
        if delivery.routing_key != queue {
            stats.foreign += 1;
            debug!(
                transaction_id = %transaction_id,
                routing_key = %delivery.routing_key,
                "[coordinator] Discarded misrouted reply"
            );
            return false;
        }

        let response = match decode_response(&delivery.payload) {
            Ok(response) => response,
            Err(e) => {
                stats.malformed += 1;
                warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "[coordinator] Dropped malformed reply"
                );
                return false;
            }
        };

        if response.transaction_id != transaction_id {
            stats.foreign += 1;
            debug!(
                transaction_id = %transaction_id,
                other = %response.transaction_id,
                "[coordinator] Discarded reply for another transaction"
            );
            return false;
        }

        let update = tally.record(&response);
        debug!(
            transaction_id = %transaction_id,
            is_valid = response.is_valid,
            responder = response.responder_id.as_deref().unwrap_or("-"),
            ?update,
            "[coordinator] Received response"
        );
        if let TallyUpdate::QuorumReached { valid } = update {
            debug!(transaction_id = %transaction_id, valid, "[coordinator] Quorum reached");
        }
        tally.is_reached()
    }
}

#[async_trait]
impl<T: Transport + 'static> CoordinatorApi for CoordinatorService<T> {
    async fn submit(&self, request: TransactionRequest) -> CoordinatorResult<bool> {
        self.run_submission(request, None)
            .await
            .map(|report| report.is_compliant())
    }

    async fn submit_with_deadline(
        &self,
        request: TransactionRequest,
        deadline: Instant,
    ) -> CoordinatorResult<bool> {
        self.run_submission(request, Some(deadline))
            .await
            .map(|report| report.is_compliant())
    }

    async fn submit_detailed(
        &self,
        request: TransactionRequest,
        deadline: Option<Instant>,
    ) -> CoordinatorResult<ComplianceReport> {
        self.run_submission(request, deadline).await
    }
}
