//! Worker Service
//!
//! One subscription, one message at a time: decode, validate, reply, ack.


use crate::domain::{VerdictCache, WorkerConfig, WorkerError, WorkerResult};
use crate::ports::{TransactionValidator, WorkerApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{
    AckMode, Delivery, ExchangeKind, OutboundMessage, QueueOptions, Transport, DEFAULT_EXCHANGE,
};
use shared_types::{
    decode_request, encode_response, TransactionRequest, TransactionResponse, JSON_CONTENT_TYPE,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// What happened to one inbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Verdict published to `reply_to`.
    Replied { reply_to: String, is_valid: bool },
    /// Verdict computed but the reply could not be published.
    ReplyFailed { reply_to: String, is_valid: bool },
    /// Payload did not decode; acknowledged and skipped.
    Malformed,
}

/// Validator worker bound to the broadcast exchange.
pub struct WorkerService<T: Transport + 'static, V: TransactionValidator> {
    transport: Arc<T>,
    validator: V,
    config: WorkerConfig,
    queue: String,
    verdicts: Mutex<VerdictCache>,
}

impl<T: Transport + 'static, V: TransactionValidator> WorkerService<T, V> {
    /// Declare the exchange and this worker's private queue, then bind it.
    ///
    /// Broadcasts published after `setup` returns are buffered on the queue
    /// until `run` starts consuming.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` or `Setup`.
    pub async fn setup(
        transport: Arc<T>,
        validator: V,
        config: WorkerConfig,
    ) -> WorkerResult<Self> {
        config.validate()?;

        transport
            .declare_exchange(&config.exchange, ExchangeKind::Fanout, config.exchange_durable)
            .await
            .map_err(WorkerError::Setup)?;
        let queue = transport
            .declare_queue("", QueueOptions::anonymous_subscriber())
            .await
            .map_err(WorkerError::Setup)?;
        transport
            .bind_queue(&queue, "", &config.exchange)
            .await
            .map_err(WorkerError::Setup)?;

        info!(
            responder_id = %config.responder_id,
            queue = %queue,
            exchange = %config.exchange,
            "[worker] Subscribed"
        );

        let verdicts = Mutex::new(VerdictCache::new(config.verdict_cache_ttl));
        Ok(Self {
            transport,
            validator,
            config,
            queue,
            verdicts,
        })
    }

    /// Server-named queue this worker consumes from.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Handle one delivery and acknowledge it.
    ///
    /// # Errors
    ///
    /// Only `Ack`. Everything else about the message is logged.
    pub async fn process_delivery(&self, delivery: Delivery) -> WorkerResult<MessageOutcome> {
        let outcome = match decode_request(&delivery.payload) {
            Ok(request) => {
                let reply_to = delivery
                    .properties
                    .reply_to
                    .clone()
                    .filter(|q| !q.is_empty())
                    .unwrap_or_else(|| request.transaction_id.clone());
                self.answer(&request, reply_to, delivery.redelivered).await
            }
            Err(e) => {
                warn!(
                    responder_id = %self.config.responder_id,
                    error = %e,
                    "[worker] Dropped malformed request"
                );
                MessageOutcome::Malformed
            }
        };

        delivery.ack().await.map_err(WorkerError::Ack)?;
        Ok(outcome)
    }

    async fn answer(
        &self,
        request: &TransactionRequest,
        reply_to: String,
        redelivered: bool,
    ) -> MessageOutcome {
        let is_valid = self.verdict_for(request, redelivered).await;
        let response = TransactionResponse::new(request.transaction_id.clone(), is_valid)
            .from_responder(self.config.responder_id.clone());

        match self.publish_reply(&response, &reply_to).await {
            Ok(()) => {
                debug!(
                    transaction_id = %request.transaction_id,
                    reply_to = %reply_to,
                    is_valid,
                    "[worker] Replied"
                );
                MessageOutcome::Replied { reply_to, is_valid }
            }
            Err(e) => {
                warn!(
                    transaction_id = %request.transaction_id,
                    reply_to = %reply_to,
                    error = %e,
                    "[worker] Failed to publish reply"
                );
                MessageOutcome::ReplyFailed { reply_to, is_valid }
            }
        }
    }

    async fn verdict_for(&self, request: &TransactionRequest, redelivered: bool) -> bool {
        let cached = self.verdicts.lock().get(&request.transaction_id);
        if let Some(cached) = cached {
            debug!(
                transaction_id = %request.transaction_id,
                redelivered,
                "[worker] Reusing cached verdict"
            );
            return cached;
        }

        let is_valid = self.validator.validate(request).await;
        self.verdicts.lock().insert(&request.transaction_id, is_valid)
    }

    async fn publish_reply(
        &self,
        response: &TransactionResponse,
        reply_to: &str,
    ) -> WorkerResult<()> {
        let message = OutboundMessage::new(encode_response(response)?)
            .content_type(JSON_CONTENT_TYPE)
            .correlation_id(response.transaction_id.clone());
        let routed = self
            .transport
            .publish(DEFAULT_EXCHANGE, reply_to, message, self.config.publish_timeout)
            .await
            .map_err(WorkerError::Reply)?;
        if routed == 0 {
            // The coordinator gave up on this transaction already.
            debug!(reply_to = %reply_to, "[worker] Reply queue gone, reply dropped");
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + 'static, V: TransactionValidator> WorkerApi for WorkerService<T, V> {
    fn responder_id(&self) -> &str {
        &self.config.responder_id
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        let mut deliveries = self
            .transport
            .consume(&self.queue, AckMode::Manual)
            .await
            .map_err(WorkerError::Setup)?;

        info!(responder_id = %self.config.responder_id, "[worker] Running");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can ever signal us again.
                        break;
                    }
                }
                delivery = deliveries.next() => {
                    let Some(delivery) = delivery else {
                        warn!(queue = %self.queue, "[worker] Subscription ended");
                        return Err(WorkerError::StreamEnded { queue: self.queue.clone() });
                    };
                    self.process_delivery(delivery).await?;
                }
            }
        }

        info!(responder_id = %self.config.responder_id, "[worker] Shutting down");
        Ok(())
    }
}
