//! Worker configuration.

use super::error::WorkerError;
use std::time::Duration;
use uuid::Uuid;

/// Exchange the coordinator broadcasts on.
pub const DEFAULT_EXCHANGE_NAME: &str = "transaction_requests";

/// How long a verdict is remembered for redelivered requests.
pub const DEFAULT_VERDICT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fanout exchange to subscribe to.
    pub exchange: String,
    /// Declare the exchange as durable. Must match the coordinator's
    /// declaration.
    pub exchange_durable: bool,
    /// Identity stamped on every response.
    pub responder_id: String,
    /// How long to wait for the broker to accept a response.
    pub publish_timeout: Duration,
    pub verdict_cache_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE_NAME.to_string(),
            exchange_durable: true,
            responder_id: Uuid::new_v4().to_string(),
            publish_timeout: Duration::from_secs(1),
            verdict_cache_ttl: DEFAULT_VERDICT_CACHE_TTL,
        }
    }
}

impl WorkerConfig {
    /// # Errors
    ///
    /// `WorkerError::InvalidConfig` for an empty exchange name or responder id.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.exchange.is_empty() {
            return Err(WorkerError::InvalidConfig(
                "exchange name must not be empty".into(),
            ));
        }
        if self.responder_id.is_empty() {
            return Err(WorkerError::InvalidConfig(
                "responder id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Tuning for the simulated validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedValidatorConfig {
    /// Upper bound of the random validation delay.
    pub max_delay: Duration,
    /// Probability of approving a transaction, in `[0, 1]`.
    pub approval_rate: f64,
}

impl Default for SimulatedValidatorConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(1000),
            approval_rate: 0.9,
        }
    }
}

impl SimulatedValidatorConfig {
    /// # Errors
    ///
    /// `WorkerError::InvalidConfig` when the approval rate is outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if !(0.0..=1.0).contains(&self.approval_rate) {
            return Err(WorkerError::InvalidConfig(format!(
                "approval rate {} is outside [0, 1]",
                self.approval_rate
            )));
        }
        Ok(())
    }
}
