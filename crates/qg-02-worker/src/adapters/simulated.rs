//! Validator adapters.

use crate::domain::{SimulatedValidatorConfig, WorkerResult};
use crate::ports::TransactionValidator;
use async_trait::async_trait;
use rand::Rng;
use shared_types::TransactionRequest;
use std::time::Duration;
use tracing::debug;

/// Stand-in for real validation: a random verdict after a random delay.
#[derive(Debug, Clone)]
pub struct SimulatedValidator {
    config: SimulatedValidatorConfig,
}

impl SimulatedValidator {
    /// # Errors
    ///
    /// `InvalidConfig` when the approval rate is outside `[0, 1]`.
    pub fn new(config: SimulatedValidatorConfig) -> WorkerResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &SimulatedValidatorConfig {
        &self.config
    }

    // ThreadRng is not Send; draw before the first await.
    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let max_ms = self.config.max_delay.as_millis() as u64;
        let delay = Duration::from_millis(rng.gen_range(0..=max_ms));
        (delay, rng.gen_bool(self.config.approval_rate))
    }
}

#[async_trait]
impl TransactionValidator for SimulatedValidator {
    async fn validate(&self, request: &TransactionRequest) -> bool {
        let (delay, is_valid) = self.draw();
        tokio::time::sleep(delay).await;
        debug!(
            transaction_id = %request.transaction_id,
            delay_ms = delay.as_millis() as u64,
            is_valid,
            "[worker] Simulated validation"
        );
        is_valid
    }
}

/// Always returns the same verdict, optionally after a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedValidator {
    pub verdict: bool,
    pub delay: Duration,
}

impl FixedValidator {
    #[must_use]
    pub fn approving() -> Self {
        Self {
            verdict: true,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            verdict: false,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl TransactionValidator for FixedValidator {
    async fn validate(&self, _request: &TransactionRequest) -> bool {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.verdict
    }
}
