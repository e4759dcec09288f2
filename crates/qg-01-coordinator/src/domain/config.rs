//! Coordinator configuration.

use super::error::CoordinatorError;
use std::time::Duration;

/// Name of the broadcast exchange shared with the workers.
pub const DEFAULT_EXCHANGE_NAME: &str = "transaction_requests";

/// Valid responses required for a compliant verdict.
pub const DEFAULT_QUORUM_THRESHOLD: usize = 5;

/// How long a submission waits for the quorum.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// How transaction ids are chosen on submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Always generate a fresh id, overwriting any caller-supplied one.
    #[default]
    AlwaysGenerate,
    /// Keep a non-empty caller-supplied id; generate one otherwise.
    AcceptCallerSupplied,
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fanout exchange requests are broadcast on.
    pub exchange: String,
    /// Declare the exchange as durable.
    pub exchange_durable: bool,
    /// Absolute count of valid responses needed.
    pub quorum_threshold: usize,
    /// Upper bound on collection time per submission.
    pub deadline: Duration,
    /// How long to wait for the broker to accept the broadcast.
    pub publish_timeout: Duration,
    pub id_policy: IdPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE_NAME.to_string(),
            exchange_durable: true,
            quorum_threshold: DEFAULT_QUORUM_THRESHOLD,
            deadline: DEFAULT_DEADLINE,
            publish_timeout: Duration::from_secs(1),
            id_policy: IdPolicy::AlwaysGenerate,
        }
    }
}

impl CoordinatorConfig {
    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// `CoordinatorError::InvalidConfig` for an empty exchange name, a zero
    /// threshold or a zero deadline.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.exchange.is_empty() {
            return Err(CoordinatorError::InvalidConfig(
                "exchange name must not be empty".into(),
            ));
        }
        if self.quorum_threshold == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "quorum threshold must be at least 1".into(),
            ));
        }
        if self.deadline.is_zero() {
            return Err(CoordinatorError::InvalidConfig(
                "deadline must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        assert_eq!(CoordinatorConfig::default().id_policy, IdPolicy::AlwaysGenerate);
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = CoordinatorConfig {
            quorum_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CoordinatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_deadline_and_empty_exchange() {
        let config = CoordinatorConfig {
            deadline: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CoordinatorConfig {
            exchange: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
