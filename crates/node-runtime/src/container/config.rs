//! # Node Configuration
//!
//! Unified configuration for the broker connection, the coordinator, the
//! local worker pool and the simulated validator.
//!
//! A node runs the coordinator, the workers, or both. Running only one of
//! them needs a network broker the other half can reach.
//!
//! Every field has a default; `QG_*` environment variables override them and
//! the result is validated once at startup.

use qg_01_coordinator::{CoordinatorConfig, IdPolicy};
use qg_02_worker::SimulatedValidatorConfig;
use shared_bus::{AmqpSettings, BrokerCredentials, DEFAULT_BROKER_PORT};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub broker: BrokerConfig,
    pub coordinator: CoordinatorConfig,
    pub workers: WorkerPoolConfig,
    pub validator: SimulatedValidatorConfig,
}

/// Which components this node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Coordinator and workers in one process.
    #[default]
    All,
    Coordinator,
    Worker,
}

impl NodeRole {
    #[must_use]
    pub fn runs_coordinator(self) -> bool {
        matches!(self, NodeRole::All | NodeRole::Coordinator)
    }

    #[must_use]
    pub fn runs_workers(self) -> bool {
        matches!(self, NodeRole::All | NodeRole::Worker)
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(NodeRole::All),
            "coordinator" => Ok(NodeRole::Coordinator),
            "worker" => Ok(NodeRole::Worker),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::All => write!(f, "all"),
            NodeRole::Coordinator => write!(f, "coordinator"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

/// Which broker the node talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerMode {
    /// A broker inside this process. Host and port are unused.
    #[default]
    InMemory,
    /// A network broker speaking AMQP 0-9-1.
    Amqp,
}

impl FromStr for BrokerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BrokerMode::InMemory),
            "amqp" => Ok(BrokerMode::Amqp),
            other => Err(format!("unknown broker mode '{other}'")),
        }
    }
}

/// Where the broker lives and how to authenticate.
#[derive(Clone)]
pub struct BrokerConfig {
    pub mode: BrokerMode,
    pub host: String,
    pub port: u16,
    pub vhost: String,
    /// Opaque bearer credential, sent as the connection password. Empty
    /// disables authentication.
    pub bearer_token: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: BrokerMode::InMemory,
            host: "localhost".to_string(),
            port: DEFAULT_BROKER_PORT,
            vhost: "/".to_string(),
            bearer_token: String::new(),
        }
    }
}

impl BrokerConfig {
    /// Credentials to present: the bearer token, or none when it is empty.
    #[must_use]
    pub fn credentials(&self) -> BrokerCredentials {
        if self.bearer_token.is_empty() {
            BrokerCredentials::anonymous()
        } else {
            BrokerCredentials::bearer(self.bearer_token.clone())
        }
    }

    #[must_use]
    pub fn amqp_settings(&self) -> AmqpSettings {
        AmqpSettings {
            host: self.host.clone(),
            port: self.port,
            vhost: self.vhost.clone(),
            credentials: self.credentials(),
        }
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Local worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers to spawn, each on its own connection.
    pub count: usize,
    pub publish_timeout: Duration,
    pub verdict_cache_ttl: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            count: 6,
            publish_timeout: Duration::from_secs(1),
            verdict_cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("quorum threshold must be at least 1")]
    ZeroThreshold,

    #[error("deadline must be greater than zero")]
    ZeroDeadline,

    #[error("approval rate {0} is outside [0, 1]")]
    ApprovalRateOutOfRange(f64),

    #[error("at least one worker is required")]
    NoWorkers,

    #[error("exchange name must not be empty")]
    EmptyExchange,

    #[error("{var} has invalid value '{value}'")]
    InvalidValue { var: &'static str, value: String },

    #[error("role '{0}' needs a network broker (QG_BROKER=amqp)")]
    RoleNeedsNetworkBroker(NodeRole),
}

impl NodeConfig {
    /// Check the configuration is usable before anything is started.
    ///
    /// # Errors
    ///
    /// The first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.exchange.is_empty() {
            return Err(ConfigError::EmptyExchange);
        }
        if self.coordinator.quorum_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.coordinator.deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        if !(0.0..=1.0).contains(&self.validator.approval_rate) {
            return Err(ConfigError::ApprovalRateOutOfRange(
                self.validator.approval_rate,
            ));
        }
        if self.role.runs_workers() && self.workers.count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.role != NodeRole::All && self.broker.mode == BrokerMode::InMemory {
            return Err(ConfigError::RoleNeedsNetworkBroker(self.role));
        }
        Ok(())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// `InvalidValue` when a variable is set but does not parse.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(role) = parse_var(&lookup, "QG_ROLE")? {
            self.role = role;
        }
        if let Some(mode) = parse_var(&lookup, "QG_BROKER")? {
            self.broker.mode = mode;
        }
        if let Some(host) = lookup("QG_BROKER_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = parse_var(&lookup, "QG_BROKER_PORT")? {
            self.broker.port = port;
        }
        if let Some(vhost) = lookup("QG_BROKER_VHOST") {
            self.broker.vhost = vhost;
        }
        if let Some(token) = lookup("QG_BROKER_TOKEN") {
            self.broker.bearer_token = token;
        }
        if let Some(threshold) = parse_var(&lookup, "QG_QUORUM_THRESHOLD")? {
            self.coordinator.quorum_threshold = threshold;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "QG_DEADLINE_MS")? {
            self.coordinator.deadline = Duration::from_millis(ms);
        }
        if let Some(accept) = parse_var(&lookup, "QG_ACCEPT_CALLER_IDS")? {
            self.coordinator.id_policy = if accept {
                IdPolicy::AcceptCallerSupplied
            } else {
                IdPolicy::AlwaysGenerate
            };
        }
        if let Some(count) = parse_var(&lookup, "QG_WORKERS")? {
            self.workers.count = count;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "QG_VALIDATION_MAX_DELAY_MS")? {
            self.validator.max_delay = Duration::from_millis(ms);
        }
        if let Some(rate) = parse_var(&lookup, "QG_APPROVAL_RATE")? {
            self.validator.approval_rate = rate;
        }
        Ok(self)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

/// Load configuration from the process environment and validate it.
///
/// # Errors
///
/// Any `ConfigError` from parsing or validation.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    let config = NodeConfig::default().apply_overrides(|var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}
