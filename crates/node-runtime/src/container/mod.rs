//! # Node Container
//!
//! Owns everything a running node needs: the broker connection, the
//! coordinator and the local worker pool, wired in dependency order.

pub mod config;
mod node;
mod transport;

pub use config::{
    load_config, BrokerConfig, BrokerMode, ConfigError, NodeConfig, NodeRole, WorkerPoolConfig,
};
pub use node::{handle_line, NodeContainer, SubmissionOutput};
pub use transport::NodeTransport;
