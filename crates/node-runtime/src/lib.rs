//! # Quorum Node Runtime
//!
//! Library half of the `quorum-node` binary, exposed so the end-to-end suite
//! can start a node in-process.

pub mod container;

pub use container::{
    handle_line, load_config, BrokerConfig, BrokerMode, ConfigError, NodeConfig, NodeContainer,
    NodeRole, NodeTransport, SubmissionOutput, WorkerPoolConfig,
};
