//! # qg-02-worker
//!
//! A validator that listens on the broadcast exchange and answers every
//! transaction request with a verdict addressed to the request's reply queue.
//!
//! Each worker owns an anonymous, exclusive, auto-delete queue bound to the
//! fanout exchange, so every running worker sees every broadcast and its
//! queue disappears with its connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qg_02_worker::{SimulatedValidator, WorkerConfig, WorkerService};
//!
//! let worker = WorkerService::setup(transport, validator, WorkerConfig::default()).await?;
//! worker.run(shutdown_rx).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{FixedValidator, SimulatedValidator};
pub use domain::{
    SimulatedValidatorConfig, VerdictCache, WorkerConfig, WorkerError, WorkerResult,
};
pub use ports::{TransactionValidator, WorkerApi};
pub use service::{MessageOutcome, WorkerService};
