//! Domain layer: quorum policy, configuration, errors and reports.

mod config;
mod error;
pub mod quorum;
mod report;

pub use config::*;
pub use error::*;
pub use quorum::{evaluate, QuorumTally, TallyUpdate, Verdict};
pub use report::*;
