//! # qg-01-coordinator
//!
//! Turns one broadcast over a fanout exchange into a single, quorum-gated
//! compliance verdict.
//!
//! ## Flow
//!
//! ```text
//! submit(request)
//!   │ 1. assign transaction_id
//!   │ 2. declare exclusive reply queue named after it
//!   │ 3. publish request to the fanout exchange (reply_to = reply queue)
//!   ▼
//! [transaction_requests] ──→ Worker ─┐
//!                        ──→ Worker ─┼──→ [reply queue] ──→ QuorumTally
//!                        ──→ Worker ─┘                          │
//!   ◄──────────── verdict (quorum reached or deadline) ─────────┘
//!   │ 5. delete reply queue
//! ```
//!
//! The reply queue is the only per-request broker resource. It is deleted on
//! every exit path, including the submitting future being dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qg_01_coordinator::{CoordinatorApi, CoordinatorConfig, CoordinatorService};
//!
//! let coordinator = CoordinatorService::new(transport, CoordinatorConfig::default()).await?;
//! let is_compliant = coordinator.submit(request).await?;
//! ```

pub mod domain;
pub mod ports;
pub mod service;

// Re-export main types
pub use domain::{
    evaluate, ComplianceReport, CoordinatorConfig, CoordinatorError, CoordinatorResult, IdPolicy,
    QuorumTally, TallyUpdate, Verdict,
};
pub use ports::CoordinatorApi;
pub use service::CoordinatorService;
