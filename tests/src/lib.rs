//! # Quorum Gateway Test Suite
//!
//! End-to-end flows: a real coordinator and real workers talking through the
//! in-process broker, plus ignored flows against a live AMQP broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Cluster builder and fault-injecting transport
//! └── integration/
//!     ├── quorum_flows.rs   # Verdict timing and reply-queue lifecycle
//!     ├── node_flows.rs     # Full node: config, auth, shutdown
//!     └── amqp_flows.rs     # Split coordinator/worker nodes (needs a broker)
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qg-tests
//! cargo test -p qg-tests integration::quorum_flows::
//! QG_TEST_AMQP_HOST=localhost cargo test -p qg-tests -- --ignored
//! ```

pub mod fixtures;
pub mod integration;
