//! Cross-component flows.

mod amqp_flows;
mod node_flows;
mod quorum_flows;
