//! Ports layer (Hexagonal Architecture)
//!
//! The inbound API is defined here; the outbound port is
//! `shared_bus::Transport`.

mod inbound;

pub use inbound::*;
pub use shared_bus::Transport;
