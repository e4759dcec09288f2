//! Ports layer (Hexagonal Architecture)

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;
pub use shared_bus::Transport;
