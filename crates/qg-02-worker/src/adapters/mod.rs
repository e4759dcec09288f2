//! Adapters layer (Hexagonal Architecture)

mod simulated;

pub use simulated::*;
