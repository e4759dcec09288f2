//! Worker domain: configuration, errors and the verdict cache.

mod config;
mod error;
mod verdict_cache;

pub use config::*;
pub use error::*;
pub use verdict_cache::*;
