//! Common types and configuration shared across the price tracker crates

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
