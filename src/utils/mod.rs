// src/utils/mod.rs
//! Shared utilities
//!
//! - **errors**: crate error type and `Result` alias
//! - **config**: pipeline configuration loading and validation
//! - **clock**: wall-clock abstraction used for file naming and rate math

pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExportConfig, RateLimiterConfig};
pub use errors::{ExportError, Result};
