// src/lib.rs
//! Sentra Lab Telemetry Export Library
//!
//! This library moves finished spans from an instrumented process to a
//! remote collector despite intermittent connectivity, with bounded memory
//! and disk use.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **export**: span model, filtering, rate limiting, in-memory backlog
//! - **storage**: disk backlog writer, quota enforcement, scheduled drainer
//! - **pipeline**: the owned pipeline object wiring both together
//! - **observability**: logging setup for hosts without their own
//! - **utils**: configuration, errors, clock
//!
//! Delivery is best effort. Spans are dropped under sustained overload,
//! after repeated send failures, or when the disk quota forces eviction;
//! every such loss is logged and counted.

pub mod export;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use export::{
    ConnectivityOracle, EncodedBatch, NetworkStatus, ReadableSpan, SpanEncoder, SpanExporter,
    SpanFilter, SpanRecord, SpanSender,
};
pub use pipeline::{ExportPipeline, ExportPipelineBuilder};
pub use utils::config::ExportConfig;
pub use utils::errors::{ExportError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
