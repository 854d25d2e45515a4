// src/export/mod.rs
//! Span export chain
//!
//! This module provides the in-process stages every span passes through:
//!
//! - **Record**: span data model and the decorated "modified" view
//! - **Filter**: name/attribute rejection, attribute rewrites, exception
//!   normalization
//! - **Throttle**: per-category sliding-window admission control
//! - **Memory Backlog**: bounded queue for the direct-send path
//! - **Encoder**: opaque per-span wire encoding
//! - **Transport**: sender and connectivity collaborators
//!
//! # Architecture
//!
//! ```text
//! span → FilteringExporter → ThrottlingExporter ─┬→ MemoryBacklog → SpanSender
//!                                                └→ DiskBacklogWriter → files
//! ```

pub mod encoder;
pub mod filter;
pub mod memory_backlog;
pub mod record;
pub mod throttle;
pub mod transport;

use crate::utils::errors::Result;
use record::SharedSpan;

// Re-export commonly used types
pub use encoder::{JsonSpanEncoder, SpanEncoder};
pub use filter::{FilteringExporter, SpanFilter, SpanFilterBuilder};
pub use memory_backlog::{BacklogStats, MemoryBacklog};
pub use record::{
    AttributeKey, AttributeType, AttributeValue, Attributes, EncodedBatch, ModifiedRecord,
    ReadableSpan, SpanEvent, SpanRecord,
};
pub use throttle::ThrottlingExporter;
pub use transport::{AlwaysOnline, ConnectivityOracle, NetworkStatus, SpanSender};

/// One stage of the export chain
///
/// Methods take `&mut self`: a chain is owned by a single worker and is
/// never driven from two threads at once. Implementations are `Send` so
/// the chain can be moved onto that worker.
pub trait SpanExporter: Send {
    /// Accept a batch, sorted by ascending end time
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()>;

    /// Push out anything held back
    fn flush(&mut self) -> Result<()>;

    /// Release resources; no further I/O happens afterwards
    fn shutdown(&mut self) -> Result<()>;
}

impl<E: SpanExporter + ?Sized> SpanExporter for Box<E> {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        (**self).export(spans)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }
}
