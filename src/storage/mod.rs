// src/storage/mod.rs
//! Disk-backed backlog
//!
//! This module persists exported batches and drains them to the collector:
//!
//! - **Files**: backlog directory layout, listing and reading
//! - **Writer**: crash-atomic batch files named by creation time
//! - **Quota**: oldest-first eviction under a disk usage limit
//! - **Bandwidth**: sliding-window throughput estimate gating the drain
//! - **Retry**: per-file failure counts and backoff
//! - **Drainer**: scheduled, sequential delivery of pending files
//!
//! # Architecture
//!
//! ```text
//! DiskBacklogWriter ──write──→ <dir>/<epochMillis>.spans
//!        │                              │
//!   ensure_free_space            (every 5s) DiskBacklogDrainer
//!        ↓                              ↓
//! StorageQuotaEnforcer      ConnectivityOracle, BandwidthTracker
//!                                       ↓
//!                                  SpanSender → delete / retry / drop
//! ```

pub mod bandwidth;
pub mod drainer;
pub mod files;
pub mod quota;
pub mod retry;
pub mod writer;

// Re-export commonly used types
pub use bandwidth::BandwidthTracker;
pub use drainer::{CycleReport, CycleStop, DiskBacklogDrainer, DrainerHandle, DrainerStats, FileOutcome};
pub use files::BacklogDirectory;
pub use quota::StorageQuotaEnforcer;
pub use retry::{Backoff, DefaultBackoff, RetryDecision, RetryTracker};
pub use writer::{DiskBacklogWriter, WriterStats};
