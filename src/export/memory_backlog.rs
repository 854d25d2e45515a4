// src/export/memory_backlog.rs
//! Bounded in-memory backlog for the direct-send path
//!
//! Used when disk buffering is disabled. Spans accumulate in a bounded
//! queue while the device is offline; the first export after connectivity
//! returns sends the whole backlog in one batch.
//!
//! # Overflow
//!
//! When the queue is full, incoming spans (or spans re-queued after a
//! failed send) that do not fit are discarded. No age-based preference is
//! made: whatever fits is kept.

use crate::export::encoder::SpanEncoder;
use crate::export::record::{EncodedBatch, SharedSpan};
use crate::export::transport::{ConnectivityOracle, SpanSender};
use crate::export::SpanExporter;
use crate::utils::errors::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Exporter holding spans in memory until they can be sent
pub struct MemoryBacklog {
    queue: VecDeque<SharedSpan>,
    capacity: usize,
    encoder: Arc<dyn SpanEncoder>,
    sender: Arc<dyn SpanSender>,
    connectivity: Arc<dyn ConnectivityOracle>,
    stats: BacklogStats,
}

impl MemoryBacklog {
    pub fn new(
        capacity: usize,
        encoder: Arc<dyn SpanEncoder>,
        sender: Arc<dyn SpanSender>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            encoder,
            sender,
            connectivity,
            stats: BacklogStats {
                capacity,
                ..Default::default()
            },
        }
    }

    /// Append spans, discarding any that do not fit
    fn enqueue(&mut self, spans: impl IntoIterator<Item = SharedSpan>) -> u64 {
        let mut dropped = 0u64;
        for span in spans {
            if self.queue.len() < self.capacity {
                self.queue.push_back(span);
                self.stats.queued_count += 1;
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.stats.drop_count += dropped;
            metrics::counter!("sentra_telemetry_backlog_overflow_total").increment(dropped);
        }
        dropped
    }

    /// Send the whole backlog as one batch
    ///
    /// On failure the attempted spans are re-queued up to capacity.
    fn drain(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let pending: Vec<SharedSpan> = self.queue.drain(..).collect();
        let count = pending.len();

        let mut blocks = Vec::with_capacity(count);
        for span in &pending {
            match self.encoder.encode(span.as_ref()) {
                Ok(block) => blocks.push(block),
                Err(e) => warn!("Dropping span {} that failed to encode: {}", span.span_id(), e),
            }
        }
        let batch = EncodedBatch::new(blocks);

        match self.sender.send(&batch) {
            Ok(()) => {
                debug!("Sent {} backlogged spans ({} bytes)", count, batch.byte_size());
                self.stats.sent_count += count as u64;
            }
            Err(e) => {
                warn!("Failed to send {} backlogged spans: {}", count, e);
                let dropped = self.enqueue(pending);
                if dropped > 0 {
                    warn!("Backlog full, discarded {} spans after failed send", dropped);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BacklogStats {
        BacklogStats {
            current_size: self.queue.len(),
            ..self.stats.clone()
        }
    }
}

impl SpanExporter for MemoryBacklog {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        let dropped = self.enqueue(spans);
        if dropped > 0 {
            warn!("Backlog full, discarded {} incoming spans", dropped);
        }

        if !self.connectivity.refresh_network_status().is_online() {
            debug!("Offline, holding {} spans in backlog", self.queue.len());
            return Ok(());
        }

        self.drain();
        Ok(())
    }

    /// Send regardless of reported connectivity
    fn flush(&mut self) -> Result<()> {
        self.drain();
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.queue.clear();
        self.sender.shutdown()
    }
}

/// Backlog statistics
#[derive(Debug, Clone, Default)]
pub struct BacklogStats {
    /// Total spans accepted into the queue (including re-queues)
    pub queued_count: u64,

    /// Total spans delivered
    pub sent_count: u64,

    /// Total spans discarded because the queue was full
    pub drop_count: u64,

    /// Current queue size
    pub current_size: usize,

    /// Queue capacity
    pub capacity: usize,
}

impl BacklogStats {
    /// Calculate fill percentage
    pub fn fill_percentage(&self) -> f64 {
        (self.current_size as f64 / self.capacity as f64) * 100.0
    }
}
