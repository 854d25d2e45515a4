// src/storage/writer.rs
//! Disk backlog writer
//!
//! Encodes each exported batch and persists it as one backlog file. The
//! file is written to a temp file in the same directory, synced, then
//! renamed into place, so a reader never observes a half-written backlog
//! file.
//!
//! Failures never reach the caller: telemetry must not back-pressure the
//! host, so a batch that cannot be written is logged and lost.

use crate::export::encoder::SpanEncoder;
use crate::export::record::{EncodedBatch, SharedSpan};
use crate::export::SpanExporter;
use crate::storage::files::BacklogDirectory;
use crate::storage::quota::StorageQuotaEnforcer;
use crate::utils::clock::Clock;
use crate::utils::errors::{ExportError, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Upper bound on name-collision probes within one write
const MAX_NAME_PROBES: u64 = 1_000;

/// Exporter persisting batches to the backlog directory
pub struct DiskBacklogWriter {
    directory: BacklogDirectory,
    encoder: Arc<dyn SpanEncoder>,
    quota: StorageQuotaEnforcer,
    clock: Arc<dyn Clock>,
    stats: WriterStats,
}

impl DiskBacklogWriter {
    pub fn new(
        directory: BacklogDirectory,
        encoder: Arc<dyn SpanEncoder>,
        quota: StorageQuotaEnforcer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            encoder,
            quota,
            clock,
            stats: WriterStats::default(),
        }
    }

    /// Persist one encoded batch; `None` if it was dropped
    pub fn write(&mut self, batch: &EncodedBatch) -> Option<PathBuf> {
        if batch.is_empty() {
            return None;
        }

        if !self.quota.ensure_free_space() {
            error!(
                "Not enough free space for backlog, dropping {} spans",
                batch.len()
            );
            self.stats.batches_dropped += 1;
            return None;
        }

        match self.persist(batch) {
            Ok(path) => {
                debug!("Wrote {} spans ({} bytes) to {:?}", batch.len(), batch.byte_size(), path);
                self.stats.batches_written += 1;
                self.stats.bytes_written += batch.byte_size() as u64;
                Some(path)
            }
            Err(e) => {
                error!("Failed to write backlog file, dropping {} spans: {}", batch.len(), e);
                self.stats.batches_dropped += 1;
                None
            }
        }
    }

    fn persist(&self, batch: &EncodedBatch) -> Result<PathBuf> {
        let mut temp = tempfile::NamedTempFile::new_in(self.directory.path()).map_err(|e| {
            ExportError::StorageFailed(format!("Failed to create temp file: {}", e))
        })?;

        {
            let mut out = std::io::BufWriter::new(temp.as_file_mut());
            for block in batch.blocks() {
                out.write_all(block)
                    .and_then(|_| out.write_all(b"\n"))
                    .map_err(|e| {
                        ExportError::StorageFailed(format!("Failed to write temp file: {}", e))
                    })?;
            }
            out.flush().map_err(|e| {
                ExportError::StorageFailed(format!("Failed to flush temp file: {}", e))
            })?;
        }

        temp.as_file().sync_all().map_err(|e| {
            ExportError::StorageFailed(format!("Failed to sync temp file: {}", e))
        })?;

        // Two batches in the same millisecond get consecutive names
        let mut millis = self.clock.now_millis();
        for _ in 0..MAX_NAME_PROBES {
            let target = self.directory.file_for(millis);
            match temp.persist_noclobber(&target) {
                Ok(_) => return Ok(target),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    temp = e.file;
                    millis += 1;
                }
                Err(e) => {
                    return Err(ExportError::StorageFailed(format!(
                        "Failed to publish {:?}: {}",
                        target, e.error
                    )))
                }
            }
        }

        Err(ExportError::StorageFailed(format!(
            "No free backlog file name near {}",
            millis
        )))
    }

    pub fn stats(&self) -> WriterStats {
        self.stats.clone()
    }
}

impl SpanExporter for DiskBacklogWriter {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        let mut blocks = Vec::with_capacity(spans.len());
        for span in &spans {
            match self.encoder.encode(span.as_ref()) {
                Ok(block) => blocks.push(block),
                Err(e) => warn!("Dropping span {} that failed to encode: {}", span.span_id(), e),
            }
        }

        self.write(&EncodedBatch::new(blocks));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writer statistics
#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    pub batches_written: u64,
    pub batches_dropped: u64,
    pub bytes_written: u64,
}
