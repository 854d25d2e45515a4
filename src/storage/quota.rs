// src/storage/quota.rs
//! Disk quota enforcement for the backlog directory
//!
//! Keeps backlog usage under a byte limit by deleting the least recently
//! modified backlog files first.
//!
//! The writer and the drainer hold clones of one enforcer. Clones share an
//! eviction lock, so only one of them measures and evicts at a time.

use crate::storage::files::BacklogDirectory;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Evicts oldest backlog files once usage exceeds the limit
#[derive(Debug, Clone)]
pub struct StorageQuotaEnforcer {
    directory: BacklogDirectory,
    max_bytes: u64,
    eviction: Arc<Mutex<()>>,
}

impl StorageQuotaEnforcer {
    pub fn new(directory: BacklogDirectory, max_bytes: u64) -> Self {
        Self {
            directory,
            max_bytes,
            eviction: Arc::new(Mutex::new(())),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Make room for new backlog data
    ///
    /// Under the limit, returns whether the filesystem still has more than
    /// `max_bytes` available. Over the limit, evicts oldest files until
    /// usage is back under and returns whether that was achieved.
    pub fn ensure_free_space(&self) -> bool {
        let _guard = self.eviction.lock();

        let usage = match self.directory.total_size() {
            Ok(usage) => usage,
            Err(e) => {
                error!("Failed to measure backlog usage: {}", e);
                return false;
            }
        };

        if usage < self.max_bytes {
            return self.filesystem_has_room();
        }

        self.evict_until_under_limit(usage)
    }

    fn filesystem_has_room(&self) -> bool {
        match fs2::available_space(self.directory.path()) {
            Ok(available) => {
                let has_room = available > self.max_bytes;
                if !has_room {
                    warn!(
                        "Only {} bytes free on backlog filesystem, below {} byte quota",
                        available, self.max_bytes
                    );
                }
                has_room
            }
            Err(e) => {
                warn!("Failed to read free space for {:?}: {}", self.directory.path(), e);
                true
            }
        }
    }

    fn evict_until_under_limit(&self, mut usage: u64) -> bool {
        let files = match self.directory.files_by_modification_time() {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to list backlog files for eviction: {}", e);
                return false;
            }
        };

        debug!(
            "Backlog usage {} bytes exceeds {} byte quota, evicting",
            usage, self.max_bytes
        );

        for (path, len) in files {
            if usage < self.max_bytes {
                break;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    warn!("Evicted backlog file {:?} ({} bytes) to honor disk quota", path, len);
                    metrics::counter!("sentra_telemetry_backlog_files_evicted_total").increment(1);
                    usage = usage.saturating_sub(len);
                }
                // Sent and deleted by the drainer since the listing
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Backlog file {:?} already gone", path);
                    usage = usage.saturating_sub(len);
                }
                Err(e) => error!("Failed to evict backlog file {:?}: {}", path, e),
            }
        }

        usage < self.max_bytes
    }
}
