// src/storage/files.rs
//! Backlog directory layout
//!
//! Each backlog file holds one encoded batch, one block per line, and is
//! named `<epochMillis>.<extension>` so that name order is creation order.
//! Files with any other extension (including in-progress temp files) are
//! not backlog files and are ignored.

use crate::utils::errors::{ExportError, Result};
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Backlog directory and file naming scheme
#[derive(Debug, Clone)]
pub struct BacklogDirectory {
    path: PathBuf,
    extension: String,
}

impl BacklogDirectory {
    /// Open the directory, creating it if needed
    pub fn open(path: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| {
            ExportError::StorageFailed(format!(
                "Failed to create backlog directory {:?}: {}",
                path, e
            ))
        })?;

        Ok(Self {
            path,
            extension: extension.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the backlog file created at `epoch_millis`
    pub fn file_for(&self, epoch_millis: u64) -> PathBuf {
        self.path
            .join(format!("{}.{}", epoch_millis, self.extension))
    }

    fn is_backlog_file(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(self.extension.as_str())
    }

    fn regular_files(&self) -> Result<Vec<(PathBuf, fs::Metadata)>> {
        let entries = fs::read_dir(&self.path).map_err(|e| {
            ExportError::StorageFailed(format!("Failed to list {:?}: {}", self.path, e))
        })?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_file() {
                files.push((entry.path(), metadata));
            }
        }
        Ok(files)
    }

    /// Backlog files, oldest name first
    pub fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .regular_files()?
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| self.is_backlog_file(path))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Backlog files with sizes, least recently modified first
    pub fn files_by_modification_time(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut files: Vec<(PathBuf, u64, SystemTime)> = self
            .regular_files()?
            .into_iter()
            .filter(|(path, _)| self.is_backlog_file(path))
            .map(|(path, metadata)| {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                (path, metadata.len(), modified)
            })
            .collect();
        files.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
        Ok(files.into_iter().map(|(path, len, _)| (path, len)).collect())
    }

    /// Total bytes held by regular files in the directory
    pub fn total_size(&self) -> Result<u64> {
        Ok(self
            .regular_files()?
            .iter()
            .map(|(_, metadata)| metadata.len())
            .sum())
    }
}

/// Read the encoded blocks of a backlog file
///
/// Unreadable or non-UTF-8 content (e.g. a torn trailing line) yields an
/// empty list rather than an error: such a file has nothing to send.
pub fn read_blocks(path: &Path) -> Vec<Bytes> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Treating unreadable backlog file {:?} as empty: {}", path, e);
            return Vec::new();
        }
    };

    content
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| Bytes::copy_from_slice(line.as_bytes()))
        .collect()
}
