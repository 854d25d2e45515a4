// src/utils/errors.rs
//! Error types for the telemetry export pipeline
//!
//! Export paths never surface these to the host: failures are logged and
//! resolved as dropped data. Errors are returned from construction
//! (configuration, directories) and from the collaborator traits.

use thiserror::Error;

/// Errors produced by the export pipeline and its collaborators
#[derive(Debug, Error)]
pub enum ExportError {
    /// Invalid or unloadable configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Backlog file or directory operation failed
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// The sender could not deliver a batch
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A span could not be wire-encoded
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// Runtime wiring problem (no tokio runtime, subscriber already set)
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;
