// src/observability.rs
//! Logging setup for hosts that do not install their own subscriber
//!
//! The pipeline only emits through the `tracing` and `metrics` facades;
//! installing a subscriber or a metrics recorder is up to the host.

use crate::utils::errors::{ExportError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` overrides `default_level`. Fails if a global subscriber is
/// already set.
pub fn init_tracing(default_level: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| ExportError::RuntimeError(format!("Failed to install tracing subscriber: {}", e)))
}
