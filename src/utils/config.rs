// src/utils/config.rs
//! Export pipeline configuration
//!
//! Loaded from an optional file plus `SENTRA_TELEMETRY_*` environment
//! variables (nested keys use `__`, e.g.
//! `SENTRA_TELEMETRY_RATE_LIMITER__MAX_PER_WINDOW=50`). Every field has a
//! default, so an empty source yields [`ExportConfig::default`].

use crate::utils::errors::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SENTRA_TELEMETRY";
const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Per-category admission control settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Maximum spans admitted per category inside one window
    pub max_per_window: usize,

    /// Trailing window length in seconds
    pub window_size_seconds: u64,

    /// Attribute whose value selects the category.
    /// `None` puts every span in the same bucket.
    pub category_attribute: Option<String>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_window: 100,
            window_size_seconds: 30,
            category_attribute: None,
        }
    }
}

impl RateLimiterConfig {
    pub fn window_size(&self) -> Duration {
        Duration::from_secs(self.window_size_seconds)
    }
}

/// Configuration for the whole export pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Persist batches to disk instead of holding them in memory
    pub disk_buffering_enabled: bool,

    /// Directory holding backlog files
    pub backlog_dir: PathBuf,

    /// Extension identifying backlog files (without the dot)
    pub backlog_extension: String,

    /// Disk quota for the backlog directory
    pub max_disk_usage_megabytes: u64,

    /// Capacity of the in-memory backlog
    pub max_backlog_records: usize,

    /// Sustained upload rate above which draining pauses
    pub bandwidth_limit_bytes_per_second: f64,

    /// Observations averaged by the bandwidth tracker
    pub bandwidth_samples: usize,

    /// Seconds between drain cycles
    pub drain_interval_seconds: u64,

    /// Failed sends tolerated per file before it is deleted
    pub max_retries: u32,

    pub rate_limiter: RateLimiterConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            disk_buffering_enabled: false,
            backlog_dir: PathBuf::from("telemetry-backlog"),
            backlog_extension: "spans".to_string(),
            max_disk_usage_megabytes: 25,
            max_backlog_records: 100,
            bandwidth_limit_bytes_per_second: 15.0 * 1024.0,
            bandwidth_samples: 6,
            drain_interval_seconds: 5,
            max_retries: 20,
            rate_limiter: RateLimiterConfig::default(),
        }
    }
}

impl ExportConfig {
    /// Load from environment variables only
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an optional file, with environment variables layered on top
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ExportError::ConfigError(format!("Failed to load configuration: {}", e)))?;

        let config: ExportConfig = settings
            .try_deserialize()
            .map_err(|e| ExportError::ConfigError(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configured limits
    pub fn validate(&self) -> Result<()> {
        if self.backlog_extension.is_empty() || self.backlog_extension.contains('.') {
            return Err(ExportError::ConfigError(
                "backlog_extension must be non-empty and contain no '.'".to_string(),
            ));
        }

        if self.max_disk_usage_megabytes == 0 {
            return Err(ExportError::ConfigError(
                "max_disk_usage_megabytes cannot be 0".to_string(),
            ));
        }

        if self.max_disk_usage_megabytes.checked_mul(BYTES_PER_MEGABYTE).is_none() {
            return Err(ExportError::ConfigError(format!(
                "max_disk_usage_megabytes too large: {}",
                self.max_disk_usage_megabytes
            )));
        }

        if self.max_backlog_records == 0 {
            return Err(ExportError::ConfigError(
                "max_backlog_records cannot be 0".to_string(),
            ));
        }

        if !self.bandwidth_limit_bytes_per_second.is_finite()
            || self.bandwidth_limit_bytes_per_second <= 0.0
        {
            return Err(ExportError::ConfigError(format!(
                "bandwidth_limit_bytes_per_second must be finite and positive, got {}",
                self.bandwidth_limit_bytes_per_second
            )));
        }

        if self.bandwidth_samples == 0 {
            return Err(ExportError::ConfigError(
                "bandwidth_samples cannot be 0".to_string(),
            ));
        }

        if self.drain_interval_seconds == 0 {
            return Err(ExportError::ConfigError(
                "drain_interval_seconds cannot be 0".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(ExportError::ConfigError("max_retries cannot be 0".to_string()));
        }

        if self.rate_limiter.max_per_window == 0 {
            return Err(ExportError::ConfigError(
                "rate_limiter.max_per_window cannot be 0".to_string(),
            ));
        }

        if self.rate_limiter.window_size_seconds == 0 {
            return Err(ExportError::ConfigError(
                "rate_limiter.window_size_seconds cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn max_disk_usage_bytes(&self) -> u64 {
        self.max_disk_usage_megabytes.saturating_mul(BYTES_PER_MEGABYTE)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert!(!config.disk_buffering_enabled);
        assert_eq!(config.max_disk_usage_megabytes, 25);
        assert_eq!(config.max_disk_usage_bytes(), 25 * 1024 * 1024);
        assert_eq!(config.max_backlog_records, 100);
        assert_eq!(config.drain_interval(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 20);
        assert_eq!(config.rate_limiter.max_per_window, 100);
        assert_eq!(config.rate_limiter.window_size(), Duration::from_secs(30));
        assert!(config.rate_limiter.category_attribute.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let invalid_retries = ExportConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(invalid_retries.validate().is_err());

        let invalid_bandwidth = ExportConfig {
            bandwidth_limit_bytes_per_second: f64::NAN,
            ..Default::default()
        };
        assert!(invalid_bandwidth.validate().is_err());

        let invalid_extension = ExportConfig {
            backlog_extension: "tar.gz".to_string(),
            ..Default::default()
        };
        assert!(invalid_extension.validate().is_err());

        let invalid_window = ExportConfig {
            rate_limiter: RateLimiterConfig {
                window_size_seconds: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(invalid_window.validate().is_err());

        let oversized_quota = ExportConfig {
            max_disk_usage_megabytes: u64::MAX / 1024,
            ..Default::default()
        };
        assert!(oversized_quota.validate().is_err());
        assert_eq!(oversized_quota.max_disk_usage_bytes(), u64::MAX);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
disk_buffering_enabled = true
max_retries = 7

[rate_limiter]
max_per_window = 10
category_attribute = "screen.name"
"#
        )
        .unwrap();

        let config = ExportConfig::load_from(Some(file.path())).unwrap();
        assert!(config.disk_buffering_enabled);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.rate_limiter.max_per_window, 10);
        assert_eq!(
            config.rate_limiter.category_attribute.as_deref(),
            Some("screen.name")
        );
        // Untouched fields keep their defaults
        assert_eq!(config.max_backlog_records, 100);
        assert_eq!(config.rate_limiter.window_size_seconds, 30);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_backlog_records = 0").unwrap();

        let result = ExportConfig::load_from(Some(file.path()));
        assert!(matches!(result, Err(ExportError::ConfigError(_))));
    }
}
