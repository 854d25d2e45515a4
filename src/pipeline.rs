// src/pipeline.rs
//! Explicitly owned export pipeline
//!
//! The host builds one [`ExportPipeline`] and owns it; there is no global
//! instance. The pipeline is a [`SpanExporter`] whose `&mut self` methods
//! must be driven from a single worker.

use crate::export::encoder::{JsonSpanEncoder, SpanEncoder};
use crate::export::filter::{FilteringExporter, SpanFilter};
use crate::export::memory_backlog::MemoryBacklog;
use crate::export::record::SharedSpan;
use crate::export::throttle::ThrottlingExporter;
use crate::export::transport::{AlwaysOnline, ConnectivityOracle, SpanSender};
use crate::export::SpanExporter;
use crate::storage::bandwidth::BandwidthTracker;
use crate::storage::drainer::{DiskBacklogDrainer, DrainerHandle, DrainerStats};
use crate::storage::files::BacklogDirectory;
use crate::storage::quota::StorageQuotaEnforcer;
use crate::storage::retry::{Backoff, DefaultBackoff};
use crate::storage::writer::DiskBacklogWriter;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::config::ExportConfig;
use crate::utils::errors::{ExportError, Result};
use std::sync::Arc;
use tracing::{debug, info};

type Chain = FilteringExporter<ThrottlingExporter<Box<dyn SpanExporter>>>;

/// Builder for [`ExportPipeline`]
pub struct ExportPipelineBuilder {
    config: ExportConfig,
    sender: Option<Arc<dyn SpanSender>>,
    encoder: Arc<dyn SpanEncoder>,
    connectivity: Arc<dyn ConnectivityOracle>,
    clock: Arc<dyn Clock>,
    backoff: Arc<dyn Backoff>,
    filter: SpanFilter,
}

impl ExportPipelineBuilder {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            sender: None,
            encoder: Arc::new(JsonSpanEncoder),
            connectivity: Arc::new(AlwaysOnline),
            clock: Arc::new(SystemClock),
            backoff: Arc::new(DefaultBackoff),
            filter: SpanFilter::default(),
        }
    }

    /// Required
    pub fn with_sender(mut self, sender: Arc<dyn SpanSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn SpanEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityOracle>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_filter(mut self, filter: SpanFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Assemble the chain
    ///
    /// With disk buffering enabled the drainer is spawned on the current
    /// tokio runtime, so this must then be called from within one.
    pub fn build(self) -> Result<ExportPipeline> {
        self.config.validate()?;

        let sender = self
            .sender
            .ok_or_else(|| ExportError::ConfigError("a span sender is required".to_string()))?;

        let (backend, drainer): (Box<dyn SpanExporter>, Option<DrainerHandle>) =
            if self.config.disk_buffering_enabled {
                tokio::runtime::Handle::try_current().map_err(|e| {
                    ExportError::RuntimeError(format!(
                        "Disk buffering needs a tokio runtime: {}",
                        e
                    ))
                })?;

                let directory = BacklogDirectory::open(
                    &self.config.backlog_dir,
                    self.config.backlog_extension.clone(),
                )?;
                let quota = StorageQuotaEnforcer::new(
                    directory.clone(),
                    self.config.max_disk_usage_bytes(),
                );

                let writer = DiskBacklogWriter::new(
                    directory.clone(),
                    Arc::clone(&self.encoder),
                    quota.clone(),
                    Arc::clone(&self.clock),
                );

                let drainer = DiskBacklogDrainer::new(
                    directory,
                    Arc::clone(&sender),
                    Arc::clone(&self.connectivity),
                    BandwidthTracker::with_samples(
                        Arc::clone(&self.clock),
                        self.config.bandwidth_samples,
                    ),
                    self.config.bandwidth_limit_bytes_per_second,
                    self.config.max_retries,
                    Arc::clone(&self.backoff),
                )
                .with_quota(quota)
                .spawn(self.config.drain_interval());

                info!(
                    "Export pipeline buffering to disk at {:?}",
                    self.config.backlog_dir
                );
                (Box::new(writer), Some(drainer))
            } else {
                info!(
                    "Export pipeline buffering up to {} spans in memory",
                    self.config.max_backlog_records
                );
                let backlog = MemoryBacklog::new(
                    self.config.max_backlog_records,
                    Arc::clone(&self.encoder),
                    Arc::clone(&sender),
                    Arc::clone(&self.connectivity),
                );
                (Box::new(backlog), None)
            };

        let chain = FilteringExporter::new(
            self.filter,
            ThrottlingExporter::new(backend, &self.config.rate_limiter),
        );

        Ok(ExportPipeline {
            chain,
            drainer,
            sender,
            is_shutdown: false,
        })
    }
}

/// filter → throttle → memory backlog or disk writer
pub struct ExportPipeline {
    chain: Chain,
    drainer: Option<DrainerHandle>,
    sender: Arc<dyn SpanSender>,
    is_shutdown: bool,
}

impl ExportPipeline {
    pub fn builder(config: ExportConfig) -> ExportPipelineBuilder {
        ExportPipelineBuilder::new(config)
    }

    /// Spans dropped by the rate limiter so far
    pub fn throttled_total(&self) -> u64 {
        self.chain.delegate().dropped_total()
    }

    /// Drainer counters; `None` on the memory path
    pub fn drainer_stats(&self) -> Option<DrainerStats> {
        self.drainer.as_ref().map(DrainerHandle::stats)
    }

    pub fn is_disk_buffered(&self) -> bool {
        self.drainer.is_some()
    }

    /// Wait for the drainer task to exit after [`SpanExporter::shutdown`]
    pub async fn wait_for_drainer(&mut self) {
        if let Some(drainer) = self.drainer.as_mut() {
            drainer.wait().await;
        }
    }
}

impl SpanExporter for ExportPipeline {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        if self.is_shutdown {
            debug!("Pipeline shut down, ignoring {} spans", spans.len());
            return Ok(());
        }
        self.chain.export(spans)
    }

    fn flush(&mut self) -> Result<()> {
        if self.is_shutdown {
            return Ok(());
        }
        self.chain.flush()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.is_shutdown {
            return Ok(());
        }
        self.is_shutdown = true;
        info!("Shutting down export pipeline");

        match self.drainer.as_ref() {
            Some(drainer) => {
                drainer.shutdown();
                self.chain.shutdown()?;
                self.sender.shutdown()
            }
            // The memory backlog forwards shutdown to the sender itself
            None => self.chain.shutdown(),
        }
    }
}
