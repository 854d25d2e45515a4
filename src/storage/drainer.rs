// src/storage/drainer.rs
//! Disk backlog drainer
//!
//! Periodically sends pending backlog files, oldest first, on one
//! background task.
//!
//! # Drain cycle
//!
//! ```text
//! enforce quota → online? ──no──→ skip
//!                    │yes
//!                    ↓
//!     for file in pending (by name):
//!         rate > limit?  → stop cycle
//!         empty/unreadable → next file
//!         send ok  → delete file, clear retries
//!         send err → retries < max: backoff, stop cycle
//!                    retries = max: delete file, stop cycle
//!                    ↓
//!     nothing sent? → tick bandwidth with 0 bytes
//! ```
//!
//! Sends are synchronous and sequential; throughput is throttled rather
//! than parallelized. The quota pass, connectivity probe, file reads,
//! sends and deletions run on tokio's blocking pool so a slow sender never
//! stalls the host's runtime. Only the wait between cycles and the backoff
//! sleep observe shutdown.

use crate::export::record::EncodedBatch;
use crate::export::transport::{ConnectivityOracle, SpanSender};
use crate::storage::bandwidth::BandwidthTracker;
use crate::storage::files::{read_blocks, BacklogDirectory};
use crate::storage::quota::StorageQuotaEnforcer;
use crate::storage::retry::{Backoff, RetryDecision, RetryTracker};
use crate::utils::errors::ExportError;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of attempting one backlog file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Delivered and deleted
    Sent,
    /// Empty or unreadable; not a send failure
    NothingToSend,
    /// Send failed; file kept for a later cycle
    Retrying { attempts: u32 },
    /// Send failed for the last allowed time; file deleted
    Dropped { attempts: u32 },
}

/// Why a cycle ended before processing every file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStop {
    Offline,
    Throttled,
    SendFailed,
    Cancelled,
}

/// Summary of one drain cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub files_sent: usize,
    pub stopped: Option<CycleStop>,
}

/// Drainer statistics
#[derive(Debug, Clone, Default)]
pub struct DrainerStats {
    pub cycles: u64,
    pub cycles_offline: u64,
    pub cycles_throttled: u64,
    pub files_sent: u64,
    pub files_dropped: u64,
    pub send_failures: u64,
    pub bytes_sent: u64,
}

/// Sends backlog files through a [`SpanSender`]
pub struct DiskBacklogDrainer {
    directory: BacklogDirectory,
    sender: Arc<dyn SpanSender>,
    connectivity: Arc<dyn ConnectivityOracle>,
    bandwidth: BandwidthTracker,
    bandwidth_limit: f64,
    retries: RetryTracker,
    backoff: Arc<dyn Backoff>,
    quota: Option<StorageQuotaEnforcer>,
    stats: Arc<Mutex<DrainerStats>>,
    cancel: CancellationToken,
}

impl DiskBacklogDrainer {
    pub fn new(
        directory: BacklogDirectory,
        sender: Arc<dyn SpanSender>,
        connectivity: Arc<dyn ConnectivityOracle>,
        bandwidth: BandwidthTracker,
        bandwidth_limit: f64,
        max_retries: u32,
        backoff: Arc<dyn Backoff>,
    ) -> Self {
        Self {
            directory,
            sender,
            connectivity,
            bandwidth,
            bandwidth_limit,
            retries: RetryTracker::new(max_retries),
            backoff,
            quota: None,
            stats: Arc::new(Mutex::new(DrainerStats::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Enforce `quota` at the start of every cycle
    pub fn with_quota(mut self, quota: StorageQuotaEnforcer) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn stats(&self) -> DrainerStats {
        self.stats.lock().clone()
    }

    pub fn retries(&self) -> &RetryTracker {
        &self.retries
    }

    /// Run one drain cycle
    pub async fn drain_cycle(&mut self) -> CycleReport {
        if self.cancel.is_cancelled() {
            return CycleReport {
                files_sent: 0,
                stopped: Some(CycleStop::Cancelled),
            };
        }

        self.stats.lock().cycles += 1;

        let Some(files) = self.survey().await else {
            debug!("Offline, skipping drain cycle");
            self.stats.lock().cycles_offline += 1;
            return CycleReport {
                files_sent: 0,
                stopped: Some(CycleStop::Offline),
            };
        };

        // Files evicted by the quota or removed by hand never come back
        self.retries.retain_pending(&files);

        let mut report = CycleReport::default();

        for path in files {
            if self.cancel.is_cancelled() {
                report.stopped = Some(CycleStop::Cancelled);
                break;
            }

            let rate = self.bandwidth.total_sustained_rate();
            if rate > self.bandwidth_limit {
                debug!(
                    "Sustained rate {:.1} B/s above limit {:.1} B/s, deferring remaining files",
                    rate, self.bandwidth_limit
                );
                self.stats.lock().cycles_throttled += 1;
                report.stopped = Some(CycleStop::Throttled);
                break;
            }

            match self.send_file(&path).await {
                FileOutcome::Sent => report.files_sent += 1,
                FileOutcome::NothingToSend => {}
                FileOutcome::Retrying { .. } | FileOutcome::Dropped { .. } => {
                    report.stopped = Some(CycleStop::SendFailed);
                    break;
                }
            }
        }

        if report.files_sent == 0 {
            self.bandwidth.tick(0);
        }

        report
    }

    /// Enforce the quota, probe connectivity and list pending files
    ///
    /// `None` when offline.
    async fn survey(&self) -> Option<Vec<PathBuf>> {
        let quota = self.quota.clone();
        let connectivity = Arc::clone(&self.connectivity);
        let directory = self.directory.clone();

        let survey = tokio::task::spawn_blocking(move || {
            if let Some(quota) = quota {
                if !quota.ensure_free_space() {
                    warn!("Backlog quota could not be satisfied");
                }
            }

            if !connectivity.refresh_network_status().is_online() {
                return None;
            }

            match directory.pending_files() {
                Ok(files) => Some(files),
                Err(e) => {
                    error!("Failed to list backlog files: {}", e);
                    Some(Vec::new())
                }
            }
        });

        match survey.await {
            Ok(files) => files,
            Err(e) => {
                error!("Backlog survey task failed: {}", e);
                Some(Vec::new())
            }
        }
    }

    /// Send one backlog file
    pub async fn send_file(&mut self, path: &Path) -> FileOutcome {
        let read_path = path.to_path_buf();
        let blocks = match tokio::task::spawn_blocking(move || read_blocks(&read_path)).await {
            Ok(blocks) => blocks,
            Err(e) => {
                error!("Failed to read backlog file {:?}: {}", path, e);
                Vec::new()
            }
        };
        if blocks.is_empty() {
            debug!("Backlog file {:?} has nothing to send", path);
            return FileOutcome::NothingToSend;
        }

        let batch = EncodedBatch::new(blocks);
        let spans = batch.len();
        let bytes = batch.byte_size() as u64;
        self.bandwidth.tick(bytes);

        let sender = Arc::clone(&self.sender);
        let sent = tokio::task::spawn_blocking(move || sender.send(&batch))
            .await
            .unwrap_or_else(|e| Err(ExportError::SendFailed(format!("send task failed: {}", e))));

        match sent {
            Ok(()) => {
                debug!("Sent backlog file {:?} ({} spans, {} bytes)", path, spans, bytes);
                self.retries.clear(path);
                remove_backlog_file(path).await;
                {
                    let mut stats = self.stats.lock();
                    stats.files_sent += 1;
                    stats.bytes_sent += bytes;
                }
                metrics::counter!("sentra_telemetry_backlog_files_sent_total").increment(1);
                FileOutcome::Sent
            }
            Err(e) => {
                self.stats.lock().send_failures += 1;

                match self.retries.record_failure(path) {
                    RetryDecision::Retry { attempts } => {
                        let delay = self.backoff.delay(attempts);
                        warn!(
                            "Failed to send backlog file {:?} (attempt {}): {}; retrying in {:?}",
                            path, attempts, e, delay
                        );
                        self.sleep(delay).await;
                        FileOutcome::Retrying { attempts }
                    }
                    RetryDecision::GiveUp { attempts } => {
                        warn!(
                            "Dropping backlog file {:?} after {} failed sends: {}",
                            path, attempts, e
                        );
                        remove_backlog_file(path).await;
                        self.stats.lock().files_dropped += 1;
                        metrics::counter!("sentra_telemetry_backlog_files_dropped_total")
                            .increment(1);
                        FileOutcome::Dropped { attempts }
                    }
                }
            }
        }
    }

    async fn sleep(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    /// Drain on a fixed schedule until the returned handle shuts it down
    ///
    /// The first cycle runs immediately. Must be called within a tokio
    /// runtime.
    pub fn spawn(self, period: Duration) -> DrainerHandle {
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.stats);
        let handle = tokio::spawn(self.run(period));

        DrainerHandle {
            cancel,
            stats,
            handle: Some(handle),
        }
    }

    async fn run(mut self, period: Duration) {
        info!(
            "Starting backlog drainer for {:?} every {:?}",
            self.directory.path(),
            period
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.drain_cycle().await;
                    if report.files_sent > 0 {
                        debug!("Drain cycle sent {} files", report.files_sent);
                    }
                }
            }
        }

        info!("Backlog drainer stopped");
    }
}

async fn remove_backlog_file(path: &Path) {
    let target = path.to_path_buf();
    let removed = tokio::task::spawn_blocking(move || fs::remove_file(target)).await;

    match removed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Failed to delete backlog file {:?}: {}", path, e),
        Err(e) => error!("Failed to delete backlog file {:?}: {}", path, e),
    }
}

/// Handle to a spawned drainer task
pub struct DrainerHandle {
    cancel: CancellationToken,
    stats: Arc<Mutex<DrainerStats>>,
    handle: Option<JoinHandle<()>>,
}

impl DrainerHandle {
    /// Stop scheduling cycles
    ///
    /// An in-flight send completes; nothing else is read, sent or deleted.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the drainer task to exit
    pub async fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Backlog drainer task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn stats(&self) -> DrainerStats {
        self.stats.lock().clone()
    }
}

impl Drop for DrainerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FixedConnectivity, RecordingSender};
    use crate::utils::clock::{Clock, ManualClock};
    use crate::utils::errors::Result;
    use tempfile::{tempdir, TempDir};
    use tokio::time::Instant;

    /// Blocks the calling thread for the whole send
    struct SlowSender {
        delay: Duration,
    }

    impl SpanSender for SlowSender {
        fn send(&self, _batch: &EncodedBatch) -> Result<()> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        directory: BacklogDirectory,
        clock: Arc<ManualClock>,
        sender: Arc<RecordingSender>,
        connectivity: Arc<FixedConnectivity>,
        backoff_attempts: Arc<Mutex<Vec<u32>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let directory = BacklogDirectory::open(dir.path(), "spans").unwrap();
            Self {
                _dir: dir,
                directory,
                clock: Arc::new(ManualClock::new(1_000_000)),
                sender: Arc::new(RecordingSender::new()),
                connectivity: Arc::new(FixedConnectivity::new(true)),
                backoff_attempts: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn drainer(&self, bandwidth_limit: f64, max_retries: u32) -> DiskBacklogDrainer {
            self.drainer_with_sender(
                Arc::clone(&self.sender) as Arc<dyn SpanSender>,
                bandwidth_limit,
                max_retries,
            )
        }

        fn drainer_with_sender(
            &self,
            sender: Arc<dyn SpanSender>,
            bandwidth_limit: f64,
            max_retries: u32,
        ) -> DiskBacklogDrainer {
            let attempts = Arc::clone(&self.backoff_attempts);
            let backoff = move |attempt: u32| {
                attempts.lock().push(attempt);
                Duration::ZERO
            };

            DiskBacklogDrainer::new(
                self.directory.clone(),
                sender,
                Arc::clone(&self.connectivity) as Arc<dyn ConnectivityOracle>,
                BandwidthTracker::new(Arc::clone(&self.clock) as Arc<dyn Clock>),
                bandwidth_limit,
                max_retries,
                Arc::new(backoff),
            )
        }

        fn write_file(&self, millis: u64, content: &str) -> PathBuf {
            let path = self.directory.file_for(millis);
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_sends_files_oldest_first_and_deletes_them() {
        let fixture = Fixture::new();
        let newer = fixture.write_file(2_000, "c\n");
        let older = fixture.write_file(1_000, "a\nb\n");
        let mut drainer = fixture.drainer(f64::MAX, 20);

        let report = drainer.drain_cycle().await;

        assert_eq!(report, CycleReport { files_sent: 2, stopped: None });
        let batches = fixture.sender.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(&batches[0].blocks()[0][..], b"a");
        assert_eq!(&batches[1].blocks()[0][..], b"c");
        assert!(!older.exists());
        assert!(!newer.exists());
        assert_eq!(drainer.stats().files_sent, 2);
    }

    #[tokio::test]
    async fn test_offline_skips_cycle() {
        let fixture = Fixture::new();
        let path = fixture.write_file(1_000, "a\n");
        fixture.connectivity.set_online(false);
        let mut drainer = fixture.drainer(f64::MAX, 20);

        let report = drainer.drain_cycle().await;

        assert_eq!(report.stopped, Some(CycleStop::Offline));
        assert_eq!(fixture.sender.attempts(), 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_deletes_file() {
        let fixture = Fixture::new();
        fixture.sender.set_failing(true);
        let path = fixture.write_file(1_000, "a\n");
        let mut drainer = fixture.drainer(f64::MAX, 3);

        assert_eq!(drainer.send_file(&path).await, FileOutcome::Retrying { attempts: 1 });
        assert_eq!(drainer.send_file(&path).await, FileOutcome::Retrying { attempts: 2 });
        assert!(path.exists());
        assert_eq!(drainer.send_file(&path).await, FileOutcome::Dropped { attempts: 3 });

        assert!(!path.exists());
        assert_eq!(*fixture.backoff_attempts.lock(), vec![1, 2]);
        assert_eq!(drainer.retries().tracked_files(), 0);

        // Never read again
        let report = drainer.drain_cycle().await;
        assert_eq!(report.files_sent, 0);
        assert_eq!(fixture.sender.attempts(), 3);
        assert_eq!(drainer.stats().files_dropped, 1);
    }

    #[tokio::test]
    async fn test_failure_stops_cycle() {
        let fixture = Fixture::new();
        fixture.sender.set_failing(true);
        let first = fixture.write_file(1_000, "a\n");
        let second = fixture.write_file(2_000, "b\n");
        let mut drainer = fixture.drainer(f64::MAX, 20);

        let report = drainer.drain_cycle().await;

        assert_eq!(report.stopped, Some(CycleStop::SendFailed));
        assert_eq!(fixture.sender.attempts(), 1);
        assert_eq!(drainer.retries().attempts(&first), 1);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_not_a_failure() {
        let fixture = Fixture::new();
        let empty = fixture.write_file(1_000, "");
        let full = fixture.write_file(2_000, "b\n");
        let mut drainer = fixture.drainer(f64::MAX, 20);

        assert_eq!(drainer.send_file(&empty).await, FileOutcome::NothingToSend);
        assert_eq!(drainer.retries().attempts(&empty), 0);
        assert_eq!(fixture.sender.attempts(), 0);

        let report = drainer.drain_cycle().await;
        assert_eq!(report.files_sent, 1);
        assert!(!full.exists());
        assert!(fixture.backoff_attempts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_bandwidth_limit_defers_remaining_files() {
        let fixture = Fixture::new();
        let first = fixture.write_file(1_000, &format!("{}\n", "x".repeat(10_000)));
        let second = fixture.write_file(2_000, "b\n");
        let mut drainer = fixture.drainer(100.0, 20);

        // Prime the tracker one second ago so the first send is measured
        drainer.bandwidth.tick(0);
        fixture.clock.advance(Duration::from_secs(1));

        let report = drainer.drain_cycle().await;

        assert_eq!(report, CycleReport { files_sent: 1, stopped: Some(CycleStop::Throttled) });
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(drainer.stats().cycles_throttled, 1);
    }

    #[tokio::test]
    async fn test_idle_cycle_ticks_zero() {
        let fixture = Fixture::new();
        let mut drainer = fixture.drainer(f64::MAX, 20);

        drainer.drain_cycle().await;
        fixture.clock.advance(Duration::from_secs(5));
        drainer.drain_cycle().await;

        assert_eq!(drainer.bandwidth.observations(), 2);
        assert_eq!(drainer.bandwidth.total_sustained_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_quota_enforced_even_when_offline() {
        let fixture = Fixture::new();
        let old = fixture.write_file(1_000, &"x".repeat(600));
        let recent = fixture.write_file(2_000, &"y".repeat(600));
        let past = std::time::SystemTime::now() - Duration::from_secs(600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();
        fixture.connectivity.set_online(false);

        let quota = StorageQuotaEnforcer::new(fixture.directory.clone(), 1_000);
        let mut drainer = fixture.drainer(f64::MAX, 20).with_quota(quota);

        drainer.drain_cycle().await;

        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[tokio::test]
    async fn test_retry_state_dropped_for_vanished_files() {
        let fixture = Fixture::new();
        fixture.sender.set_failing(true);
        let path = fixture.write_file(1_000, "a\n");
        let mut drainer = fixture.drainer(f64::MAX, 20);

        drainer.drain_cycle().await;
        assert_eq!(drainer.retries().tracked_files(), 1);

        fs::remove_file(&path).unwrap();
        drainer.drain_cycle().await;

        assert_eq!(drainer.retries().tracked_files(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_drainer_does_no_io() {
        let fixture = Fixture::new();
        let path = fixture.write_file(1_000, "a\n");
        let mut drainer = fixture.drainer(f64::MAX, 20);

        drainer.cancel.cancel();
        let report = drainer.drain_cycle().await;

        assert_eq!(report.stopped, Some(CycleStop::Cancelled));
        assert_eq!(fixture.connectivity.probes(), 0);
        assert_eq!(fixture.sender.attempts(), 0);
        assert!(path.exists());
        assert_eq!(drainer.stats().cycles, 0);
    }

    #[tokio::test]
    async fn test_blocking_send_does_not_stall_runtime() {
        let fixture = Fixture::new();
        let path = fixture.write_file(1_000, "a\n");
        let sender = Arc::new(SlowSender {
            delay: Duration::from_millis(500),
        });
        let mut drainer = fixture.drainer_with_sender(sender, f64::MAX, 20);

        let cycle = tokio::spawn(async move { drainer.drain_cycle().await });

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(400));

        let report = cycle.await.unwrap();
        assert_eq!(report.files_sent, 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_spawned_drainer_runs_and_shuts_down() {
        let fixture = Fixture::new();
        let path = fixture.write_file(1_000, "a\n");
        let drainer = fixture.drainer(f64::MAX, 20);

        let mut handle = drainer.spawn(Duration::from_millis(10));
        for _ in 0..200 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!path.exists());
        assert!(handle.is_running());

        handle.shutdown();
        handle.wait().await;
        assert!(!handle.is_running());
        assert_eq!(handle.stats().files_sent, 1);

        // No I/O after shutdown
        fixture.write_file(3_000, "late\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.sender.attempts(), 1);
    }
}
