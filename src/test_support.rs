// src/test_support.rs
//! Shared fakes for unit tests

use crate::export::record::{EncodedBatch, SharedSpan, SpanRecord};
use crate::export::transport::{ConnectivityOracle, NetworkStatus, SpanSender};
use crate::utils::errors::{ExportError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sender that records every batch and can be switched into failure mode
#[derive(Default)]
pub struct RecordingSender {
    batches: Mutex<Vec<EncodedBatch>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<EncodedBatch> {
        self.batches.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SpanSender for RecordingSender {
    fn send(&self, batch: &EncodedBatch) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExportError::SendFailed("collector unavailable".to_string()));
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Oracle whose answer is set by the test
pub struct FixedConnectivity {
    online: AtomicBool,
    probes: AtomicUsize,
}

impl FixedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ConnectivityOracle for FixedConnectivity {
    fn refresh_network_status(&self) -> NetworkStatus {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            NetworkStatus::ONLINE
        } else {
            NetworkStatus::OFFLINE
        }
    }
}

/// Span named `name` ending `end_secs` seconds after the epoch
pub fn span_ending_at(name: &str, end_secs: u64) -> SharedSpan {
    let end = end_secs * 1_000_000_000;
    SpanRecord::new(name, "trace", format!("span_{}", name), end.saturating_sub(1_000), end)
        .into_shared()
}
