// src/storage/retry.rs
//! Failed-send bookkeeping per backlog file

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Delay to wait after the `attempt`-th consecutive failure of one file
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// `min(60, attempt * 5)` seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackoff;

impl Backoff for DefaultBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt).saturating_mul(5).min(60))
    }
}

/// Outcome of recording one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the file; `attempts` failures so far
    Retry { attempts: u32 },
    /// Attempts exhausted; the file must be dropped
    GiveUp { attempts: u32 },
}

/// Attempt counts keyed by backlog file
#[derive(Debug)]
pub struct RetryTracker {
    max_retries: u32,
    attempts: HashMap<PathBuf, u32>,
}

impl RetryTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            attempts: HashMap::new(),
        }
    }

    /// Count a failed send for `path`
    ///
    /// Once attempts reach `max_retries` the entry is removed and the
    /// caller is told to give up.
    pub fn record_failure(&mut self, path: &Path) -> RetryDecision {
        let attempts = {
            let count = self.attempts.entry(path.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };

        if attempts >= self.max_retries {
            self.attempts.remove(path);
            RetryDecision::GiveUp { attempts }
        } else {
            RetryDecision::Retry { attempts }
        }
    }

    pub fn clear(&mut self, path: &Path) {
        self.attempts.remove(path);
    }

    /// Forget files that are no longer pending
    pub fn retain_pending(&mut self, pending: &[PathBuf]) {
        if self.attempts.is_empty() {
            return;
        }
        let pending: HashSet<&PathBuf> = pending.iter().collect();
        self.attempts.retain(|path, _| pending.contains(path));
    }

    pub fn attempts(&self, path: &Path) -> u32 {
        self.attempts.get(path).copied().unwrap_or(0)
    }

    pub fn tracked_files(&self) -> usize {
        self.attempts.len()
    }
}
