// src/storage/bandwidth.rs
//! Sliding-window upload throughput estimate
//!
//! Keeps the last `samples + 1` observations. The oldest retained
//! observation only anchors the start of the window: its bytes were moved
//! before the window began and are left out of the sum.

use crate::utils::clock::Clock;
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_SAMPLES: usize = 6;

/// Throughput estimator over outgoing batch sizes
pub struct BandwidthTracker {
    clock: Arc<dyn Clock>,
    capacity: usize,
    timestamps_ms: VecDeque<u64>,
    sizes: VecDeque<u64>,
}

impl BandwidthTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_samples(clock, DEFAULT_SAMPLES)
    }

    pub fn with_samples(clock: Arc<dyn Clock>, samples: usize) -> Self {
        let capacity = samples.max(1) + 1;
        Self {
            clock,
            capacity,
            timestamps_ms: VecDeque::with_capacity(capacity),
            sizes: VecDeque::with_capacity(capacity),
        }
    }

    /// Record `batch_bytes` moved at the current time
    pub fn tick(&mut self, batch_bytes: u64) {
        self.timestamps_ms.push_back(self.clock.now_millis());
        self.sizes.push_back(batch_bytes);

        if self.timestamps_ms.len() > self.capacity {
            self.timestamps_ms.pop_front();
            self.sizes.pop_front();
        }
    }

    /// Bytes per second over the retained window
    ///
    /// Zero with fewer than two observations. When all observations share
    /// one millisecond the rate is unbounded if any bytes moved.
    pub fn total_sustained_rate(&self) -> f64 {
        let (Some(&first), Some(&last)) = (self.timestamps_ms.front(), self.timestamps_ms.back())
        else {
            return 0.0;
        };
        if self.timestamps_ms.len() < 2 {
            return 0.0;
        }

        let bytes: u64 = self.sizes.iter().skip(1).sum();
        let elapsed_secs = last.saturating_sub(first) as f64 / 1000.0;

        if elapsed_secs == 0.0 {
            return if bytes == 0 { 0.0 } else { f64::INFINITY };
        }

        bytes as f64 / elapsed_secs
    }

    pub fn observations(&self) -> usize {
        self.timestamps_ms.len()
    }
}
