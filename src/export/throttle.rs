// src/export/throttle.rs
//! Per-category sliding-window admission control
//!
//! Each category keeps the end timestamps of the spans it admitted during
//! the trailing window. A span is admitted when, after evicting timestamps
//! that fell out of the window, the category holds at most `max_per_window`
//! spans including it.
//!
//! # Precondition
//!
//! Spans within one `export` call must be sorted by ascending end time.
//! Out-of-order input is not reordered and its admission decisions are
//! unspecified.

use crate::export::record::{AttributeType, ReadableSpan, SharedSpan};
use crate::export::SpanExporter;
use crate::utils::config::RateLimiterConfig;
use crate::utils::errors::Result;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Category key; values of different types never share a bucket
type Category = Option<(AttributeType, String)>;

/// End timestamps (unix nanos) of admitted spans within the window
#[derive(Debug, Default)]
struct RateWindow {
    end_times: VecDeque<u64>,
}

impl RateWindow {
    fn admit(&mut self, end_time: u64, window_nanos: u64, max_per_window: usize) -> bool {
        self.end_times.push_back(end_time);

        while let Some(&oldest) = self.end_times.front() {
            if end_time.saturating_sub(oldest) >= window_nanos {
                self.end_times.pop_front();
            } else {
                break;
            }
        }

        if self.end_times.len() > max_per_window {
            // Rejected spans must not count against later admissions
            self.end_times.pop_back();
            false
        } else {
            true
        }
    }

    fn len(&self) -> usize {
        self.end_times.len()
    }
}

/// Exporter that drops spans exceeding the per-category rate
pub struct ThrottlingExporter<E> {
    delegate: E,
    category_attribute: Option<String>,
    max_per_window: usize,
    window_nanos: u64,
    windows: HashMap<Category, RateWindow>,
    dropped_total: u64,
}

impl<E: SpanExporter> ThrottlingExporter<E> {
    pub fn new(delegate: E, config: &RateLimiterConfig) -> Self {
        Self::with_limits(
            delegate,
            config.category_attribute.clone(),
            config.max_per_window,
            config.window_size(),
        )
    }

    pub fn with_limits(
        delegate: E,
        category_attribute: Option<String>,
        max_per_window: usize,
        window_size: Duration,
    ) -> Self {
        Self {
            delegate,
            category_attribute,
            max_per_window,
            window_nanos: window_size.as_nanos().min(u64::MAX as u128) as u64,
            windows: HashMap::new(),
            dropped_total: 0,
        }
    }

    /// Spans dropped since construction
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }

    /// Category of `span`; missing attributes share the `None` bucket
    fn category_of(&self, span: &dyn ReadableSpan) -> Category {
        let attribute = self.category_attribute.as_ref()?;
        span.attributes()
            .get(attribute)
            .map(|value| (value.kind(), value.to_string()))
    }

    /// Admit or reject each span, keeping window state across calls
    pub fn throttle(&mut self, spans: Vec<SharedSpan>) -> Vec<SharedSpan> {
        let mut admitted = Vec::with_capacity(spans.len());
        let mut dropped: HashMap<Category, u64> = HashMap::new();

        for span in spans {
            let category = self.category_of(span.as_ref());
            let window = self.windows.entry(category.clone()).or_default();

            if window.admit(
                span.end_time_unix_nano(),
                self.window_nanos,
                self.max_per_window,
            ) {
                admitted.push(span);
            } else {
                *dropped.entry(category).or_default() += 1;
            }
        }

        for (category, count) in dropped {
            let label = category.map_or_else(|| "default".to_string(), |(_, value)| value);
            debug!("Throttled {} spans in category {}", count, label);
            metrics::counter!("sentra_telemetry_spans_throttled_total", "category" => label)
                .increment(count);
            self.dropped_total += count;
        }

        admitted
    }
}

impl<E: SpanExporter> SpanExporter for ThrottlingExporter<E> {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        let admitted = self.throttle(spans);
        if admitted.is_empty() {
            return Ok(());
        }
        self.delegate.export(admitted)
    }

    fn flush(&mut self) -> Result<()> {
        self.delegate.flush()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.windows.clear();
        self.delegate.shutdown()
    }
}
