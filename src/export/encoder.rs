// src/export/encoder.rs
//! Span wire encoding
//!
//! The pipeline treats encoding as opaque: each span becomes one block of
//! bytes. Backlog files store one block per line, so encoders used with disk
//! buffering must not emit raw newlines.

use crate::export::record::{Attributes, ReadableSpan, SpanEvent};
use crate::utils::errors::{ExportError, Result};
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

/// Encodes a single span into one wire block
pub trait SpanEncoder: Send + Sync {
    fn encode(&self, span: &dyn ReadableSpan) -> Result<Bytes>;
}

/// Compact single-line JSON encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpanEncoder;

impl SpanEncoder for JsonSpanEncoder {
    fn encode(&self, span: &dyn ReadableSpan) -> Result<Bytes> {
        let document = JsonSpan {
            trace_id: span.trace_id(),
            id: span.span_id(),
            parent_id: span.parent_span_id(),
            name: span.name(),
            timestamp_us: span.start_time_unix_nano() / 1_000,
            duration_us: span
                .end_time_unix_nano()
                .saturating_sub(span.start_time_unix_nano())
                / 1_000,
            tags: span.attributes(),
            annotations: span.events(),
        };

        let encoded = serde_json::to_vec(&document).map_err(|e| {
            ExportError::EncodingFailed(format!("JSON serialization error: {}", e))
        })?;

        debug!("Encoded span {} ({} bytes)", span.span_id(), encoded.len());

        Ok(Bytes::from(encoded))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSpan<'a> {
    trace_id: &'a str,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    name: &'a str,
    #[serde(rename = "timestamp")]
    timestamp_us: u64,
    #[serde(rename = "duration")]
    duration_us: u64,
    tags: &'a Attributes,
    annotations: &'a [SpanEvent],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::record::SpanRecord;

    fn create_test_span() -> SpanRecord {
        SpanRecord::new("AppStart", "trace_abc", "span_123", 1_000_000, 3_000_000)
            .with_attribute("screen.name", "Main\nActivity")
    }

    #[test]
    fn test_json_encoding() {
        let encoded = JsonSpanEncoder.encode(&create_test_span()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value["traceId"], "trace_abc");
        assert_eq!(value["id"], "span_123");
        assert_eq!(value["name"], "AppStart");
        assert_eq!(value["timestamp"], 1_000);
        assert_eq!(value["duration"], 2_000);
        assert_eq!(value["tags"]["screen.name"], "Main\nActivity");
        assert!(value.get("parentId").is_none());
    }

    #[test]
    fn test_json_encoding_includes_parent() {
        let span = create_test_span().with_parent("span_root");
        let encoded = JsonSpanEncoder.encode(&span).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();

        assert_eq!(value["parentId"], "span_root");
    }

    #[test]
    fn test_json_encoding_is_single_line() {
        let encoded = JsonSpanEncoder.encode(&create_test_span()).unwrap();
        assert!(!encoded.contains(&b'\n'));
    }
}
