// src/export/record.rs
//! Span data model
//!
//! A [`SpanRecord`] is immutable once produced by instrumentation. Filters
//! never mutate it; they wrap it in a [`ModifiedRecord`] that overrides only
//! the fields they touched.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Attribute value type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    I64,
    F64,
    Bool,
}

/// Heterogeneous attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeType {
        match self {
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::I64(_) => AttributeType::I64,
            AttributeValue::F64(_) => AttributeType::F64,
            AttributeValue::Bool(_) => AttributeType::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(v) => f.write_str(v),
            AttributeValue::I64(v) => write!(f, "{}", v),
            AttributeValue::F64(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::I64(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::F64(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// Typed attribute key
///
/// Rules keyed by an `AttributeKey` only match attributes whose value has
/// the declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub name: String,
    pub kind: AttributeType,
}

impl AttributeKey {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }

    pub fn i64(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::I64)
    }

    pub fn f64(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::F64)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Bool)
    }

    /// Look up this key in `attributes`, honoring the declared type
    pub fn get<'a>(&self, attributes: &'a Attributes) -> Option<&'a AttributeValue> {
        attributes.get(&self.name).filter(|v| v.kind() == self.kind)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Timestamped event attached to a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nano: u64,
    #[serde(default)]
    pub attributes: Attributes,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>, time_unix_nano: u64) -> Self {
        Self {
            name: name.into(),
            time_unix_nano,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Read access to a finished span
pub trait ReadableSpan: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn start_time_unix_nano(&self) -> u64;
    fn end_time_unix_nano(&self) -> u64;
    fn attributes(&self) -> &Attributes;
    fn events(&self) -> &[SpanEvent];
    fn trace_id(&self) -> &str;
    fn span_id(&self) -> &str;
    fn parent_span_id(&self) -> Option<&str>;
}

pub type SharedSpan = Arc<dyn ReadableSpan>;

/// Finished span as produced by instrumentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub name: String,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
}

impl SpanRecord {
    pub fn new(
        name: impl Into<String>,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        start_time_unix_nano: u64,
        end_time_unix_nano: u64,
    ) -> Self {
        Self {
            name: name.into(),
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
            start_time_unix_nano,
            end_time_unix_nano,
            attributes: Attributes::new(),
            events: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_event(mut self, event: SpanEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn into_shared(self) -> SharedSpan {
        Arc::new(self)
    }
}

impl ReadableSpan for SpanRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_time_unix_nano(&self) -> u64 {
        self.start_time_unix_nano
    }

    fn end_time_unix_nano(&self) -> u64 {
        self.end_time_unix_nano
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn events(&self) -> &[SpanEvent] {
        &self.events
    }

    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn span_id(&self) -> &str {
        &self.span_id
    }

    fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }
}

/// Decorated view of another span
///
/// Holds the original behind an `Arc` plus only the overridden fields;
/// everything else is delegated.
#[derive(Debug, Clone)]
pub struct ModifiedRecord {
    original: SharedSpan,
    name: Option<String>,
    attributes: Option<Attributes>,
    events: Option<Vec<SpanEvent>>,
}

impl ModifiedRecord {
    pub fn new(original: SharedSpan) -> Self {
        Self {
            original,
            name: None,
            attributes: None,
            events: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_events(mut self, events: Vec<SpanEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn original(&self) -> &SharedSpan {
        &self.original
    }

    pub fn into_shared(self) -> SharedSpan {
        Arc::new(self)
    }
}

impl ReadableSpan for ModifiedRecord {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.original.name())
    }

    fn start_time_unix_nano(&self) -> u64 {
        self.original.start_time_unix_nano()
    }

    fn end_time_unix_nano(&self) -> u64 {
        self.original.end_time_unix_nano()
    }

    fn attributes(&self) -> &Attributes {
        self.attributes
            .as_ref()
            .unwrap_or_else(|| self.original.attributes())
    }

    fn events(&self) -> &[SpanEvent] {
        self.events
            .as_deref()
            .unwrap_or_else(|| self.original.events())
    }

    fn trace_id(&self) -> &str {
        self.original.trace_id()
    }

    fn span_id(&self) -> &str {
        self.original.span_id()
    }

    fn parent_span_id(&self) -> Option<&str> {
        self.original.parent_span_id()
    }
}

/// Wire-encoded spans, one opaque block per span, in export order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedBatch {
    blocks: Vec<Bytes>,
}

impl EncodedBatch {
    pub fn new(blocks: Vec<Bytes>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total encoded bytes across all blocks
    pub fn byte_size(&self) -> usize {
        self.blocks.iter().map(Bytes::len).sum()
    }
}

impl From<Vec<Bytes>> for EncodedBatch {
    fn from(blocks: Vec<Bytes>) -> Self {
        Self::new(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_span() -> SpanRecord {
        SpanRecord::new("AppStart", "trace_1", "span_1", 100, 200)
            .with_attribute("screen.name", "MainActivity")
            .with_attribute("count", 3i64)
            .with_event(SpanEvent::new("created", 150))
    }

    #[test]
    fn test_typed_key_lookup() {
        let span = create_test_span();

        assert!(AttributeKey::string("screen.name").get(&span.attributes).is_some());
        // Present, but declared with the wrong type
        assert!(AttributeKey::bool("screen.name").get(&span.attributes).is_none());
        assert_eq!(
            AttributeKey::i64("count").get(&span.attributes),
            Some(&AttributeValue::I64(3))
        );
    }

    #[test]
    fn test_modified_record_overrides_only_given_fields() {
        let original = create_test_span().into_shared();

        let mut attributes = original.attributes().clone();
        attributes.remove("count");

        let modified = ModifiedRecord::new(Arc::clone(&original))
            .with_name("ColdStart")
            .with_attributes(attributes);

        assert_eq!(modified.name(), "ColdStart");
        assert!(!modified.attributes().contains_key("count"));
        assert_eq!(modified.events(), original.events());
        assert_eq!(modified.end_time_unix_nano(), 200);
        assert_eq!(modified.span_id(), "span_1");

        // Original untouched
        assert!(Arc::ptr_eq(modified.original(), &original));
        assert_eq!(original.name(), "AppStart");
        assert!(original.attributes().contains_key("count"));
    }

    #[test]
    fn test_encoded_batch_byte_size() {
        let batch = EncodedBatch::new(vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.byte_size(), 5);
        assert!(EncodedBatch::default().is_empty());
    }

    #[test]
    fn test_attribute_value_display() {
        assert_eq!(AttributeValue::from("x").to_string(), "x");
        assert_eq!(AttributeValue::from(42i64).to_string(), "42");
        assert_eq!(AttributeValue::from(true).to_string(), "true");
    }
}
