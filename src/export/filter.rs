// src/export/filter.rs
//! Span filtering and attribute rewriting
//!
//! Rules run in a fixed order for every span:
//!
//! 1. name rejection predicates
//! 2. exception event normalization (always on)
//! 3. attribute value rejection predicates
//! 4. attribute removal and replacement, in registration order
//!
//! Spans are never mutated. A span that any step changes is replaced by a
//! [`ModifiedRecord`] over the previous view; untouched spans pass through
//! as the same `Arc`.

use crate::export::record::{
    AttributeKey, AttributeValue, Attributes, ModifiedRecord, SharedSpan, SpanEvent,
};
use crate::export::SpanExporter;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::trace;

pub const EXCEPTION_EVENT_NAME: &str = "exception";
pub const EXCEPTION_TYPE: &str = "exception.type";
pub const EXCEPTION_MESSAGE: &str = "exception.message";
pub const EXCEPTION_STACKTRACE: &str = "exception.stacktrace";

type NamePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;
type ValuePredicate = Box<dyn Fn(&AttributeValue) -> bool + Send + Sync>;
type ValueReplacer = Box<dyn Fn(&AttributeValue) -> Option<AttributeValue> + Send + Sync>;

/// Builder for [`SpanFilter`]
#[derive(Default)]
pub struct SpanFilterBuilder {
    name_rejections: Vec<NamePredicate>,
    attribute_rejections: Vec<(AttributeKey, ValuePredicate)>,
    attribute_rewrites: Vec<(AttributeKey, ValueReplacer)>,
}

impl SpanFilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop spans whose name matches `predicate`
    pub fn reject_spans_by_name<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.name_rejections.push(Box::new(predicate));
        self
    }

    /// Drop spans whose `key` attribute matches `predicate`
    pub fn reject_spans_by_attribute_value<F>(mut self, key: AttributeKey, predicate: F) -> Self
    where
        F: Fn(&AttributeValue) -> bool + Send + Sync + 'static,
    {
        self.attribute_rejections.push((key, Box::new(predicate)));
        self
    }

    /// Remove the `key` attribute whenever its value matches `predicate`
    pub fn remove_span_attribute<F>(self, key: AttributeKey, predicate: F) -> Self
    where
        F: Fn(&AttributeValue) -> bool + Send + Sync + 'static,
    {
        self.replace_span_attribute(key, move |value| {
            if predicate(value) {
                None
            } else {
                Some(value.clone())
            }
        })
    }

    /// Rewrite the `key` attribute; returning `None` removes it
    pub fn replace_span_attribute<F>(mut self, key: AttributeKey, replacer: F) -> Self
    where
        F: Fn(&AttributeValue) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        self.attribute_rewrites.push((key, Box::new(replacer)));
        self
    }

    pub fn build(self) -> SpanFilter {
        SpanFilter {
            name_rejections: self.name_rejections,
            attribute_rejections: self.attribute_rejections,
            attribute_rewrites: self.attribute_rewrites,
        }
    }
}

/// Ordered rejection and rewrite rules
#[derive(Default)]
pub struct SpanFilter {
    name_rejections: Vec<NamePredicate>,
    attribute_rejections: Vec<(AttributeKey, ValuePredicate)>,
    attribute_rewrites: Vec<(AttributeKey, ValueReplacer)>,
}

impl SpanFilter {
    pub fn builder() -> SpanFilterBuilder {
        SpanFilterBuilder::new()
    }

    /// Filter a batch, preserving order
    pub fn apply(&self, spans: Vec<SharedSpan>) -> Vec<SharedSpan> {
        spans
            .into_iter()
            .filter_map(|span| self.filter_span(span))
            .collect()
    }

    /// `None` if the span is rejected
    pub fn filter_span(&self, span: SharedSpan) -> Option<SharedSpan> {
        if self.name_rejections.iter().any(|reject| reject(span.name())) {
            trace!("Rejected span {} by name", span.name());
            return None;
        }

        let span = normalize_exception_events(span);

        let rejected = self.attribute_rejections.iter().any(|(key, reject)| {
            key.get(span.attributes()).map_or(false, |value| reject(value))
        });
        if rejected {
            trace!("Rejected span {} by attribute value", span.name());
            return None;
        }

        Some(self.rewrite_attributes(span))
    }

    fn rewrite_attributes(&self, span: SharedSpan) -> SharedSpan {
        if self.attribute_rewrites.is_empty() {
            return span;
        }

        let mut attributes: Option<Attributes> = None;

        for (key, replace) in &self.attribute_rewrites {
            let current = attributes.as_ref().unwrap_or_else(|| span.attributes());
            let Some(value) = key.get(current) else {
                continue;
            };

            let replacement = replace(value);
            if replacement.as_ref() == Some(value) {
                continue;
            }

            let updated = attributes.get_or_insert_with(|| span.attributes().clone());
            match replacement {
                Some(new_value) => {
                    updated.insert(key.name.clone(), new_value);
                }
                None => {
                    updated.remove(&key.name);
                }
            }
        }

        match attributes {
            Some(attributes) => ModifiedRecord::new(span)
                .with_attributes(attributes)
                .into_shared(),
            None => span,
        }
    }
}

/// Move exception events onto span attributes
///
/// The wire encoding cannot carry per-event attributes, so each exception
/// event is removed and its type, message and stacktrace copied to the
/// span. The type is shortened to its simple name. Spans without exception
/// events are returned as-is.
pub fn normalize_exception_events(span: SharedSpan) -> SharedSpan {
    if !span
        .events()
        .iter()
        .any(|event| event.name == EXCEPTION_EVENT_NAME)
    {
        return span;
    }

    let mut attributes = span.attributes().clone();
    let mut events: Vec<SpanEvent> = Vec::with_capacity(span.events().len());

    for event in span.events() {
        if event.name != EXCEPTION_EVENT_NAME {
            events.push(event.clone());
            continue;
        }

        if let Some(value) = event.attributes.get(EXCEPTION_TYPE) {
            let full_name = value.to_string();
            let simple_name = full_name.rsplit('.').next().unwrap_or(&full_name);
            attributes.insert(EXCEPTION_TYPE.to_string(), simple_name.into());
        }
        for key in [EXCEPTION_MESSAGE, EXCEPTION_STACKTRACE] {
            if let Some(value) = event.attributes.get(key) {
                attributes.insert(key.to_string(), value.clone());
            }
        }
    }

    ModifiedRecord::new(span)
        .with_attributes(attributes)
        .with_events(events)
        .into_shared()
}

/// Exporter that applies a [`SpanFilter`] before delegating
pub struct FilteringExporter<E> {
    filter: Arc<SpanFilter>,
    delegate: E,
}

impl<E: SpanExporter> FilteringExporter<E> {
    pub fn new(filter: impl Into<Arc<SpanFilter>>, delegate: E) -> Self {
        Self {
            filter: filter.into(),
            delegate,
        }
    }

    pub fn delegate(&self) -> &E {
        &self.delegate
    }
}

impl<E: SpanExporter> SpanExporter for FilteringExporter<E> {
    fn export(&mut self, spans: Vec<SharedSpan>) -> Result<()> {
        let filtered = self.filter.apply(spans);
        if filtered.is_empty() {
            return Ok(());
        }
        self.delegate.export(filtered)
    }

    fn flush(&mut self) -> Result<()> {
        self.delegate.flush()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.delegate.shutdown()
    }
}
