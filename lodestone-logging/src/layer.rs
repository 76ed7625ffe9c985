//! Tracing layer turning events into log records

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::layer::{Context, Layer};

use crate::record::{LogLevel, LogRecord};
use crate::sinks::LogSink;

/// Hands every event seen by the subscriber to a [`LogSink`] as a fully
/// formatted [`LogRecord`].
///
/// Events bridged from the `log` crate keep the target of the original
/// `log` record.
pub struct RelayLayer {
    sink: Arc<dyn LogSink>,
}

impl RelayLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(
            LogLevel::from(metadata.level()),
            metadata.target(),
            visitor.message,
        );
        record.fields = visitor.fields;
        self.sink.log(record);
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<String, JsonValue>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: JsonValue) {
        match field.name() {
            "message" => {
                self.message = match value {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                }
            }
            // metadata of bridged `log` records
            name if name.starts_with("log.") => {}
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, JsonValue::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, JsonValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, JsonValue::from(value));
    }
}
