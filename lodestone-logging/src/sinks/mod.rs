//! Log record destinations

mod rotating;

pub use rotating::{DayRotatingFileSink, RotationClock, SystemClock};

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::record::LogRecord;

/// Trait for log output destinations
pub trait LogSink: Send + Sync {
    /// Write a log record
    fn log(&self, record: LogRecord);

    /// Flush any buffered records
    fn flush(&self);
}

/// Re-emits records through the `log` facade under their original target.
///
/// This is how the controller injects relayed worker records into its own
/// logging, so filters configured for a worker module apply unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, record: LogRecord) {
        let level = record.level.to_log_level();
        if level > log::max_level() {
            return;
        }
        let message = record.display_message();
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(&record.target)
                .build(),
        );
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Forwards every record to each of its sinks in turn
#[derive(Default, Clone)]
pub struct TeeSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl LogSink for TeeSink {
    fn log(&self, record: LogRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.log(record.clone());
            }
            last.log(record);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// A sink that can be swapped while records are flowing.
///
/// The worker keeps one slot for the per-run log file; it is filled when a
/// run starts and emptied when it ends.
#[derive(Default)]
pub struct SinkSlot {
    inner: RwLock<Option<Arc<dyn LogSink>>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new sink, returning the previous one
    pub fn replace(&self, sink: Option<Arc<dyn LogSink>>) -> Option<Arc<dyn LogSink>> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, sink)
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl LogSink for SinkSlot {
    fn log(&self, record: LogRecord) {
        let sink = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.log(record);
        }
    }

    fn flush(&self) {
        let sink = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.flush();
        }
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogLevel;

    #[test]
    fn test_tee_forwards_to_every_sink() {
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let tee = TeeSink::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        tee.log(LogRecord::new(LogLevel::Info, "t", "one"));
        tee.log(LogRecord::new(LogLevel::Warn, "t", "two"));

        assert_eq!(first.messages(), vec!["one", "two"]);
        assert_eq!(second.messages(), vec!["one", "two"]);
    }

    #[test]
    fn test_slot_swaps_destination() {
        let slot = SinkSlot::new();
        slot.log(LogRecord::new(LogLevel::Info, "t", "dropped"));
        assert!(slot.is_empty());

        let run = Arc::new(MemorySink::new());
        assert!(slot.replace(Some(run.clone())).is_none());
        slot.log(LogRecord::new(LogLevel::Info, "t", "kept"));

        let previous = slot.replace(None);
        assert!(previous.is_some());
        slot.log(LogRecord::new(LogLevel::Info, "t", "dropped again"));

        assert_eq!(run.messages(), vec!["kept"]);
    }
}
