//! Log relay between the worker and the controller
//!
//! In the worker every record is pushed onto the outbound frame queue by an
//! [`OutboundSink`]. In the controller a consumer task hands relayed records
//! to a [`LogSink`] until the worker announces that no more will follow.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lodestone_ipc::CoordinatorMessage;
use lodestone_logging::{LogRecord, LogSink};

/// Target of records made from worker stdout lines that are not frames
pub const WORKER_STDOUT_TARGET: &str = "lodestone::worker::stdout";
/// Target of records made from worker stderr lines
pub const WORKER_STDERR_TARGET: &str = "lodestone::worker::stderr";

/// Worker side: turns records into frames for the controller
pub struct OutboundSink {
    outbound: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl OutboundSink {
    pub fn new(outbound: mpsc::UnboundedSender<CoordinatorMessage>) -> Self {
        Self { outbound }
    }
}

impl LogSink for OutboundSink {
    fn log(&self, record: LogRecord) {
        // The writer is gone once the process is shutting down
        let _ = self.outbound.send(CoordinatorMessage::Log(record));
    }

    fn flush(&self) {}
}

/// Controller side: drain relayed records into `sink`.
///
/// Ends on [`CoordinatorMessage::LogClosed`] or when every sender is gone.
pub fn spawn_log_relay(
    mut records: mpsc::UnboundedReceiver<CoordinatorMessage>,
    sink: Arc<dyn LogSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = records.recv().await {
            match message {
                CoordinatorMessage::Log(record) => sink.log(record),
                CoordinatorMessage::LogClosed => {
                    debug!("Log relay closed by worker");
                    break;
                }
                other => warn!("Unexpected message on log relay: {:?}", other),
            }
        }
        sink.flush();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_logging::{LogLevel, MemorySink};

    #[tokio::test]
    async fn test_relay_stops_at_sentinel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(MemorySink::new());
        let relay = spawn_log_relay(rx, sink.clone());

        let outbound = OutboundSink::new(tx.clone());
        outbound.log(LogRecord::new(LogLevel::Info, "lodestone::tasks", "Task built"));
        outbound.log(LogRecord::new(LogLevel::Warn, "lodestone::tasks", "Slow instrument"));
        tx.send(CoordinatorMessage::LogClosed).unwrap();
        tx.send(CoordinatorMessage::Log(LogRecord::new(
            LogLevel::Info,
            "lodestone::tasks",
            "after close",
        )))
        .unwrap();

        relay.await.unwrap();
        assert_eq!(sink.messages(), vec!["Task built", "Slow instrument"]);
    }

    #[tokio::test]
    async fn test_relay_ends_when_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(MemorySink::new());
        let relay = spawn_log_relay(rx, sink.clone());

        tx.send(CoordinatorMessage::Log(LogRecord::new(
            LogLevel::Critical,
            WORKER_STDERR_TARGET,
            "segfault",
        )))
        .unwrap();
        drop(tx);

        relay.await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Critical);
        assert_eq!(records[0].target, WORKER_STDERR_TARGET);
    }
}
