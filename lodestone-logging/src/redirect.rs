//! Scoped redirection of standard output and error into log records

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::record::{LogLevel, LogRecord};
use crate::sinks::LogSink;

/// Target of records produced from redirected standard output
pub const STDOUT_TARGET: &str = "lodestone::stdout";
/// Target of records produced from redirected standard error
pub const STDERR_TARGET: &str = "lodestone::stderr";

struct StreamInner {
    sink: Arc<dyn LogSink>,
    level: LogLevel,
    target: &'static str,
    pending: Mutex<String>,
}

impl StreamInner {
    fn emit(&self, line: &str) {
        let line = line.trim_end();
        if !line.is_empty() {
            self.sink
                .log(LogRecord::new(self.level, self.target, line.to_string()));
        }
    }

    fn push(&self, text: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push_str(text);
        while let Some(pos) = pending.find('\n') {
            let line: String = pending.drain(..=pos).collect();
            self.emit(&line);
        }
    }

    fn flush_pending(&self) {
        let rest = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        self.emit(&rest);
    }
}

/// A writable stream whose complete lines become log records
#[derive(Clone)]
pub struct RedirectedStream {
    inner: Arc<StreamInner>,
}

impl Write for RedirectedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.push(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush_pending();
        Ok(())
    }
}

/// Standard stream replacements for code running in a worker.
///
/// Output written to [`StreamRedirect::stdout`] is logged at info level and
/// output written to [`StreamRedirect::stderr`] at critical level. Partial
/// lines still buffered are logged when the redirect is dropped.
pub struct StreamRedirect {
    stdout: RedirectedStream,
    stderr: RedirectedStream,
}

impl StreamRedirect {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        let stream = |level: LogLevel, target: &'static str| RedirectedStream {
            inner: Arc::new(StreamInner {
                sink: sink.clone(),
                level,
                target,
                pending: Mutex::new(String::new()),
            }),
        };
        Self {
            stdout: stream(LogLevel::Info, STDOUT_TARGET),
            stderr: stream(LogLevel::Critical, STDERR_TARGET),
        }
    }

    pub fn stdout(&self) -> RedirectedStream {
        self.stdout.clone()
    }

    pub fn stderr(&self) -> RedirectedStream {
        self.stderr.clone()
    }
}

impl Drop for StreamRedirect {
    fn drop(&mut self) {
        self.stdout.inner.flush_pending();
        self.stderr.inner.flush_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;

    #[test]
    fn test_lines_become_records() {
        let sink = Arc::new(MemorySink::new());
        let redirect = StreamRedirect::new(sink.clone());

        let mut out = redirect.stdout();
        write!(out, "voltage=").unwrap();
        writeln!(out, "1.5").unwrap();
        writeln!(out, "\nsecond").unwrap();

        let mut err = redirect.stderr();
        writeln!(err, "instrument timeout").unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "voltage=1.5");
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[0].target, STDOUT_TARGET);
        assert_eq!(records[1].message, "second");
        assert_eq!(records[2].level, LogLevel::Critical);
        assert_eq!(records[2].target, STDERR_TARGET);
    }

    #[test]
    fn test_drop_flushes_partial_line() {
        let sink = Arc::new(MemorySink::new());
        {
            let redirect = StreamRedirect::new(sink.clone());
            let mut out = redirect.stdout();
            write!(out, "no newline").unwrap();
            assert!(sink.records().is_empty());
        }
        assert_eq!(sink.messages(), vec!["no newline"]);
    }
}
