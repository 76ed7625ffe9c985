//! Logging infrastructure for Lodestone
//!
//! Worker processes turn every tracing event and every line written to the
//! redirected standard streams into a [`LogRecord`] and hand it to a
//! [`LogSink`]. The controller re-emits relayed records through the `log`
//! facade with [`FacadeSink`], keeping the target they were logged under.

pub mod init;
pub mod layer;
pub mod record;
pub mod redirect;
pub mod sinks;

pub use init::{init_simple_tracing, init_worker_tracing};
pub use layer::RelayLayer;
pub use record::{LogLevel, LogRecord};
pub use redirect::{RedirectedStream, StreamRedirect, STDERR_TARGET, STDOUT_TARGET};
pub use sinks::{
    DayRotatingFileSink, FacadeSink, LogSink, MemorySink, RotationClock, SinkSlot, SystemClock,
    TeeSink,
};
