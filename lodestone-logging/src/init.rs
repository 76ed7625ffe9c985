use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::layer::RelayLayer;
use crate::sinks::LogSink;

fn env_filter(log_level: Option<&str>) -> EnvFilter {
    log_level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(Some(log_level)))
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize tracing for worker processes.
///
/// Nothing is written to the process streams: stdout carries the protocol,
/// so every event, including those from the `log` crate, goes to `sink`.
pub fn init_worker_tracing(sink: Arc<dyn LogSink>, log_level: Option<&str>) -> Result<()> {
    if tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(RelayLayer::new(sink))
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}
