//! Worker process runtime
//!
//! The worker reads submissions from stdin and writes frames to stdout. All
//! outgoing frames, including log records and monitor updates, go through
//! one queue drained by a single writer task, so their order on the wire is
//! the order they were produced in.
//!
//! Any error in the run loop ends the process through one teardown path:
//! the error is logged, the run log is closed, both relay sentinels are
//! pushed and the writer is flushed before the process exits with status 1.

use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use lodestone_ipc::{
    CoordinatorMessage, Frame, FrameReader, FrameWriter, IpcError, SignalBlock, SignalSlot,
    TaskSubmission, WorkerMessage,
};
use lodestone_logging::{
    init_worker_tracing, DayRotatingFileSink, LogLevel, LogRecord, LogSink, RedirectedStream,
    SinkSlot, StreamRedirect, TeeSink,
};
use lodestone_tasks::TaskRegistry;

use crate::error::WorkerError;
use crate::monitor::Spy;
use crate::relay::OutboundSink;

const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Worker mode flags, appended by the engine to the worker command line
#[derive(Args, Debug, Clone, Default)]
pub struct WorkerArgs {
    /// Control signal file shared with the controller
    #[arg(long, value_name = "PATH", hide = true)]
    pub signals: Option<PathBuf>,

    /// Pipe poll interval in milliseconds
    #[arg(long, value_name = "MS", hide = true)]
    pub poll_interval_ms: Option<u64>,

    /// Process-wide worker log file
    #[arg(long, value_name = "PATH", hide = true)]
    pub worker_log_file: Option<PathBuf>,
}

impl WorkerArgs {
    pub fn into_options(self, log_level: Option<String>) -> Option<WorkerOptions> {
        Some(WorkerOptions {
            signals: self.signals?,
            log_level,
            log_file: self.worker_log_file,
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub signals: PathBuf,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub poll_interval: Duration,
}

/// Run the worker until the controller asks it to stop or closes the pipe.
///
/// Returns the process exit status.
pub async fn worker_main(options: WorkerOptions, registry: TaskRegistry) -> i32 {
    let (outbound, queue) = mpsc::unbounded_channel();
    let writer = tokio::spawn(drain_outbound(queue, FrameWriter::marked(tokio::io::stdout())));

    let run_log = Arc::new(SinkSlot::new());
    let mut tee = TeeSink::new().with_sink(Arc::new(OutboundSink::new(outbound.clone())));
    let mut startup_warning = None;
    let process_log = match &options.log_file {
        Some(path) => match DayRotatingFileSink::new(path) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                startup_warning = Some(format!("Failed to open {}: {}", path.display(), e));
                None
            }
        },
        None => None,
    };
    if let Some(sink) = &process_log {
        tee = tee.with_sink(sink.clone());
    }
    let sink: Arc<dyn LogSink> = Arc::new(tee.with_sink(run_log.clone()));

    if let Err(e) = init_worker_tracing(sink.clone(), options.log_level.as_deref()) {
        sink.log(LogRecord::new(
            LogLevel::Warn,
            "lodestone::worker",
            format!("Failed to initialize logging: {}", e),
        ));
    }
    if let Some(warning) = startup_warning {
        warn!("{}", warning);
    }

    let redirect = StreamRedirect::new(sink.clone());
    info!("Process running");

    let mut worker = Worker {
        registry,
        outbound: outbound.clone(),
        run_log,
        current_run_log: None,
        stdout: redirect.stdout(),
        poll_interval: options.poll_interval,
        signals: None,
    };
    let outcome = match SignalBlock::open(&options.signals) {
        Ok(block) => {
            worker.signals = Some(Arc::new(block));
            worker.run().await
        }
        Err(e) => Err(e.into()),
    };

    let status = match outcome {
        Ok(()) => 0,
        Err(e) => {
            error!("Error occurred during processing: {}", e);
            1
        }
    };

    info!("Process shutting down");
    drop(redirect);
    worker.close_run_log();
    if let Some(process_log) = process_log {
        process_log.close();
    }
    let _ = outbound.send(CoordinatorMessage::MonitorClosed);
    let _ = outbound.send(CoordinatorMessage::LogClosed);
    drop(worker);
    drop(outbound);
    if let Err(e) = writer.await {
        eprintln!("Worker writer failed: {}", e);
    }
    status
}

/// Write queued messages until the log sentinel has been written
async fn drain_outbound<W>(
    mut queue: mpsc::UnboundedReceiver<CoordinatorMessage>,
    mut writer: FrameWriter<W>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        let last = matches!(message, CoordinatorMessage::LogClosed);
        if writer.send(message).await.is_err() {
            // Nobody reads our stdout anymore; logging would only queue more
            break;
        }
        if last {
            break;
        }
    }
    let _ = writer.close().await;
}

struct Worker {
    registry: TaskRegistry,
    signals: Option<Arc<SignalBlock>>,
    outbound: mpsc::UnboundedSender<CoordinatorMessage>,
    run_log: Arc<SinkSlot>,
    current_run_log: Option<Arc<DayRotatingFileSink>>,
    stdout: RedirectedStream,
    poll_interval: Duration,
}

impl Worker {
    async fn run(&mut self) -> Result<(), WorkerError> {
        let signals = self
            .signals
            .clone()
            .ok_or_else(|| IpcError::SignalBlock("signal block not mapped".to_string()))?;
        let mut reader = FrameReader::new(tokio::io::stdin());

        while !signals.is_set(SignalSlot::ProcessStop) {
            let frame =
                match tokio::time::timeout(self.poll_interval, reader.next_frame::<WorkerMessage>())
                    .await
                {
                    Err(_) => continue,
                    Ok(frame) => frame?,
                };

            match frame {
                None => {
                    info!("Controller closed the pipe");
                    break;
                }
                Some(Frame::Message(WorkerMessage::Submit(submission))) => {
                    self.send(CoordinatorMessage::Ack)?;
                    let (success, errors) = self.execute(submission, &signals).await?;
                    self.send(CoordinatorMessage::TaskResult { success, errors })?;
                }
                Some(Frame::Stray(line)) => warn!("Ignoring unexpected input: {}", line),
            }
        }

        Ok(())
    }

    fn send(&self, message: CoordinatorMessage) -> Result<(), WorkerError> {
        self.outbound
            .send(message)
            .map_err(|_| WorkerError::Ipc(IpcError::ConnectionClosed))
    }

    async fn execute(
        &mut self,
        submission: TaskSubmission,
        signals: &Arc<SignalBlock>,
    ) -> Result<(bool, BTreeMap<String, String>), WorkerError> {
        let TaskSubmission {
            name,
            config,
            build_deps,
            runtime_deps,
            observed_entries,
            initial_values,
            run_checks,
        } = submission;

        let mut root = self
            .registry
            .rebuild(&config, &build_deps)
            .map_err(WorkerError::Rebuild)?;
        root.seed(initial_values);
        root.attach_runtime(runtime_deps);
        info!("Task built");

        let mut spy = if observed_entries.is_empty() {
            None
        } else {
            Some(Spy::attach(root.database(), observed_entries, self.outbound.clone()))
        };

        self.open_run_log(root.default_path(), &name);
        root.attach_signals(signals.control_signals());
        root.set_stdout(Box::new(self.stdout.clone()));

        let outcome = tokio::task::spawn_blocking(move || {
            if run_checks {
                let (ok, errors) = root.check();
                if !ok {
                    debug!("Some checks failed:\n{}", format_errors(&errors));
                    return (false, errors);
                }
                info!("Check successful");
            } else {
                info!("Checks skipped");
            }
            root.perform()
        })
        .await
        .map_err(|e| WorkerError::TaskThread(e.to_string()))?;

        if let Some(spy) = spy.as_mut() {
            spy.close();
        }
        Ok(outcome)
    }

    /// Route records to `<default_path>/<name>.log` until the next run
    fn open_run_log(&mut self, default_path: &Path, name: &str) {
        self.close_run_log();
        if !default_path.is_dir() {
            warn!(
                "No run log for '{}': {} is not a directory",
                name,
                default_path.display()
            );
            return;
        }

        let path = default_path.join(format!("{}.log", name));
        match DayRotatingFileSink::new(&path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                self.run_log.replace(Some(sink.clone() as Arc<dyn LogSink>));
                self.current_run_log = Some(sink);
            }
            Err(e) => warn!("Failed to open run log {}: {}", path.display(), e),
        }
    }

    fn close_run_log(&mut self) {
        self.run_log.replace(None);
        if let Some(sink) = self.current_run_log.take() {
            sink.close();
        }
    }
}

fn format_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(path, message)| format!("- {}: {}", path, message))
        .collect::<Vec<_>>()
        .join("\n")
}
