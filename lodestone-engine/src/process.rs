//! Handle on a running worker process
//!
//! Everything the worker writes to stdout is read by a single demultiplexing
//! task that routes frames by [`Relay`]: the submit/acknowledge/result
//! exchange goes to the engine, log records and monitor updates to their
//! relay consumers. Lines that are not frames and every stderr line are
//! relayed as log records.

use futures::future::join_all;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lodestone_config::EngineConfig;
use lodestone_ipc::{
    CoordinatorMessage, Frame, FrameReader, FrameWriter, IpcError, Relay, SignalBlock, SignalSlot,
    WorkerMessage,
};
use lodestone_logging::{LogLevel, LogRecord, LogSink};

use crate::error::EngineError;
use crate::monitor::{spawn_monitor_relay, ObserverSlot};
use crate::relay::{spawn_log_relay, WORKER_STDERR_TARGET, WORKER_STDOUT_TARGET};

/// How long teardown waits for the relays to reach the end of their streams
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type Response = Result<CoordinatorMessage, IpcError>;

/// Command line a worker process is started with
pub(crate) struct WorkerCommand<'a> {
    pub config: &'a EngineConfig,
    pub log_level: Option<&'a str>,
}

impl WorkerCommand<'_> {
    fn build(&self, signals: &Path) -> Result<Command, EngineError> {
        let program = match &self.config.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(EngineError::Spawn)?,
        };

        let mut command = Command::new(program);
        command
            .args(&self.config.worker_args)
            .arg("--signals")
            .arg(signals)
            .arg("--poll-interval-ms")
            .arg(self.config.poll_interval.as_millis().to_string());
        if let Some(level) = self.log_level {
            command.arg("--log-level").arg(level);
        }
        if let Some(log_file) = &self.config.worker_log_file {
            command.arg("--worker-log-file").arg(log_file);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

pub(crate) struct WorkerProcess {
    id: Uuid,
    child: Child,
    writer: FrameWriter<ChildStdin>,
    responses: mpsc::UnboundedReceiver<Response>,
    signals: Arc<SignalBlock>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerProcess {
    /// Start a worker with fresh control signals, along with its log and
    /// monitor relays
    pub(crate) fn spawn(
        command: WorkerCommand<'_>,
        log_sink: Arc<dyn LogSink>,
        observers: Arc<ObserverSlot>,
    ) -> Result<Self, EngineError> {
        let signals = Arc::new(SignalBlock::create()?);
        let signals_path = signals
            .path()
            .ok_or_else(|| IpcError::SignalBlock("signal block has no backing file".to_string()))?;

        let mut child = command.build(signals_path)?.spawn().map_err(EngineError::Spawn)?;
        let id = Uuid::new_v4();
        info!("Started worker {} (pid {:?})", id, child.id());

        let stdin = child.stdin.take().ok_or_else(|| missing_stream("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_stream("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_stream("stderr"))?;

        let (response_tx, responses) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (monitor_tx, monitor_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(demultiplex(stdout, response_tx, log_tx.clone(), monitor_tx)),
            tokio::spawn(relay_stderr(stderr, log_tx)),
            spawn_log_relay(log_rx, log_sink),
            spawn_monitor_relay(monitor_rx, observers),
        ];

        Ok(Self {
            id,
            child,
            writer: FrameWriter::new(stdin),
            responses,
            signals,
            tasks,
        })
    }

    pub(crate) fn signals(&self) -> &Arc<SignalBlock> {
        &self.signals
    }

    pub(crate) fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub(crate) async fn send(&mut self, message: WorkerMessage) -> Result<(), IpcError> {
        self.writer.send(message).await
    }

    /// Next exchange message, or `None` once the worker stdout has closed.
    ///
    /// Cancel safe.
    pub(crate) async fn next_response(&mut self) -> Option<Response> {
        self.responses.recv().await
    }

    /// Kill the process without giving it a chance to clean up
    pub(crate) async fn kill(mut self) {
        debug!("Killing worker {}", self.id);
        if let Err(e) = self.child.kill().await {
            // Already exited and reaped
            debug!("Could not kill worker {}: {}", self.id, e);
        }
        self.drain_relays().await;
    }

    /// Ask the process to leave its run loop, killing it after `grace`
    pub(crate) async fn shutdown(mut self, grace: Duration) {
        debug!("Stopping worker {}", self.id);
        self.signals.set(SignalSlot::ProcessStop);
        if let Err(e) = self.writer.close().await {
            debug!("Worker {} pipe already closed: {}", self.id, e);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Worker {} exited with {}", self.id, status),
            Ok(Err(e)) => warn!("Failed to wait for worker {}: {}", self.id, e),
            Err(_) => {
                warn!("Worker {} did not exit within {:?}, killing it", self.id, grace);
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill worker {}: {}", self.id, e);
                }
            }
        }
        self.drain_relays().await;
    }

    /// Wait for the relays to reach their sentinels or the end of the
    /// streams; a descendant still holding the pipes open gets them aborted
    async fn drain_relays(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, join_all(tasks))
            .await
            .is_err()
        {
            warn!("Relays of worker {} did not drain, aborting them", self.id);
            for abort in aborts {
                abort.abort();
            }
        }
        debug!("Worker {} relays joined", self.id);
    }
}

fn missing_stream(name: &str) -> EngineError {
    EngineError::Spawn(std::io::Error::other(format!("worker {} is not piped", name)))
}

/// Route every stdout line of the worker to its consumer
async fn demultiplex(
    stdout: ChildStdout,
    responses: mpsc::UnboundedSender<Response>,
    logs: mpsc::UnboundedSender<CoordinatorMessage>,
    monitor: mpsc::UnboundedSender<CoordinatorMessage>,
) {
    let mut reader = FrameReader::marked(stdout);
    loop {
        match reader.next_frame::<CoordinatorMessage>().await {
            Ok(None) => break,
            Ok(Some(Frame::Stray(line))) => {
                let _ = logs.send(CoordinatorMessage::Log(LogRecord::new(
                    LogLevel::Info,
                    WORKER_STDOUT_TARGET,
                    line,
                )));
            }
            Ok(Some(Frame::Message(message))) => {
                let delivered = match message.relay() {
                    Relay::Pipe => responses.send(Ok(message)).is_ok(),
                    Relay::Log => logs.send(message).is_ok(),
                    Relay::Monitor => monitor.send(message).is_ok(),
                };
                if !delivered {
                    debug!("Dropped worker message, its consumer has stopped");
                }
            }
            Err(e) => {
                warn!("Unreadable output from worker: {}", e);
                let _ = responses.send(Err(e));
                break;
            }
        }
    }
}

async fn relay_stderr(stderr: ChildStderr, logs: mpsc::UnboundedSender<CoordinatorMessage>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let _ = logs.send(CoordinatorMessage::Log(LogRecord::new(
            LogLevel::Critical,
            WORKER_STDERR_TARGET,
            line,
        )));
    }
}
