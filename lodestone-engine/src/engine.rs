//! Controller side state machine
//!
//! A [`ProcessEngine`] owns at most one worker process. `perform` holds the
//! worker for the whole exchange; pause, resume and stop only touch the
//! shared control signals, so they can be called while a run is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lodestone_config::EngineConfig;
use lodestone_core::{EngineFailure, ExecutionDescriptor, ExecutionResult};
use lodestone_ipc::{CoordinatorMessage, SignalBlock, SignalSlot, TaskSubmission, WorkerMessage};
use lodestone_logging::{FacadeSink, LogSink};

use crate::error::EngineError;
use crate::monitor::{MonitorObserver, ObserverSlot};
use crate::process::{WorkerCommand, WorkerProcess};
use crate::state::EngineState;

/// Runs task trees in a worker process, one at a time
pub struct ProcessEngine {
    config: EngineConfig,
    worker_level: Option<String>,
    state: Arc<watch::Sender<EngineState>>,
    force_stop: watch::Sender<bool>,
    /// Cooperative stop asked for before the run's signals were published
    stop_requested: AtomicBool,
    worker: Mutex<Option<WorkerProcess>>,
    /// Signals of the current worker, reachable without the worker lock
    signals: RwLock<Option<Arc<SignalBlock>>>,
    log_sink: Arc<dyn LogSink>,
    observers: Arc<ObserverSlot>,
    watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (state, _) = watch::channel(EngineState::Stopped);
        let (force_stop, _) = watch::channel(false);
        Self {
            config,
            worker_level: None,
            state: Arc::new(state),
            force_stop,
            stop_requested: AtomicBool::new(false),
            worker: Mutex::new(None),
            signals: RwLock::new(None),
            log_sink: Arc::new(FacadeSink),
            observers: Arc::new(ObserverSlot::default()),
            watcher: StdMutex::new(None),
        }
    }

    /// Where relayed worker records go; takes effect for the next worker
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Log filter passed to the worker on its command line
    pub fn with_worker_level(mut self, level: impl Into<String>) -> Self {
        self.worker_level = Some(level.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Select the component receiving monitor updates, or detach it
    pub fn attach_monitor(&self, observer: Option<Arc<dyn MonitorObserver>>) {
        self.observers.set(observer);
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Execute one task tree in the worker.
    ///
    /// Failures of the worker or of the exchange are reported in the result
    /// under the `engine` key. Only a call made while another run is in
    /// flight is an error.
    pub async fn perform(
        &self,
        descriptor: &ExecutionDescriptor,
    ) -> Result<ExecutionResult, EngineError> {
        // Stop requests are reset before anyone can observe `Running`
        let mut force = None;
        self.state.send_if_modified(|state| {
            if !state.is_idle() {
                return false;
            }
            self.force_stop.send_replace(false);
            self.stop_requested.store(false, Ordering::SeqCst);
            if let Some(signals) = self.current_signals() {
                signals.clear_all();
            }
            force = Some(self.force_stop.subscribe());
            *state = EngineState::Running;
            true
        });
        let Some(force) = force else {
            return Err(EngineError::InvalidState(format!(
                "cannot perform while {}",
                self.state()
            )));
        };
        info!("Performing execution '{}'", descriptor.id);

        let submission = match TaskSubmission::from_descriptor(descriptor) {
            Ok(submission) => submission,
            Err(e) => {
                error!("Failed to encode execution '{}': {}", descriptor.id, e);
                self.set_state(EngineState::Waiting);
                return Ok(ExecutionResult::engine_failure(EngineFailure::Send));
            }
        };

        let mut slot = self.worker.lock().await;
        let outcome = match self.ensure_worker(&mut slot).await {
            Ok(()) => match slot.as_mut() {
                Some(worker) => self.exchange(worker, submission, force).await,
                None => Err(EngineFailure::Dead),
            },
            Err(e) => {
                error!("Failed to start worker: {}", e);
                Err(EngineFailure::Dead)
            }
        };

        let result = match outcome {
            Ok(result) => {
                debug!(
                    "Execution '{}' finished, success: {}",
                    descriptor.id, result.success
                );
                self.set_state(EngineState::Waiting);
                result
            }
            Err(failure) => self.fail(&mut slot, failure).await,
        };
        self.stop_watcher();
        Ok(result)
    }

    /// Ask the running tree to suspend at its next task boundary
    pub async fn pause(&self) -> Result<(), EngineError> {
        let signals = self
            .current_signals()
            .ok_or_else(|| EngineError::InvalidState("no worker is running".to_string()))?;
        self.transition(EngineState::Running, EngineState::Pausing, "pause")?;

        signals.set(SignalSlot::ShouldPause);
        info!("Pause requested");
        self.start_watcher(
            signals,
            SignalSlot::Paused,
            EngineState::Pausing,
            EngineState::Paused,
        );
        Ok(())
    }

    /// Withdraw the pause request; the worker acknowledges through `resumed`
    pub async fn resume(&self) -> Result<(), EngineError> {
        let signals = self
            .current_signals()
            .ok_or_else(|| EngineError::InvalidState("no worker is running".to_string()))?;
        self.transition(EngineState::Paused, EngineState::Resuming, "resume")?;

        signals.clear(SignalSlot::ShouldPause);
        info!("Resume requested");
        self.start_watcher(
            signals,
            SignalSlot::Resumed,
            EngineState::Resuming,
            EngineState::Running,
        );
        Ok(())
    }

    /// Request a cooperative stop, or kill the worker when `force` is set
    pub async fn stop(&self, force: bool) {
        info!("Stop requested (force: {})", force);
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(signals) = self.current_signals() {
            signals.set(SignalSlot::ShouldStop);
        }
        if !force {
            return;
        }

        // A run in flight kills the worker itself and reports `terminated`
        self.force_stop.send_replace(true);
        if self.state().is_idle() {
            if let Ok(mut slot) = self.worker.try_lock() {
                if let Some(worker) = slot.take() {
                    self.publish_signals(None);
                    worker.kill().await;
                    self.set_state(EngineState::Stopped);
                }
            }
        }
    }

    /// Stop the current run, then end the worker process and its relays.
    ///
    /// A cooperative shutdown gives the run and then the process
    /// `shutdown_grace` each before resorting to a kill.
    pub async fn shutdown(&self, force: bool) {
        info!("Shutting down engine");
        self.stop(force).await;
        if let Some(signals) = self.current_signals() {
            signals.set(SignalSlot::ProcessStop);
        }

        let grace = self.config.shutdown_grace;
        let mut slot = match tokio::time::timeout(grace, self.worker.lock()).await {
            Ok(slot) => slot,
            Err(_) => {
                warn!("Run did not stop within {:?}, terminating it", grace);
                self.force_stop.send_replace(true);
                self.worker.lock().await
            }
        };

        self.stop_watcher();
        self.publish_signals(None);
        if let Some(worker) = slot.take() {
            if force {
                worker.kill().await;
            } else {
                worker.shutdown(grace).await;
            }
        }
        self.set_state(EngineState::Stopped);
        info!("Engine stopped");
    }

    /// Reuse the current worker if it is still alive, otherwise start one
    async fn ensure_worker(&self, slot: &mut Option<WorkerProcess>) -> Result<(), EngineError> {
        match slot.as_mut().map(WorkerProcess::is_alive) {
            Some(true) => return Ok(()),
            Some(false) => {
                warn!("Worker exited since the last run, replacing it");
                self.publish_signals(None);
                if let Some(stale) = slot.take() {
                    stale.kill().await;
                }
            }
            None => {}
        }

        let command = WorkerCommand {
            config: &self.config,
            log_level: self.worker_level.as_deref(),
        };
        let worker = WorkerProcess::spawn(command, self.log_sink.clone(), self.observers.clone())?;
        self.publish_signals(Some(worker.signals().clone()));
        *slot = Some(worker);
        Ok(())
    }

    /// Submit, then wait for the acknowledgement and the result
    async fn exchange(
        &self,
        worker: &mut WorkerProcess,
        submission: TaskSubmission,
        mut force: watch::Receiver<bool>,
    ) -> Result<ExecutionResult, EngineFailure> {
        if self.stop_requested.load(Ordering::SeqCst) {
            worker.signals().set(SignalSlot::ShouldStop);
        }

        if let Err(e) = worker.send(WorkerMessage::Submit(submission)).await {
            error!("Failed to submit to worker: {}", e);
            return Err(EngineFailure::Dead);
        }

        match next_response(worker, &mut force).await? {
            CoordinatorMessage::Ack => debug!("Submission acknowledged"),
            other => {
                error!("Expected an acknowledgement, got {:?}", other);
                return Err(EngineFailure::Dead);
            }
        }

        match next_response(worker, &mut force).await? {
            CoordinatorMessage::TaskResult { success, errors } => {
                Ok(ExecutionResult::new(success, errors))
            }
            other => {
                error!("Expected a result, got {:?}", other);
                Err(EngineFailure::Dead)
            }
        }
    }

    /// Tear the worker down and report `failure`
    async fn fail(
        &self,
        slot: &mut Option<WorkerProcess>,
        failure: EngineFailure,
    ) -> ExecutionResult {
        warn!("Execution failed in the engine: {}", failure);
        self.publish_signals(None);
        if let Some(worker) = slot.take() {
            worker.kill().await;
        }
        self.set_state(EngineState::Stopped);
        ExecutionResult::engine_failure(failure)
    }

    fn transition(
        &self,
        from: EngineState,
        to: EngineState,
        operation: &str,
    ) -> Result<(), EngineError> {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "cannot {} while {}",
                operation,
                self.state()
            )))
        }
    }

    fn set_state(&self, state: EngineState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Engine state {} -> {}", previous, state);
        }
    }

    fn current_signals(&self) -> Option<Arc<SignalBlock>> {
        self.signals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish_signals(&self, signals: Option<Arc<SignalBlock>>) {
        *self.signals.write().unwrap_or_else(PoisonError::into_inner) = signals;
    }

    /// Move `from -> to` once the worker sets `ack`; gives up on a stop
    /// request or when something else changed the state first
    fn start_watcher(
        &self,
        signals: Arc<SignalBlock>,
        ack: SignalSlot,
        from: EngineState,
        to: EngineState,
    ) {
        let state = self.state.clone();
        let interval = self.config.pause_poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if signals.is_set(SignalSlot::ShouldStop) || *state.borrow() != from {
                    break;
                }
                if signals.is_set(ack) {
                    state.send_if_modified(|current| {
                        if *current == from {
                            *current = to;
                            true
                        } else {
                            false
                        }
                    });
                    break;
                }
            }
        });

        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_watcher(&self) {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// Next exchange message; a forced stop takes precedence
async fn next_response(
    worker: &mut WorkerProcess,
    force: &mut watch::Receiver<bool>,
) -> Result<CoordinatorMessage, EngineFailure> {
    tokio::select! {
        biased;
        Ok(_) = force.wait_for(|forced| *forced) => {
            warn!("Forced stop, terminating worker");
            Err(EngineFailure::Terminated)
        }
        response = worker.next_response() => match response {
            Some(Ok(message)) => Ok(message),
            Some(Err(e)) => {
                error!("Worker pipe broke: {}", e);
                Err(EngineFailure::Dead)
            }
            None => {
                error!("Worker closed its pipe");
                Err(EngineFailure::Dead)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::{ConfiguredTree, TaskConfig};
    use std::collections::HashMap;

    fn descriptor() -> ExecutionDescriptor {
        let tree = ConfiguredTree::new(TaskConfig::root(std::env::temp_dir()));
        ExecutionDescriptor::new("unit", Arc::new(tree))
    }

    #[tokio::test]
    async fn test_new_engine_is_stopped() {
        let engine = ProcessEngine::new(EngineConfig::default());
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.shutdown(false).await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_pause_and_resume_require_a_run() {
        let engine = ProcessEngine::new(EngineConfig::default());
        assert!(matches!(
            engine.pause().await,
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            engine.resume().await,
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_unencodable_dependency_never_reaches_a_worker() {
        let mut handle: HashMap<(u8, u8), u8> = HashMap::new();
        handle.insert((0, 1), 2);
        let descriptor = descriptor().with_runtime_dep("instrument", handle);

        let engine = ProcessEngine::new(EngineConfig::default());
        let result = engine.perform(&descriptor).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.engine_error(), Some(EngineFailure::Send));
        assert_eq!(engine.state(), EngineState::Waiting);
        assert!(engine.current_signals().is_none());
        assert!(engine.worker.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_force_stop_on_idle_engine_is_harmless() {
        let engine = ProcessEngine::new(EngineConfig::default());
        engine.stop(true).await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
