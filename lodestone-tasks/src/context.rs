//! Execution environment shared by the tasks of a tree

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use lodestone_core::ControlSignals;

use crate::database::TaskDatabase;
use crate::error::{TaskError, TaskResult};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What every task sees while it runs: the tree database, the runtime
/// dependencies, the control signals and a standard output stream.
pub struct TaskContext {
    pub database: TaskDatabase,
    runtime: JsonMap<String, JsonValue>,
    signals: ControlSignals,
    stdout: Mutex<Box<dyn Write + Send>>,
    poll_interval: Duration,
}

impl TaskContext {
    pub fn new(database: TaskDatabase) -> Self {
        Self {
            database,
            runtime: JsonMap::new(),
            signals: ControlSignals::local(),
            stdout: Mutex::new(Box::new(std::io::sink())),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn set_runtime(&mut self, runtime: JsonMap<String, JsonValue>) {
        self.runtime = runtime;
    }

    pub fn set_signals(&mut self, signals: ControlSignals) {
        self.signals = signals;
    }

    pub fn set_stdout(&mut self, stdout: Box<dyn Write + Send>) {
        self.stdout = Mutex::new(stdout);
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn runtime_dep(&self, key: &str) -> Option<&JsonValue> {
        self.runtime.get(key)
    }

    pub fn signals(&self) -> &ControlSignals {
        &self.signals
    }

    pub fn stop_requested(&self) -> bool {
        self.signals.should_stop.is_set()
    }

    pub fn write_stdout(&self, text: &str) -> TaskResult<()> {
        let mut stdout = self.stdout.lock().unwrap_or_else(PoisonError::into_inner);
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    /// Honor pending stop and pause requests.
    ///
    /// Called between tasks. A stop request yields [`TaskError::Stopped`].
    /// A pause request is acknowledged through `paused`, then the call blocks
    /// until the request is withdrawn, acknowledging through `resumed`, or
    /// until a stop is requested.
    pub fn checkpoint(&self) -> TaskResult<()> {
        let signals = &self.signals;
        if signals.should_stop.is_set() {
            return Err(TaskError::Stopped);
        }

        if signals.should_pause.is_set() {
            log::info!("Pausing execution");
            signals.resumed.clear();
            signals.paused.set();
            loop {
                thread::sleep(self.poll_interval);
                if signals.should_stop.is_set() {
                    signals.paused.clear();
                    return Err(TaskError::Stopped);
                }
                if !signals.should_pause.is_set() {
                    signals.paused.clear();
                    signals.resumed.set();
                    log::info!("Resuming execution");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Sleep for `duration`, returning early with [`TaskError::Stopped`] when
    /// a stop is requested
    pub fn sleep(&self, duration: Duration) -> TaskResult<()> {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return Err(TaskError::Stopped);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(self.poll_interval));
        }
    }
}
