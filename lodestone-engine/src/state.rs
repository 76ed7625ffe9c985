use std::fmt;

/// Lifecycle of a [`ProcessEngine`](crate::ProcessEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No worker, or the worker was torn down
    #[default]
    Stopped,
    /// A worker is alive and idle
    Waiting,
    Running,
    /// Pause requested, not yet acknowledged by the worker
    Pausing,
    Paused,
    /// Resume requested, not yet acknowledged by the worker
    Resuming,
}

impl EngineState {
    /// Whether a new run may start
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Waiting => "waiting",
            EngineState::Running => "running",
            EngineState::Pausing => "pausing",
            EngineState::Paused => "paused",
            EngineState::Resuming => "resuming",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
