//! Control signals observed by a running task tree
//!
//! Each signal is a single flag with no payload. The controller is the only
//! writer of `should_pause` and `should_stop`; the task tree is the only
//! writer of `paused` and `resumed`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A binary flag visible to every holder
pub trait Signal: Send + Sync {
    /// Raise the flag; raising a raised flag does nothing
    fn set(&self);

    fn clear(&self);

    fn is_set(&self) -> bool;
}

/// In-process flag
#[derive(Debug, Default)]
pub struct LocalSignal(AtomicBool);

impl LocalSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Signal for LocalSignal {
    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Pause and stop requests with their acknowledgements
#[derive(Clone)]
pub struct ControlSignals {
    pub should_pause: Arc<dyn Signal>,
    pub paused: Arc<dyn Signal>,
    pub should_stop: Arc<dyn Signal>,
    pub resumed: Arc<dyn Signal>,
}

impl ControlSignals {
    /// Flags that only live in this process
    pub fn local() -> Self {
        Self {
            should_pause: Arc::new(LocalSignal::new()),
            paused: Arc::new(LocalSignal::new()),
            should_stop: Arc::new(LocalSignal::new()),
            resumed: Arc::new(LocalSignal::new()),
        }
    }

    pub fn clear_all(&self) {
        self.should_pause.clear();
        self.paused.clear();
        self.should_stop.clear();
        self.resumed.clear();
    }
}

impl fmt::Debug for ControlSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSignals")
            .field("should_pause", &self.should_pause.is_set())
            .field("paused", &self.paused.is_set())
            .field("should_stop", &self.should_stop.is_set())
            .field("resumed", &self.resumed.is_set())
            .finish()
    }
}
