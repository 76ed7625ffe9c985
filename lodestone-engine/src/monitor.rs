//! Monitor relay: live values of observed database entries
//!
//! The worker attaches a [`Spy`] to the task database of each run. It
//! forwards every change of an observed entry, in mutation order, onto the
//! outbound frame queue. The controller drains those updates and hands them
//! to whichever [`MonitorObserver`] is attached at that moment.

use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lodestone_ipc::CoordinatorMessage;
use lodestone_tasks::{SubscriptionId, TaskDatabase};

/// Receives monitor updates on the controller side
pub trait MonitorObserver: Send + Sync {
    fn on_update(&self, path: &str, value: &JsonValue);
}

/// One update of an observed entry
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorUpdate {
    pub path: String,
    pub value: JsonValue,
}

/// Forwards updates to an unbounded channel
pub struct ChannelObserver {
    updates: mpsc::UnboundedSender<MonitorUpdate>,
}

impl ChannelObserver {
    /// Observer and the receiving end of its updates
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MonitorUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        (Self { updates }, rx)
    }
}

impl MonitorObserver for ChannelObserver {
    fn on_update(&self, path: &str, value: &JsonValue) {
        let _ = self.updates.send(MonitorUpdate {
            path: path.to_string(),
            value: value.clone(),
        });
    }
}

/// The observer currently attached to an engine
#[derive(Default)]
pub(crate) struct ObserverSlot {
    observer: RwLock<Option<Arc<dyn MonitorObserver>>>,
}

impl ObserverSlot {
    pub(crate) fn set(&self, observer: Option<Arc<dyn MonitorObserver>>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    fn current(&self) -> Option<Arc<dyn MonitorObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Controller side: dispatch updates until [`CoordinatorMessage::MonitorClosed`]
/// arrives or every sender is gone
pub(crate) fn spawn_monitor_relay(
    mut updates: mpsc::UnboundedReceiver<CoordinatorMessage>,
    slot: Arc<ObserverSlot>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = updates.recv().await {
            match message {
                CoordinatorMessage::Monitor { path, value } => {
                    if let Some(observer) = slot.current() {
                        observer.on_update(&path, &value);
                    }
                }
                CoordinatorMessage::SpyClosed => debug!("Worker spy detached"),
                CoordinatorMessage::MonitorClosed => {
                    debug!("Monitor relay closed by worker");
                    break;
                }
                other => warn!("Unexpected message on monitor relay: {:?}", other),
            }
        }
    })
}

/// Worker side listener forwarding observed database changes
pub struct Spy {
    database: TaskDatabase,
    subscription: Option<SubscriptionId>,
    outbound: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl Spy {
    pub fn attach(
        database: &TaskDatabase,
        observed: BTreeSet<String>,
        outbound: mpsc::UnboundedSender<CoordinatorMessage>,
    ) -> Self {
        let updates = outbound.clone();
        let subscription = database.subscribe(move |entry, value| {
            if observed.contains(entry) {
                // Never blocks the writing task
                let _ = updates.send(CoordinatorMessage::Monitor {
                    path: entry.to_string(),
                    value: value.clone(),
                });
            }
        });
        Self {
            database: database.clone(),
            subscription: Some(subscription),
            outbound,
        }
    }

    /// Detach from the database; later calls do nothing
    pub fn close(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.database.unsubscribe(id);
            let _ = self.outbound.send(CoordinatorMessage::SpyClosed);
        }
    }
}

impl Drop for Spy {
    fn drop(&mut self) {
        self.close();
    }
}
