//! Out-of-process execution engine for Lodestone
//!
//! A [`ProcessEngine`] runs task trees in a separate worker process so that
//! a crashing or hanging tree cannot take the controller down with it. The
//! two processes exchange one submission, one acknowledgement and one result
//! per run over the worker's standard streams. Log records and monitored
//! database updates travel over the same stream and are routed to their own
//! consumers on the controller side. Pause and stop requests go through a
//! shared [`SignalBlock`](lodestone_ipc::SignalBlock).
//!
//! The worker side of the exchange is [`worker_main`], driven by the
//! `lodestone-worker` binary or by any binary that calls it in worker mode.

pub mod engine;
pub mod error;
pub mod monitor;
pub mod process;
pub mod relay;
pub mod runtime;
pub mod state;

pub use engine::ProcessEngine;
pub use error::{EngineError, WorkerError};
pub use monitor::{ChannelObserver, MonitorObserver, MonitorUpdate, Spy};
pub use runtime::{worker_main, WorkerArgs, WorkerOptions};
pub use state::EngineState;
