//! Inter-process communication for Lodestone
//!
//! This crate provides the protocol, the line framing and the control
//! signals shared between the engine and its worker process.

pub mod error;
pub mod framing;
pub mod protocol;
pub mod signals;

// Re-export commonly used types
pub use error::IpcError;
pub use framing::{Frame, FrameReader, FrameWriter};
pub use protocol::{
    CoordinatorMessage, MessageEnvelope, Relay, TaskSubmission, WorkerMessage, FRAME_MARKER,
    IPC_PROTOCOL_VERSION,
};
pub use signals::{SharedSignal, SignalBlock, SignalSlot};
pub use lodestone_core::{ControlSignals, LocalSignal, Signal};
