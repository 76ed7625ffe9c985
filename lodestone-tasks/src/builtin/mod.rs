//! Task kinds available to every tree

mod flow;
mod timing;
mod values;

pub use flow::{LoopTask, SequenceTask};
pub use timing::{SleepTask, WaitForFileTask};
pub use values::{PrintTask, SetValueTask};

use crate::registry::TaskRegistry;

pub const SEQUENCE: &str = "lodestone.Sequence";
pub const LOOP: &str = "lodestone.Loop";
pub const SLEEP: &str = "lodestone.Sleep";
pub const SET_VALUE: &str = "lodestone.SetValue";
pub const PRINT: &str = "lodestone.Print";
pub const WAIT_FOR_FILE: &str = "lodestone.WaitForFile";

/// Registry holding every built-in task kind
pub fn builtin_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    registry
        .register(SEQUENCE, SequenceTask::from_config)
        .register(LOOP, LoopTask::from_config)
        .register(SLEEP, SleepTask::from_config)
        .register(SET_VALUE, SetValueTask::from_config)
        .register(PRINT, PrintTask::from_config)
        .register(WAIT_FOR_FILE, WaitForFileTask::from_config);
    registry
}
