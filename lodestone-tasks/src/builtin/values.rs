use serde_json::Value as JsonValue;

use lodestone_core::TaskConfig;

use super::{PRINT, SET_VALUE};
use crate::context::TaskContext;
use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::task::Task;

enum Source {
    Value(JsonValue),
    Dependency(String),
}

/// Writes a value into the database, either a literal or the value of a
/// runtime dependency
pub struct SetValueTask {
    name: String,
    entry: String,
    source: Source,
}

impl SetValueTask {
    pub fn from_config(config: &TaskConfig, _registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        let entry = config
            .str_param("entry")
            .ok_or_else(|| TaskError::missing(&config.name, "entry"))?;
        let source = match (config.param("value"), config.param("dependency")) {
            (Some(value), None) => Source::Value(value.clone()),
            (None, Some(JsonValue::String(dep))) => Source::Dependency(dep.clone()),
            (None, Some(_)) => {
                return Err(TaskError::invalid(
                    &config.name,
                    "dependency",
                    "expected a dependency name",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(TaskError::invalid(
                    &config.name,
                    "value",
                    "'value' and 'dependency' are exclusive",
                ))
            }
            (None, None) => return Err(TaskError::missing(&config.name, "value")),
        };
        Ok(Box::new(Self {
            name: config.name.clone(),
            entry: entry.to_string(),
            source,
        }))
    }
}

impl Task for SetValueTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        SET_VALUE
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        let value = match &self.source {
            Source::Value(value) => value.clone(),
            Source::Dependency(dep) => ctx
                .runtime_dep(dep)
                .cloned()
                .ok_or_else(|| TaskError::Failed(format!("Runtime dependency '{}' is not available", dep)))?,
        };
        ctx.database.write(self.entry.clone(), value);
        Ok(())
    }

    fn to_config(&self) -> TaskConfig {
        let config = TaskConfig::new(SET_VALUE, &self.name).with_param("entry", self.entry.clone());
        match &self.source {
            Source::Value(value) => config.with_param("value", value.clone()),
            Source::Dependency(dep) => config.with_param("dependency", dep.clone()),
        }
    }
}

/// Prints a line on the standard output of the run
pub struct PrintTask {
    name: String,
    message: String,
}

impl PrintTask {
    pub fn from_config(config: &TaskConfig, _registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        let message = config
            .str_param("message")
            .ok_or_else(|| TaskError::missing(&config.name, "message"))?;
        Ok(Box::new(Self {
            name: config.name.clone(),
            message: message.to_string(),
        }))
    }
}

impl Task for PrintTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        PRINT
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        ctx.write_stdout(&format!("{}\n", self.message))
    }

    fn to_config(&self) -> TaskConfig {
        TaskConfig::new(PRINT, &self.name).with_param("message", self.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_registry;
    use crate::database::TaskDatabase;
    use serde_json::json;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_print_writes_line() {
        let capture = Capture::default();
        let mut ctx = TaskContext::new(TaskDatabase::new());
        ctx.set_stdout(Box::new(capture.clone()));

        let config = TaskConfig::new(PRINT, "hello").with_param("message", "hello world");
        let mut task = builtin_registry().build(&config).unwrap();
        task.perform(&ctx).unwrap();

        assert_eq!(String::from_utf8(capture.0.lock().unwrap().clone()).unwrap(), "hello world\n");
    }

    #[test]
    fn test_set_value_rejects_both_sources() {
        let config = TaskConfig::new(SET_VALUE, "set")
            .with_param("entry", "x")
            .with_param("value", 1)
            .with_param("dependency", "amp");
        assert!(matches!(
            builtin_registry().build(&config),
            Err(TaskError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_set_value_literal() {
        let config = TaskConfig::new(SET_VALUE, "set")
            .with_param("entry", "x")
            .with_param("value", json!([1, 2]));
        let mut task = builtin_registry().build(&config).unwrap();
        let ctx = TaskContext::new(TaskDatabase::new());
        task.perform(&ctx).unwrap();
        assert_eq!(ctx.database.read("x"), Some(json!([1, 2])));
        assert_eq!(task.to_config(), config);
    }
}
