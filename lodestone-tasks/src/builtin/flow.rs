use lodestone_core::TaskConfig;

use super::{LOOP, SEQUENCE};
use crate::context::TaskContext;
use crate::error::{TaskError, TaskResult};
use crate::registry::TaskRegistry;
use crate::task::{check_children, perform_children, task_path, CheckReport, Task};

/// Runs its children once, in order
pub struct SequenceTask {
    name: String,
    children: Vec<Box<dyn Task>>,
}

impl SequenceTask {
    pub fn from_config(config: &TaskConfig, registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        Ok(Box::new(Self {
            name: config.name.clone(),
            children: registry.build_children(config)?,
        }))
    }
}

impl Task for SequenceTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        SEQUENCE
    }

    fn check(&self, ctx: &TaskContext, parent: &str, report: &mut CheckReport) {
        check_children(&self.children, ctx, &task_path(parent, &self.name), report);
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        perform_children(&mut self.children, ctx)
    }

    fn to_config(&self) -> TaskConfig {
        let mut config = TaskConfig::new(SEQUENCE, &self.name);
        config.children = self.children.iter().map(|c| c.to_config()).collect();
        config
    }
}

/// Runs its children `count` times, publishing the iteration number as
/// `<name>_index`
pub struct LoopTask {
    name: String,
    count: u64,
    children: Vec<Box<dyn Task>>,
}

impl LoopTask {
    pub fn from_config(config: &TaskConfig, registry: &TaskRegistry) -> TaskResult<Box<dyn Task>> {
        let count = match config.param("count") {
            None => return Err(TaskError::missing(&config.name, "count")),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| TaskError::invalid(&config.name, "count", "expected a non-negative integer"))?,
        };
        Ok(Box::new(Self {
            name: config.name.clone(),
            count,
            children: registry.build_children(config)?,
        }))
    }

    fn index_entry(&self) -> String {
        format!("{}_index", self.name)
    }
}

impl Task for LoopTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        LOOP
    }

    fn check(&self, ctx: &TaskContext, parent: &str, report: &mut CheckReport) {
        ctx.database.write(self.index_entry(), 0);
        check_children(&self.children, ctx, &task_path(parent, &self.name), report);
    }

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        let entry = self.index_entry();
        for index in 0..self.count {
            ctx.checkpoint()?;
            ctx.database.write(entry.clone(), index);
            perform_children(&mut self.children, ctx)?;
        }
        Ok(())
    }

    fn to_config(&self) -> TaskConfig {
        let mut config = TaskConfig::new(LOOP, &self.name).with_param("count", self.count);
        config.children = self.children.iter().map(|c| c.to_config()).collect();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::builtin_registry;
    use crate::database::TaskDatabase;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_loop_publishes_index() {
        let registry = builtin_registry();
        let config = TaskConfig::new(LOOP, "sweep")
            .with_param("count", 3)
            .with_child(
                TaskConfig::new("lodestone.SetValue", "mark")
                    .with_param("entry", "marker")
                    .with_param("value", true),
            );
        let mut task = registry.build(&config).unwrap();

        let ctx = TaskContext::new(TaskDatabase::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.database.subscribe(move |entry, value| {
            sink.lock().unwrap().push(format!("{}={}", entry, value));
        });

        task.perform(&ctx).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "sweep_index=0",
                "marker=true",
                "sweep_index=1",
                "marker=true",
                "sweep_index=2",
                "marker=true"
            ]
        );
        assert_eq!(ctx.database.read("sweep_index"), Some(json!(2)));
    }

    #[test]
    fn test_loop_requires_count() {
        let registry = builtin_registry();
        let missing = TaskConfig::new(LOOP, "sweep");
        assert!(matches!(
            registry.build(&missing),
            Err(TaskError::MissingParameter { .. })
        ));

        let negative = TaskConfig::new(LOOP, "sweep").with_param("count", -1);
        assert!(matches!(
            registry.build(&negative),
            Err(TaskError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_nested_check_paths() {
        let registry = builtin_registry();
        let config = TaskConfig::new(SEQUENCE, "outer").with_child(
            TaskConfig::new("lodestone.WaitForFile", "trigger")
                .with_param("path", "/no/such/dir/trigger"),
        );
        let task = registry.build(&config).unwrap();
        let ctx = TaskContext::new(TaskDatabase::new());
        let mut report = CheckReport::new();
        task.check(&ctx, "root", &mut report);

        assert!(report.errors().contains_key("root/outer/trigger"));
    }
}
