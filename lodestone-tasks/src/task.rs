use std::collections::BTreeMap;

use lodestone_core::TaskConfig;

use crate::context::TaskContext;
use crate::error::TaskResult;

/// Errors found while checking a tree, keyed by task path (`root/<name>/...`)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckReport {
    errors: BTreeMap<String, String>,
}

impl CheckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(path.into(), message.into());
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }
}

/// One node of a task tree
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Registered kind this task is rebuilt from
    fn kind(&self) -> &'static str;

    /// Validate the task without running it. `parent` is the path of the
    /// parent task; errors are reported under `<parent>/<name>`.
    fn check(&self, _ctx: &TaskContext, _parent: &str, _report: &mut CheckReport) {}

    fn perform(&mut self, ctx: &TaskContext) -> TaskResult<()>;

    fn to_config(&self) -> TaskConfig;
}

/// Path of a task below `parent`
pub fn task_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name)
}

/// Check every child of a complex task
pub fn check_children(
    children: &[Box<dyn Task>],
    ctx: &TaskContext,
    path: &str,
    report: &mut CheckReport,
) {
    for child in children {
        child.check(ctx, path, report);
    }
}

/// Run every child in order, honoring stop and pause requests before each
pub fn perform_children(children: &mut [Box<dyn Task>], ctx: &TaskContext) -> TaskResult<()> {
    for child in children.iter_mut() {
        ctx.checkpoint()?;
        log::debug!("Performing task '{}'", child.name());
        child.perform(ctx)?;
    }
    Ok(())
}
