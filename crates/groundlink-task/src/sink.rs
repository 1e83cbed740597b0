use tracing::{debug, error};

use crate::error::TaskError;

/// Receives lifecycle reports from background tasks.
pub trait TaskSink: Send + Sync {
    /// The task returned an error or panicked and will not run again.
    fn task_failed(&self, task: &str, error: &TaskError);

    /// The task ended without failing: it was cancelled or ran its single
    /// iteration.
    fn task_stopped(&self, _task: &str) {}
}

/// Reports task lifecycle through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTaskSink;

impl TaskSink for TracingTaskSink {
    fn task_failed(&self, task: &str, err: &TaskError) {
        error!(task = %task, error = %err, "background task failed");
    }

    fn task_stopped(&self, task: &str) {
        debug!(task = %task, "background task stopped");
    }
}
