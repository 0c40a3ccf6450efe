use crate::domain::repository::{SideEffect, TaskSpawner};

/// Runs side effects as detached tokio tasks. Failures are logged and dropped.
#[derive(Clone, Copy, Default)]
pub struct TokioTaskSpawner;

impl TaskSpawner for TokioTaskSpawner {
    fn spawn(&self, label: &'static str, task: SideEffect) {
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::warn!(task = label, error = %e.detail(), "side effect failed");
            }
        });
    }
}
