use std::path::PathBuf;

use serde::Serialize;

use crate::types::TaskStatus;

/// Progress emitted by the lifecycle engine. Presentation is left to a
/// [`Reporter`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// Caller-supplied heading for the operation.
    Label { text: String },
    #[serde(rename_all = "camelCase")]
    TaskCreated { task_id: String },
    /// A poll observed a non-terminal status.
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        task_id: String,
        status: TaskStatus,
        elapsed_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Completed { task_id: String, files: usize },
    #[serde(rename_all = "camelCase")]
    Failed { task_id: String, message: String },
    #[serde(rename_all = "camelCase")]
    TimedOut {
        task_id: String,
        poll_endpoint: String,
    },
    /// The task was submitted but will not be watched by this process.
    #[serde(rename_all = "camelCase")]
    Detached {
        task_id: String,
        poll_endpoint: String,
    },
    Saved { path: PathBuf },
    Warning { message: String },
    /// One-off informational message (e.g. the generation milestone).
    Notice { message: String },
}

/// Receives [`LifecycleEvent`]s. Must not block.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &LifecycleEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Label { text } => tracing::info!("{}", text),
            LifecycleEvent::TaskCreated { task_id } => tracing::info!(%task_id, "task created"),
            LifecycleEvent::StatusChanged {
                task_id,
                status,
                elapsed_ms,
            } => tracing::debug!(%task_id, %status, elapsed_ms, "waiting for task"),
            LifecycleEvent::Completed { task_id, files } => {
                tracing::info!(%task_id, files, "task completed")
            }
            LifecycleEvent::Failed { task_id, message } => {
                tracing::error!(%task_id, "task failed: {}", message)
            }
            LifecycleEvent::TimedOut {
                task_id,
                poll_endpoint,
            } => tracing::warn!(%task_id, %poll_endpoint, "task timed out"),
            LifecycleEvent::Detached {
                task_id,
                poll_endpoint,
            } => tracing::info!(%task_id, %poll_endpoint, "task submitted, not waiting"),
            LifecycleEvent::Saved { path } => tracing::info!(path = %path.display(), "saved"),
            LifecycleEvent::Warning { message } => tracing::warn!("{}", message),
            LifecycleEvent::Notice { message } => tracing::info!("{}", message),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _event: &LifecycleEvent) {}
}
