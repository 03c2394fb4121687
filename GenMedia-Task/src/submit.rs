use serde_json::Value;

use crate::client::Transport;
use crate::error::{Result, TaskError};
use crate::types::{Artifact, TaskSnapshot, TaskStatus};

/// Handle returned by a successful task creation.
#[derive(Debug, Clone)]
pub struct Submission {
    pub task_id: String,
    pub status: TaskStatus,
    /// Artifacts returned synchronously with a `COMPLETED` creation
    /// response. `None` when the task still has to be polled.
    pub inline_artifacts: Option<Vec<Artifact>>,
    /// The full creation response.
    pub raw: Value,
}

impl Submission {
    /// Whether the service answered with a finished result, so polling can
    /// be skipped.
    pub fn is_completed(&self) -> bool {
        self.inline_artifacts.is_some()
    }
}

/// POST `payload` to `endpoint` and classify the answer.
///
/// Errors from the transport are returned unchanged; there are no retries.
pub async fn submit<T: Transport>(transport: &T, endpoint: &str, payload: &Value) -> Result<Submission> {
    if endpoint.is_empty() {
        return Err(TaskError::Validation("Create endpoint must not be empty".into()));
    }

    let raw = transport.post(endpoint, payload).await?;
    let snapshot = TaskSnapshot::from_response(raw)?;

    let inline_artifacts = match snapshot.status {
        TaskStatus::Completed => Some(snapshot.artifacts),
        _ if snapshot.task_id.is_empty() => {
            return Err(TaskError::InvalidResponse(format!(
                "Create response from {} is missing task_id",
                endpoint
            )));
        }
        _ => None,
    };

    tracing::debug!(
        task_id = %snapshot.task_id,
        status = %snapshot.status,
        inline = inline_artifacts.is_some(),
        "task submitted"
    );

    Ok(Submission {
        task_id: snapshot.task_id,
        status: snapshot.status,
        inline_artifacts,
        raw: snapshot.raw,
    })
}
