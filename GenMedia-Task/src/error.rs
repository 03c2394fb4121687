use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Errors returned by task lifecycle operations.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The API returned a non-success HTTP status.
    #[error("{}", remote_message(.status, .body))]
    RemoteApi { status: u16, body: Value },

    /// The remote task reached the `FAILED` state.
    #[error("Task {task_id} failed. {payload}")]
    TaskFailed { task_id: String, payload: Value },

    /// The local poll loop gave up before the task finished. The remote
    /// task keeps running and can be re-attached with `status`.
    #[error(
        "Task {task_id} timed out after {}s. Check status with: genmedia status {task_id} --endpoint {poll_endpoint}",
        .waited.as_secs()
    )]
    TimedOut {
        task_id: String,
        poll_endpoint: String,
        waited: Duration,
    },

    /// An artifact could not be fetched.
    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Malformed caller input, detected before any request is made.
    #[error("{0}")]
    Validation(String),

    /// Missing or unusable configuration (e.g. no API key).
    #[error("{0}")]
    Config(String),

    /// The response was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// Local filesystem failure.
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskError {
    /// HTTP status code for [`TaskError::RemoteApi`], `None` otherwise.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TaskError::RemoteApi { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn remote_message(status: &u16, body: &Value) -> String {
    body.get("message")
        .and_then(|v| v.as_str())
        .or_else(|| body.get("error").and_then(|v| v.as_str()))
        .map(String::from)
        .unwrap_or_else(|| format!("API request failed with status {}", status))
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TaskError>;
