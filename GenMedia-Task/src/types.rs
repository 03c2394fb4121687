use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Remote task status. Unknown strings are kept verbatim and treated as
/// still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl TaskStatus {
    /// `COMPLETED` or `FAILED`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Other(s) => s,
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Other(String::new())
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => TaskStatus::Pending,
            "PROCESSING" => TaskStatus::Processing,
            "COMPLETED" => TaskStatus::Completed,
            "FAILED" => TaskStatus::Failed,
            _ => TaskStatus::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable output of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Any extra fields the API attached to the artifact object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            extra: Map::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Wire shape of a `generated` entry: either a bare URL or an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireArtifact {
    Url(String),
    Object(Artifact),
}

impl From<WireArtifact> for Artifact {
    fn from(wire: WireArtifact) -> Self {
        match wire {
            WireArtifact::Url(url) => Artifact::new(url),
            WireArtifact::Object(artifact) => artifact,
        }
    }
}

/// Convert a raw `generated` list into artifacts, preserving order.
pub fn normalize_artifacts(generated: Vec<WireArtifact>) -> Vec<Artifact> {
    generated.into_iter().map(Artifact::from).collect()
}

/// `data` object of a task create/status response.
///
/// `task_id` and `status` may be absent or null; a missing status reads as
/// an unknown, non-terminal one.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub generated: Option<Vec<WireArtifact>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level `{ "data": { ... } }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEnvelope {
    pub data: TaskData,
}

/// A normalized view of one task observation.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub artifacts: Vec<Artifact>,
    /// The full response body, kept for diagnostics.
    pub raw: Value,
}

impl TaskSnapshot {
    /// Parse a response body into a snapshot. Artifact normalization
    /// happens here and nowhere else.
    pub fn from_response(raw: Value) -> crate::Result<Self> {
        let envelope: TaskEnvelope = serde_json::from_value(raw.clone())?;
        let data = envelope.data;
        Ok(Self {
            task_id: data.task_id.unwrap_or_default(),
            status: data.status.unwrap_or_default(),
            artifacts: normalize_artifacts(data.generated.unwrap_or_default()),
            raw,
        })
    }

    /// The `data` object of the raw response, or the whole body.
    pub fn data(&self) -> &Value {
        self.raw.get("data").unwrap_or(&self.raw)
    }
}

/// Create and poll paths for one kind of task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEndpoint {
    pub create: String,
    pub poll: String,
}

impl TaskEndpoint {
    pub fn new(create: impl Into<String>, poll: impl Into<String>) -> Self {
        Self {
            create: create.into(),
            poll: poll.into(),
        }
    }

    /// Endpoint whose create and poll paths are the same.
    pub fn same(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            create: path.clone(),
            poll: path,
        }
    }
}

/// Last observed rate-limit headers. Every field is optional; missing or
/// non-numeric headers are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_seconds: Option<u64>,
}

/// One line of the generation history log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<u64>,
}
