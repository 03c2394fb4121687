use serde::Serialize;

/// Result of one batch item, tagged with its input position.
///
/// Serializes as `{index, success: true, output}` or
/// `{index, success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome<O> {
    /// Zero-based position in the input sequence.
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<O>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl<O> ItemOutcome<O> {
    pub fn succeeded(index: usize, output: O, duration_ms: u64) -> Self {
        Self {
            index,
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            index,
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Counts and timing for a finished batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub concurrency: usize,
    /// RFC 3339 timestamps.
    pub started_at: String,
    pub completed_at: String,
    pub total_duration_ms: u64,
    /// Mean per-item duration, 0 for an empty batch.
    pub avg_item_ms: u64,
}

/// Every item's outcome in input order, plus the summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport<O> {
    pub outcomes: Vec<ItemOutcome<O>>,
    pub summary: BatchSummary,
}

impl<O> BatchReport<O> {
    pub fn succeeded(&self) -> usize {
        self.summary.succeeded
    }

    pub fn failed(&self) -> usize {
        self.summary.failed
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome<O>> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

/// Progress emitted while a batch runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BatchEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        batch_id: String,
        total: usize,
        concurrency: usize,
    },
    /// A window of up to `concurrency` items was launched.
    #[serde(rename_all = "camelCase")]
    WindowStarted {
        window: usize,
        windows: usize,
        items: usize,
    },
    /// Emitted in completion order, which may differ from input order.
    #[serde(rename_all = "camelCase")]
    ItemFinished {
        index: usize,
        success: bool,
        error: Option<String>,
        completed: usize,
        total: usize,
        duration_ms: u64,
    },
    Finished { summary: BatchSummary },
}
