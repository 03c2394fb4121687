use std::path::PathBuf;

use genmedia_task::TaskError;
use thiserror::Error;

/// Errors that stop a batch before any item runs.
///
/// Failures of individual items never surface here; they are recorded in
/// the item's outcome.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Failed to read manifest {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for BatchError {
    fn from(err: anyhow::Error) -> Self {
        BatchError::Other(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
