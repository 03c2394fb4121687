use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, TaskError};
use crate::types::HistoryEntry;

/// Append one entry as a JSON line, creating the file and its directory.
pub fn append_history(path: &Path, entry: &HistoryEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TaskError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let io_err = |source: std::io::Error| TaskError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).map_err(io_err)
}

/// Read every entry in file order.
///
/// A missing or unreadable file yields an empty list; lines that do not
/// parse are skipped.
pub fn read_history(path: &Path) -> Vec<HistoryEntry> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping corrupt history line");
                None
            }
        })
        .collect()
}
