use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigStore;
use crate::history::append_history;
use crate::types::HistoryEntry;

/// Generations after which the one-time notice is shown.
pub const NOTICE_AFTER_GENERATIONS: u64 = 5;

/// Best-effort side effects run after artifacts are on disk.
///
/// Implementations own their failure boundary: nothing here can fail a
/// lifecycle. Errors are logged and dropped.
pub trait Notifier: Send + Sync {
    /// Remember the most recently written file.
    fn output_saved(&self, path: &Path);

    /// Count one successful materialization. Returns a message the first
    /// time the generation milestone is reached.
    fn generation_recorded(&self) -> Option<String>;

    /// Append one entry to the generation history.
    fn history(&self, entry: HistoryEntry);
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn output_saved(&self, _path: &Path) {}

    fn generation_recorded(&self) -> Option<String> {
        None
    }

    fn history(&self, _entry: HistoryEntry) {}
}

/// Persists side effects to a [`ConfigStore`] and its history log.
#[derive(Debug, Clone)]
pub struct StoreNotifier {
    store: Arc<ConfigStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }
}

impl Notifier for StoreNotifier {
    fn output_saved(&self, path: &Path) {
        let path = path.to_path_buf();
        if let Err(e) = self.store.update(|s| s.last_output_path = Some(path)) {
            tracing::warn!(error = %e, "failed to record last output path");
        }
    }

    fn generation_recorded(&self) -> Option<String> {
        let mut crossed = false;
        let result = self.store.update(|s| {
            s.generations += 1;
            if !s.notice_shown && s.generations >= NOTICE_AFTER_GENERATIONS {
                s.notice_shown = true;
                crossed = true;
            }
        });
        match result {
            Ok(settings) if crossed => Some(format!(
                "That's {} generations with genmedia. Run `genmedia history` to see them all.",
                settings.generations
            )),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to update generation counter");
                None
            }
        }
    }

    fn history(&self, entry: HistoryEntry) {
        if let Err(e) = append_history(&self.store.history_path(), &entry) {
            tracing::warn!(error = %e, "failed to append history");
        }
    }
}
