use std::time::Duration;

use genmedia_task::{LifecycleEvent, Reporter};
use indicatif::{ProgressBar, ProgressStyle};

/// Renders lifecycle events on a single stderr spinner.
///
/// Messages that should outlive the spinner (saved files, warnings) are
/// printed above it.
pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Reporter for SpinnerReporter {
    fn report(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Label { text } => self.bar.set_message(text.clone()),
            LifecycleEvent::TaskCreated { task_id } => {
                self.bar.set_message(format!("Task {} created", task_id))
            }
            LifecycleEvent::StatusChanged {
                status, elapsed_ms, ..
            } => self
                .bar
                .set_message(format!("{} ({}s)", status, elapsed_ms / 1000)),
            LifecycleEvent::Completed { files, .. } => {
                self.bar.set_message(format!("Completed, {} file(s)", files))
            }
            LifecycleEvent::Failed { task_id, message } => {
                self.println(format!("Task {} failed: {}", task_id, message))
            }
            LifecycleEvent::TimedOut { task_id, .. } => {
                self.println(format!("Task {} is still running", task_id))
            }
            LifecycleEvent::Detached { .. } => {}
            LifecycleEvent::Saved { path } => self.println(format!("Saved: {}", path.display())),
            LifecycleEvent::Warning { message } => self.println(format!("Warning: {}", message)),
            LifecycleEvent::Notice { message } => self.println(message),
        }
    }
}
