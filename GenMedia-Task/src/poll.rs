use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::Transport;
use crate::config::PollConfig;
use crate::error::{Result, TaskError};
use crate::events::{LifecycleEvent, Reporter, TracingReporter};
use crate::types::{TaskSnapshot, TaskStatus};

/// Time source for the poll loop.
///
/// `now` is a monotonic offset from an arbitrary origin; only differences
/// between readings are meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Wall-clock time via `tokio::time`. Honors `tokio::time::pause()`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Clock that only moves when slept on or advanced by hand.
///
/// Sleeping returns immediately after advancing the clock by the requested
/// duration, so poll loops run instantly and deterministically in tests.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

/// State of one task's poll loop. Everything except `Waiting` is terminal.
#[derive(Debug, Clone)]
pub enum PollState {
    Waiting(TaskStatus),
    Completed(TaskSnapshot),
    Failed { payload: serde_json::Value },
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Waiting(_))
    }
}

/// Classify one status observation.
pub fn transition(snapshot: TaskSnapshot) -> PollState {
    match snapshot.status {
        TaskStatus::Completed => PollState::Completed(snapshot),
        TaskStatus::Failed => PollState::Failed {
            payload: snapshot.data().clone(),
        },
        other => PollState::Waiting(other),
    }
}

/// Single status fetch at `<poll_endpoint>/<task_id>`.
pub async fn status<T: Transport>(transport: &T, poll_endpoint: &str, task_id: &str) -> Result<TaskSnapshot> {
    if task_id.is_empty() {
        return Err(TaskError::Validation("Task ID must not be empty".into()));
    }
    let path = format!("{}/{}", poll_endpoint.trim_end_matches('/'), task_id);
    let raw = transport.get(&path).await?;
    let mut snapshot = TaskSnapshot::from_response(raw)?;
    if snapshot.task_id.is_empty() {
        snapshot.task_id = task_id.to_string();
    }
    Ok(snapshot)
}

/// Drives a task from creation to a terminal state at a fixed interval.
///
/// The remote task is never cancelled: a local timeout only stops watching.
pub struct Poller<C: Clock = TokioClock> {
    config: PollConfig,
    clock: C,
    reporter: Arc<dyn Reporter>,
}

impl Poller<TokioClock> {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            clock: TokioClock::new(),
            reporter: Arc::new(TracingReporter),
        }
    }
}

impl Default for Poller<TokioClock> {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

impl<C: Clock> Poller<C> {
    /// Swap the time source (e.g. a [`ManualClock`] in tests).
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Poller<C2> {
        Poller {
            config: self.config,
            clock,
            reporter: self.reporter,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Poll until the task completes, fails, or the configured maximum wait
    /// elapses.
    pub async fn wait<T: Transport>(&self, transport: &T, poll_endpoint: &str, task_id: &str) -> Result<TaskSnapshot> {
        self.wait_for(transport, poll_endpoint, task_id, self.config.max_wait)
            .await
    }

    /// Like [`wait`](Self::wait) with a per-call maximum wait.
    ///
    /// The deadline is checked before every request, so a timeout is never
    /// raised before `max_wait` has elapsed and a zero budget issues no
    /// requests.
    pub async fn wait_for<T: Transport>(
        &self,
        transport: &T,
        poll_endpoint: &str,
        task_id: &str,
        max_wait: Duration,
    ) -> Result<TaskSnapshot> {
        let start = self.clock.now();
        let mut polls = 0u32;

        loop {
            let elapsed = self.clock.now().saturating_sub(start);
            let state = if elapsed >= max_wait {
                PollState::TimedOut
            } else {
                polls += 1;
                transition(status(transport, poll_endpoint, task_id).await?)
            };

            match state {
                PollState::Completed(snapshot) => {
                    tracing::debug!(task_id, polls, "task completed");
                    self.reporter.report(&LifecycleEvent::Completed {
                        task_id: task_id.to_string(),
                        files: snapshot.artifacts.len(),
                    });
                    return Ok(snapshot);
                }
                PollState::Failed { payload } => {
                    self.reporter.report(&LifecycleEvent::Failed {
                        task_id: task_id.to_string(),
                        message: payload.to_string(),
                    });
                    return Err(TaskError::TaskFailed {
                        task_id: task_id.to_string(),
                        payload,
                    });
                }
                PollState::TimedOut => {
                    tracing::debug!(task_id, polls, "poll budget exhausted");
                    self.reporter.report(&LifecycleEvent::TimedOut {
                        task_id: task_id.to_string(),
                        poll_endpoint: poll_endpoint.to_string(),
                    });
                    return Err(TaskError::TimedOut {
                        task_id: task_id.to_string(),
                        poll_endpoint: poll_endpoint.to_string(),
                        waited: max_wait,
                    });
                }
                PollState::Waiting(status) => {
                    self.reporter.report(&LifecycleEvent::StatusChanged {
                        task_id: task_id.to_string(),
                        status,
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                }
            }

            self.clock.sleep(self.config.interval).await;
        }
    }
}
