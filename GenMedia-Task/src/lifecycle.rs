use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::client::{ApiClient, Transport};
use crate::config::{MaterializeConfig, PollConfig};
use crate::download::{run_blocking, Materializer};
use crate::error::Result;
use crate::events::{LifecycleEvent, Reporter, TracingReporter};
use crate::notify::Notifier;
use crate::poll::{self, Clock, Poller, TokioClock};
use crate::submit::submit;
use crate::types::{Artifact, HistoryEntry, TaskEndpoint, TaskSnapshot};

/// What to record in the history log for a run that downloads files.
#[derive(Debug, Clone, Default)]
pub struct HistoryContext {
    pub command: String,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub seed: Option<i64>,
}

impl HistoryContext {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Per-run switches for [`Lifecycle::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Do not download; return the task handle instead (or the inline
    /// artifacts if the task finished on submission).
    pub skip_download: bool,
    /// Do not poll; return the task handle right after submission.
    pub skip_poll: bool,
    /// Override the poller's maximum wait for this run.
    pub max_wait: Option<Duration>,
    /// Explicit output path. Fanned out with `-{i}` for multiple artifacts.
    pub output: Option<PathBuf>,
    /// Heading reported before submission.
    pub label: Option<String>,
    pub history: Option<HistoryContext>,
}

impl RunOptions {
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_history(mut self, history: HistoryContext) -> Self {
        self.history = Some(history);
        self
    }

    pub fn skip_download(mut self) -> Self {
        self.skip_download = true;
        self
    }

    pub fn skip_poll(mut self) -> Self {
        self.skip_poll = true;
        self
    }
}

/// Result of one lifecycle run.
#[derive(Debug, Clone)]
pub enum LifecycleOutcome {
    /// The task finished. `paths` is empty when downloading was skipped or
    /// the task produced nothing.
    Completed {
        task_id: String,
        artifacts: Vec<Artifact>,
        paths: Vec<PathBuf>,
    },
    /// Submitted but not watched. Resume with `status` on `poll_endpoint`.
    Detached {
        task_id: String,
        poll_endpoint: String,
    },
}

impl LifecycleOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            LifecycleOutcome::Completed { task_id, .. } | LifecycleOutcome::Detached { task_id, .. } => task_id,
        }
    }

    /// Local files written by the run.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            LifecycleOutcome::Completed { paths, .. } => paths,
            LifecycleOutcome::Detached { .. } => &[],
        }
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        match self {
            LifecycleOutcome::Completed { paths, .. } => paths,
            LifecycleOutcome::Detached { .. } => Vec::new(),
        }
    }
}

/// Submit, wait, download.
///
/// # Example
/// ```no_run
/// use genmedia_task::{
///     endpoints, ApiClient, ClientConfig, Lifecycle, MaterializeConfig, RunOptions,
/// };
/// use serde_json::json;
///
/// # async fn example() -> genmedia_task::Result<()> {
/// let client = ApiClient::new(ClientConfig::builder().with_api_key("key").build())?;
/// let lifecycle = Lifecycle::for_client(client, MaterializeConfig::default());
///
/// let model = endpoints::image_model("flux-dev")?;
/// let outcome = lifecycle
///     .run(
///         &model.endpoint(),
///         &json!({"prompt": "a lighthouse at dusk"}),
///         &RunOptions::default().with_output("lighthouse.png"),
///     )
///     .await?;
/// println!("saved {:?}", outcome.paths());
/// # Ok(())
/// # }
/// ```
pub struct Lifecycle<T: Transport, C: Clock = TokioClock> {
    transport: T,
    poller: Poller<C>,
    materializer: Materializer,
    reporter: Arc<dyn Reporter>,
}

impl Lifecycle<ApiClient> {
    /// Lifecycle over an [`ApiClient`], downloading with the same HTTP client.
    pub fn for_client(client: ApiClient, config: MaterializeConfig) -> Self {
        let materializer = Materializer::new(client.http().clone(), config);
        Self::new(client, materializer)
    }
}

impl<T: Transport> Lifecycle<T> {
    pub fn new(transport: T, materializer: Materializer) -> Self {
        Self {
            transport,
            poller: Poller::default(),
            materializer,
            reporter: Arc::new(TracingReporter),
        }
    }
}

impl<T: Transport, C: Clock> Lifecycle<T, C> {
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poller = self.poller.with_config(config);
        self
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> Lifecycle<T, C2> {
        Lifecycle {
            transport: self.transport,
            poller: self.poller.with_clock(clock),
            materializer: self.materializer,
            reporter: self.reporter,
        }
    }

    /// Route events from every stage to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.poller = self.poller.with_reporter(reporter.clone());
        self.materializer = self.materializer.with_reporter(reporter.clone());
        self.reporter = reporter;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.materializer = self.materializer.with_notifier(notifier);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn poller(&self) -> &Poller<C> {
        &self.poller
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Run one task end to end.
    ///
    /// Polling is skipped when the submission already carries a completed
    /// result. The first error from any stage is returned unchanged.
    pub async fn run(&self, endpoint: &TaskEndpoint, payload: &Value, opts: &RunOptions) -> Result<LifecycleOutcome> {
        let started = self.poller.clock().now();

        if let Some(text) = &opts.label {
            self.reporter.report(&LifecycleEvent::Label { text: text.clone() });
        }

        let submission = submit(&self.transport, &endpoint.create, payload).await?;
        let task_id = submission.task_id;
        if !task_id.is_empty() {
            self.reporter.report(&LifecycleEvent::TaskCreated {
                task_id: task_id.clone(),
            });
        }

        let artifacts = match submission.inline_artifacts {
            Some(artifacts) => {
                tracing::debug!(%task_id, "completed on submission, skipping poll");
                self.reporter.report(&LifecycleEvent::Completed {
                    task_id: task_id.clone(),
                    files: artifacts.len(),
                });
                artifacts
            }
            None if opts.skip_poll || opts.skip_download => {
                self.reporter.report(&LifecycleEvent::Detached {
                    task_id: task_id.clone(),
                    poll_endpoint: endpoint.poll.clone(),
                });
                return Ok(LifecycleOutcome::Detached {
                    task_id,
                    poll_endpoint: endpoint.poll.clone(),
                });
            }
            None => {
                let max_wait = opts.max_wait.unwrap_or(self.poller.config().max_wait);
                self.poller
                    .wait_for(&self.transport, &endpoint.poll, &task_id, max_wait)
                    .await?
                    .artifacts
            }
        };

        self.finish(task_id, artifacts, opts, started).await
    }

    /// Wait for an already-submitted task and download its artifacts.
    pub async fn resume(&self, poll_endpoint: &str, task_id: &str, opts: &RunOptions) -> Result<LifecycleOutcome> {
        let started = self.poller.clock().now();
        let max_wait = opts.max_wait.unwrap_or(self.poller.config().max_wait);
        let snapshot = self
            .poller
            .wait_for(&self.transport, poll_endpoint, task_id, max_wait)
            .await?;
        self.finish(task_id.to_string(), snapshot.artifacts, opts, started)
            .await
    }

    /// One status fetch, no waiting.
    pub async fn status(&self, poll_endpoint: &str, task_id: &str) -> Result<TaskSnapshot> {
        poll::status(&self.transport, poll_endpoint, task_id).await
    }

    async fn finish(
        &self,
        task_id: String,
        artifacts: Vec<Artifact>,
        opts: &RunOptions,
        started: Duration,
    ) -> Result<LifecycleOutcome> {
        if opts.skip_download {
            return Ok(LifecycleOutcome::Completed {
                task_id,
                artifacts,
                paths: Vec::new(),
            });
        }

        let paths = self
            .materializer
            .materialize(&artifacts, opts.output.as_deref())
            .await?;

        if let (Some(ctx), Some(first)) = (&opts.history, paths.first()) {
            let elapsed = self.poller.clock().now().saturating_sub(started);
            let notifier = self.materializer.notifier().clone();
            let entry = HistoryEntry {
                timestamp: chrono::Utc::now().to_rfc3339(),
                command: ctx.command.clone(),
                model: ctx.model.clone(),
                prompt: ctx.prompt.clone(),
                seed: ctx.seed,
                task_id: (!task_id.is_empty()).then(|| task_id.clone()),
                output_path: Some(first.display().to_string()),
                elapsed: Some(elapsed.as_millis() as u64),
            };
            run_blocking(move || notifier.history(entry)).await;
        }

        Ok(LifecycleOutcome::Completed {
            task_id,
            artifacts,
            paths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentReporter;
    use crate::poll::ManualClock;
    use crate::TaskError;
    use reqwest::Client;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        post_reply: Mutex<Option<Value>>,
        get_replies: Mutex<VecDeque<Value>>,
        gets: Mutex<usize>,
    }

    impl Scripted {
        fn new(post: Value, gets: Vec<Value>) -> Self {
            Self {
                post_reply: Mutex::new(Some(post)),
                get_replies: Mutex::new(gets.into()),
                gets: Mutex::new(0),
            }
        }
    }

    impl Transport for Scripted {
        async fn post(&self, _path: &str, _body: &Value) -> Result<Value> {
            Ok(self.post_reply.lock().unwrap().take().unwrap())
        }

        async fn get(&self, _path: &str) -> Result<Value> {
            *self.gets.lock().unwrap() += 1;
            Ok(self.get_replies.lock().unwrap().pop_front().unwrap())
        }
    }

    fn lifecycle(t: Scripted) -> Lifecycle<Scripted, ManualClock> {
        Lifecycle::new(t, Materializer::new(Client::new(), MaterializeConfig::default()))
            .with_clock(ManualClock::new())
            .with_reporter(Arc::new(SilentReporter))
    }

    #[tokio::test]
    async fn test_skip_download_detaches_without_polling() {
        let lc = lifecycle(Scripted::new(
            json!({"data": {"task_id": "abc", "status": "PENDING"}}),
            vec![],
        ));
        let ep = TaskEndpoint::new("/v1/create", "/v1/poll");
        let outcome = lc
            .run(&ep, &json!({}), &RunOptions::default().skip_download())
            .await
            .unwrap();
        match outcome {
            LifecycleOutcome::Detached { task_id, poll_endpoint } => {
                assert_eq!(task_id, "abc");
                assert_eq!(poll_endpoint, "/v1/poll");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*lc.transport().gets.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inline_completion_with_skip_download_returns_artifacts() {
        let lc = lifecycle(Scripted::new(
            json!({"data": {"task_id": "abc", "status": "COMPLETED", "generated": ["https://x/y.png"]}}),
            vec![],
        ));
        let outcome = lc
            .run(&TaskEndpoint::same("/v1/x"), &json!({}), &RunOptions::default().skip_download())
            .await
            .unwrap();
        match &outcome {
            LifecycleOutcome::Completed { artifacts, paths, .. } => {
                assert_eq!(artifacts.len(), 1);
                assert!(paths.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(outcome.task_id(), "abc");
        assert_eq!(*lc.transport().gets.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inline_completion_with_no_artifacts_downloads_nothing() {
        let lc = lifecycle(Scripted::new(
            json!({"data": {"task_id": "abc", "status": "COMPLETED", "generated": []}}),
            vec![],
        ));
        let outcome = lc
            .run(&TaskEndpoint::same("/v1/x"), &json!({}), &RunOptions::default())
            .await
            .unwrap();
        assert!(outcome.paths().is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_propagates() {
        let lc = lifecycle(Scripted::new(
            json!({"data": {"task_id": "abc", "status": "PENDING"}}),
            vec![json!({"data": {"task_id": "abc", "status": "FAILED"}})],
        ));
        let err = lc
            .run(&TaskEndpoint::same("/v1/x"), &json!({}), &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TaskFailed { .. }));
    }

    #[tokio::test]
    async fn test_per_run_max_wait() {
        let processing = json!({"data": {"task_id": "abc", "status": "PROCESSING"}});
        let lc = lifecycle(Scripted::new(
            json!({"data": {"task_id": "abc", "status": "PENDING"}}),
            vec![processing.clone(), processing.clone(), processing],
        ))
        .with_poll_config(PollConfig::default().with_interval(Duration::from_secs(1)));
        let err = lc
            .run(
                &TaskEndpoint::same("/v1/x"),
                &json!({}),
                &RunOptions::default().with_max_wait(Duration::from_secs(3)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TimedOut { .. }));
        assert_eq!(*lc.transport().gets.lock().unwrap(), 3);
    }

    #[test]
    fn test_history_context_builder() {
        let ctx = HistoryContext::new("generate")
            .with_model("flux-dev")
            .with_prompt("cat")
            .with_seed(7);
        assert_eq!(ctx.command, "generate");
        assert_eq!(ctx.seed, Some(7));
    }
}
