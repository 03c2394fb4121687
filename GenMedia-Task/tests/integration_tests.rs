//! End-to-end lifecycle behavior against a mock API server.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use genmedia_task::{
    ApiClient, ClientConfig, Clock, ConfigStore, HistoryContext, HistoryEntry, Lifecycle,
    LifecycleEvent, LifecycleOutcome, ManualClock, MaterializeConfig, Notifier, PollConfig,
    Reporter, RunOptions, StoreNotifier, TaskEndpoint, TaskError,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MYSTIC: &str = "/v1/ai/mystic";

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for Recorder {
    fn report(&self, event: &LifecycleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
struct CountingNotifier {
    saved: Mutex<Vec<PathBuf>>,
    generations: AtomicUsize,
    history: Mutex<Vec<HistoryEntry>>,
}

impl Notifier for CountingNotifier {
    fn output_saved(&self, path: &Path) {
        self.saved.lock().unwrap().push(path.to_path_buf());
    }

    fn generation_recorded(&self) -> Option<String> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn history(&self, entry: HistoryEntry) {
        self.history.lock().unwrap().push(entry);
    }
}

fn lifecycle(server: &MockServer, out: &Path) -> Lifecycle<ApiClient, ManualClock> {
    let client = ApiClient::new(
        ClientConfig::builder()
            .with_base_url(server.uri())
            .with_api_key("test-key")
            .build(),
    )
    .unwrap();
    Lifecycle::for_client(client, MaterializeConfig::default().with_output_dir(out))
        .with_clock(ManualClock::new())
        .with_reporter(Arc::new(genmedia_task::SilentReporter))
}

fn task(status: &str) -> serde_json::Value {
    json!({"data": {"task_id": "abc", "status": status}})
}

async fn mount_create(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(MYSTIC))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, file: &str, bytes: &[u8], content_type: &str) {
    Mock::given(method("GET"))
        .and(path(file))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes.to_vec())
                .insert_header("content-type", content_type),
        )
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, p: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == p)
        .count()
}

#[tokio::test]
async fn test_pending_processing_completed_downloads_one_png() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(MYSTIC))
        .and(header("x-freepik-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task("PENDING")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task("PROCESSING")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [format!("{}/files/y.png", server.uri())]
        }})))
        .mount(&server)
        .await;
    mount_file(&server, "/files/y.png", b"\x89PNG", "image/png").await;

    let lc = lifecycle(&server, out.path());
    let outcome = lc
        .run(&TaskEndpoint::same(MYSTIC), &json!({"prompt": "cat"}), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(requests_to(&server, "/v1/ai/mystic/abc").await, 2);
    let paths = outcome.paths();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].extension().unwrap(), "png");
    assert!(paths[0].starts_with(out.path()));
    assert_eq!(std::fs::read(&paths[0]).unwrap(), b"\x89PNG");
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_stuck_task_times_out_at_max_wait() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(&server, task("PENDING")).await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task("PROCESSING")))
        .mount(&server)
        .await;

    let lc = lifecycle(&server, out.path())
        .with_poll_config(PollConfig::default().with_interval(Duration::from_secs(2)));
    let err = lc
        .run(
            &TaskEndpoint::same(MYSTIC),
            &json!({}),
            &RunOptions::default().with_max_wait(Duration::from_secs(10)),
        )
        .await
        .unwrap_err();

    match &err {
        TaskError::TimedOut {
            task_id,
            poll_endpoint,
            ..
        } => {
            assert_eq!(task_id, "abc");
            assert_eq!(poll_endpoint, MYSTIC);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("status abc --endpoint /v1/ai/mystic"));
    assert!(lc.poller().clock().now() >= Duration::from_secs(10));
    // Polled at 0, 2, 4, 6 and 8 seconds.
    assert_eq!(requests_to(&server, "/v1/ai/mystic/abc").await, 5);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_mime_type_beats_url_extension() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [{"url": format!("{}/files/y.png", server.uri()), "content_type": "image/webp"}]
        }}),
    )
    .await;
    mount_file(&server, "/files/y.png", b"RIFF", "application/octet-stream").await;

    let outcome = lifecycle(&server, out.path())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.paths()[0].extension().unwrap(), "webp");
    assert_eq!(requests_to(&server, "/v1/ai/mystic/abc").await, 0);
}

#[tokio::test]
async fn test_response_content_type_used_when_artifact_has_none() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [format!("{}/files/render", server.uri())]
        }}),
    )
    .await;
    mount_file(&server, "/files/render", b"\xff\xd8", "image/jpeg").await;

    let outcome = lifecycle(&server, out.path())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.paths()[0].extension().unwrap(), "jpg");
}

#[tokio::test]
async fn test_multiple_artifacts_fan_out_in_order() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [
                format!("{}/files/first.png", server.uri()),
                {"url": format!("{}/files/second.png", server.uri())},
                format!("{}/files/third.png", server.uri())
            ]
        }}),
    )
    .await;
    mount_file(&server, "/files/first.png", b"1", "image/png").await;
    mount_file(&server, "/files/second.png", b"2", "image/png").await;
    mount_file(&server, "/files/third.png", b"3", "image/png").await;

    let base = out.path().join("cat.png");
    let outcome = lifecycle(&server, out.path())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default().with_output(&base))
        .await
        .unwrap();

    let expected: Vec<PathBuf> = (1..=3).map(|i| out.path().join(format!("cat-{}.png", i))).collect();
    assert_eq!(outcome.paths(), expected.as_slice());
    for (i, p) in expected.iter().enumerate() {
        assert_eq!(std::fs::read_to_string(p).unwrap(), (i + 1).to_string());
    }
    assert!(!base.exists());
}

#[tokio::test]
async fn test_single_artifact_uses_explicit_path_exactly() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [{"url": format!("{}/files/y.png", server.uri()), "content_type": "image/webp"}]
        }}),
    )
    .await;
    mount_file(&server, "/files/y.png", b"data", "image/png").await;

    let explicit = out.path().join("sub").join("my-render");
    let outcome = lifecycle(&server, out.path())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default().with_output(&explicit))
        .await
        .unwrap();

    assert_eq!(outcome.paths(), &[explicit.clone()]);
    assert_eq!(std::fs::read(&explicit).unwrap(), b"data");
}

#[tokio::test]
async fn test_empty_result_warns_and_writes_nothing() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(&server, task("PENDING")).await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
            "task_id": "abc", "status": "COMPLETED", "generated": []
        }})))
        .mount(&server)
        .await;

    let recorder = Arc::new(Recorder::default());
    let notifier = Arc::new(CountingNotifier::default());
    let outcome = lifecycle(&server, out.path())
        .with_reporter(recorder.clone())
        .with_notifier(notifier.clone())
        .run(
            &TaskEndpoint::same(MYSTIC),
            &json!({}),
            &RunOptions::default().with_history(HistoryContext::new("generate")),
        )
        .await
        .unwrap();

    assert!(outcome.paths().is_empty());
    assert!(recorder
        .events()
        .iter()
        .any(|e| matches!(e, LifecycleEvent::Warning { .. })));
    assert_eq!(notifier.generations.load(Ordering::SeqCst), 0);
    assert!(notifier.history.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_side_effects_run_once_per_run() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(&server, task("PENDING")).await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [
                format!("{}/files/a.png", server.uri()),
                format!("{}/files/b.png", server.uri())
            ]
        }})))
        .mount(&server)
        .await;
    mount_file(&server, "/files/a.png", b"a", "image/png").await;
    mount_file(&server, "/files/b.png", b"b", "image/png").await;

    let notifier = Arc::new(CountingNotifier::default());
    let outcome = lifecycle(&server, out.path())
        .with_notifier(notifier.clone())
        .run(
            &TaskEndpoint::same(MYSTIC),
            &json!({}),
            &RunOptions::default().with_history(
                HistoryContext::new("generate")
                    .with_model("mystic")
                    .with_seed(11),
            ),
        )
        .await
        .unwrap();

    assert_eq!(outcome.paths().len(), 2);
    assert_eq!(notifier.generations.load(Ordering::SeqCst), 1);
    assert_eq!(*notifier.saved.lock().unwrap(), vec![outcome.paths()[1].clone()]);

    let history = notifier.history.lock().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id.as_deref(), Some("abc"));
    assert_eq!(history[0].seed, Some(11));
    assert_eq!(
        history[0].output_path.as_deref(),
        Some(outcome.paths()[0].display().to_string().as_str())
    );
}

#[tokio::test]
async fn test_download_failure_aborts_remaining_artifacts() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [
                format!("{}/files/missing.png", server.uri()),
                format!("{}/files/ok.png", server.uri())
            ]
        }}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_file(&server, "/files/ok.png", b"ok", "image/png").await;

    let notifier = Arc::new(CountingNotifier::default());
    let err = lifecycle(&server, out.path())
        .with_notifier(notifier.clone())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        TaskError::Download { url, reason } => {
            assert!(url.ends_with("/files/missing.png"));
            assert!(reason.contains("404"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(requests_to(&server, "/files/ok.png").await, 0);
    assert_eq!(notifier.generations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_error_response_still_updates_rate_limit() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(MYSTIC))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"message": "Too many requests"}))
                .insert_header("x-ratelimit-limit", "60")
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "17"),
        )
        .mount(&server)
        .await;

    let lc = lifecycle(&server, out.path());
    let err = lc
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(429));
    assert_eq!(err.to_string(), "Too many requests");
    let limits = lc.transport().rate_limit();
    assert_eq!(limits.limit, Some(60));
    assert_eq!(limits.remaining, Some(0));
    assert_eq!(limits.reset_seconds, Some(17));
}

#[tokio::test]
async fn test_non_json_error_body_is_wrapped() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(MYSTIC))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = lifecycle(&server, out.path())
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        TaskError::RemoteApi { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, json!({"raw": "Bad Gateway"}));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_skip_download_returns_resumable_handle() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(&server, task("PROCESSING")).await;
    Mock::given(method("GET"))
        .and(path("/v1/ai/mystic/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [format!("{}/files/y.png", server.uri())]
        }})))
        .mount(&server)
        .await;
    mount_file(&server, "/files/y.png", b"y", "image/png").await;

    let lc = lifecycle(&server, out.path());
    let outcome = lc
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default().skip_download())
        .await
        .unwrap();
    let (task_id, poll_endpoint) = match outcome {
        LifecycleOutcome::Detached {
            task_id,
            poll_endpoint,
        } => (task_id, poll_endpoint),
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(requests_to(&server, "/v1/ai/mystic/abc").await, 0);

    let snapshot = lc.status(&poll_endpoint, &task_id).await.unwrap();
    assert!(snapshot.status.is_terminal());

    let resumed = lc
        .resume(&poll_endpoint, &task_id, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(resumed.paths().len(), 1);
}

#[tokio::test]
async fn test_store_notifier_records_last_output() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let cfg = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [format!("{}/files/y.png", server.uri())]
        }}),
    )
    .await;
    mount_file(&server, "/files/y.png", b"y", "image/png").await;

    let store = Arc::new(ConfigStore::new(cfg.path()));
    let outcome = lifecycle(&server, out.path())
        .with_notifier(Arc::new(StoreNotifier::new(store.clone())))
        .run(
            &TaskEndpoint::same(MYSTIC),
            &json!({}),
            &RunOptions::default().with_history(HistoryContext::new("run")),
        )
        .await
        .unwrap();

    assert_eq!(store.last_output_path().as_deref(), Some(outcome.paths()[0].as_path()));
    assert_eq!(store.load().generations, 1);
    let history = genmedia_task::read_history(&store.history_path());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].command, "run");
}

fn slow_download_lifecycle(server: &MockServer, out: &Path, download_timeout: Duration) -> Lifecycle<ApiClient, ManualClock> {
    let client = ApiClient::new(
        ClientConfig::builder()
            .with_base_url(server.uri())
            .with_api_key("test-key")
            .with_request_timeout(Duration::from_millis(300))
            .build(),
    )
    .unwrap();
    let config = MaterializeConfig::default()
        .with_output_dir(out)
        .with_download_timeout(download_timeout);
    Lifecycle::for_client(client, config)
        .with_clock(ManualClock::new())
        .with_reporter(Arc::new(genmedia_task::SilentReporter))
}

async fn mount_slow_clip(server: &MockServer) {
    mount_create(
        server,
        json!({"data": {
            "task_id": "vid",
            "status": "COMPLETED",
            "generated": [format!("{}/files/clip.mp4", server.uri())]
        }}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/clip.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"mp4".to_vec())
                .insert_header("content-type", "video/mp4")
                .set_delay(Duration::from_millis(600)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_download_outlives_api_request_timeout() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_slow_clip(&server).await;

    let outcome = slow_download_lifecycle(&server, out.path(), Duration::from_secs(10))
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap();

    let saved = &outcome.paths()[0];
    assert_eq!(saved.extension().unwrap(), "mp4");
    assert_eq!(std::fs::read(saved).unwrap(), b"mp4");
}

#[tokio::test]
async fn test_download_timeout_is_enforced() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_slow_clip(&server).await;

    let err = slow_download_lifecycle(&server, out.path(), Duration::from_millis(100))
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Download { .. }));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_status_less_poll_response_keeps_waiting() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(&server, task("PENDING")).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/abc", MYSTIC)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"task_id": "abc"}})))
        .mount(&server)
        .await;

    let err = lifecycle(&server, out.path())
        .with_poll_config(
            PollConfig::default()
                .with_interval(Duration::from_secs(2))
                .with_max_wait(Duration::from_secs(6)),
        )
        .run(&TaskEndpoint::same(MYSTIC), &json!({}), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::TimedOut { .. }));
    assert_eq!(requests_to(&server, "/v1/ai/mystic/abc").await, 3);
}

/// Records which thread each side effect ran on.
#[derive(Default)]
struct ThreadNotifier {
    threads: Mutex<Vec<std::thread::ThreadId>>,
}

impl Notifier for ThreadNotifier {
    fn output_saved(&self, _path: &Path) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }

    fn generation_recorded(&self) -> Option<String> {
        self.threads.lock().unwrap().push(std::thread::current().id());
        None
    }

    fn history(&self, _entry: HistoryEntry) {
        self.threads.lock().unwrap().push(std::thread::current().id());
    }
}

#[tokio::test]
async fn test_side_effects_run_off_the_runtime_thread() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_create(
        &server,
        json!({"data": {
            "task_id": "abc",
            "status": "COMPLETED",
            "generated": [format!("{}/files/y.png", server.uri())]
        }}),
    )
    .await;
    mount_file(&server, "/files/y.png", b"y", "image/png").await;

    let notifier = Arc::new(ThreadNotifier::default());
    lifecycle(&server, out.path())
        .with_notifier(notifier.clone())
        .run(
            &TaskEndpoint::same(MYSTIC),
            &json!({}),
            &RunOptions::default().with_history(HistoryContext::new("run")),
        )
        .await
        .unwrap();

    let runtime_thread = std::thread::current().id();
    let threads = notifier.threads.lock().unwrap();
    assert_eq!(threads.len(), 3);
    assert!(threads.iter().all(|t| *t != runtime_thread));
}
