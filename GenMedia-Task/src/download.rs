use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::config::MaterializeConfig;
use crate::error::{Result, TaskError};
use crate::events::{LifecycleEvent, Reporter, TracingReporter};
use crate::naming::{default_filename, indexed_path};
use crate::notify::{NoopNotifier, Notifier};
use crate::types::Artifact;

const FALLBACK_EXTENSION: &str = ".png";
const MAX_RENAME_ATTEMPTS: usize = 9999;

/// Extension (with dot) for a known MIME type. Parameters such as
/// `; charset=...` are ignored.
pub fn mime_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some(".png"),
        "image/jpeg" => Some(".jpg"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        "video/mp4" => Some(".mp4"),
        "audio/mpeg" | "audio/mp3" => Some(".mp3"),
        "audio/wav" => Some(".wav"),
        _ => None,
    }
}

/// MIME type, then the URL path's extension, then `.png`.
pub fn guess_extension(url: &str, content_type: Option<&str>) -> String {
    if let Some(ext) = content_type.and_then(mime_extension) {
        return ext.to_string();
    }
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Writes a task's artifacts to local files.
///
/// One file per artifact, in remote order. The first failed download aborts
/// the rest of the set. Side effects on the [`Notifier`] run only after every
/// file is written.
pub struct Materializer {
    http: Client,
    config: MaterializeConfig,
    reporter: Arc<dyn Reporter>,
    notifier: Arc<dyn Notifier>,
}

impl Materializer {
    pub fn new(http: Client, config: MaterializeConfig) -> Self {
        Self {
            http,
            config,
            reporter: Arc::new(TracingReporter),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &MaterializeConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Download every artifact.
    ///
    /// With one artifact an explicit `base_path` is used exactly as given.
    /// With several, artifact `i` goes to `base_path` with `-{i}` before the
    /// extension. Without `base_path`, files get unique default names in the
    /// configured output directory. An empty list writes nothing and warns.
    pub async fn materialize(&self, artifacts: &[Artifact], base_path: Option<&Path>) -> Result<Vec<PathBuf>> {
        if artifacts.is_empty() {
            self.reporter.report(&LifecycleEvent::Warning {
                message: "No files to download".into(),
            });
            return Ok(Vec::new());
        }

        let many = artifacts.len() > 1;
        let mut paths = Vec::with_capacity(artifacts.len());

        for (i, artifact) in artifacts.iter().enumerate() {
            let index = many.then_some(i + 1);
            let dest = base_path.map(|base| match index {
                Some(n) => indexed_path(base, n),
                None => base.to_path_buf(),
            });
            let saved = self.fetch_to(artifact, dest.as_deref(), index).await?;
            self.reporter.report(&LifecycleEvent::Saved { path: saved.clone() });
            paths.push(saved);
        }

        let notifier = self.notifier.clone();
        let last = paths.last().cloned();
        let notice = run_blocking(move || {
            let notice = notifier.generation_recorded();
            if let Some(last) = last {
                notifier.output_saved(&last);
            }
            notice
        })
        .await
        .flatten();
        if let Some(message) = notice {
            self.reporter.report(&LifecycleEvent::Notice { message });
        }

        Ok(paths)
    }

    async fn fetch_to(&self, artifact: &Artifact, dest: Option<&Path>, index: Option<usize>) -> Result<PathBuf> {
        tracing::debug!(url = %artifact.url, "downloading artifact");

        let download_err = |reason: String| TaskError::Download {
            url: artifact.url.clone(),
            reason,
        };

        let resp = self
            .http
            .get(&artifact.url)
            .timeout(self.config.download_timeout)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(download_err(format!("HTTP {}", status)));
        }

        let header_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let content_type = artifact.content_type.as_deref().or(header_type.as_deref());
        let path = match dest {
            Some(path) => {
                ensure_parent(path).await?;
                tokio::fs::write(path, &bytes)
                    .await
                    .map_err(|source| TaskError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                path.to_path_buf()
            }
            None => {
                let ext = guess_extension(&artifact.url, content_type);
                let mut base = self
                    .config
                    .output_dir
                    .join(default_filename(&self.config.filename_prefix, &ext));
                if let Some(n) = index {
                    base = indexed_path(&base, n);
                }
                ensure_parent(&base).await?;
                write_new(&base, &bytes).await?
            }
        };

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact saved");
        Ok(path)
    }
}

/// Run notifier work on the blocking pool. A panic is logged, never raised.
pub(crate) async fn run_blocking<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "notifier task failed");
            None
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TaskError::Io {
                path: parent.to_path_buf(),
                source,
            }),
        _ => Ok(()),
    }
}

/// Write to `path`, or to `path` with `-{k}` inserted if it already exists.
/// Never overwrites.
async fn write_new(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let mut candidate = path.to_path_buf();
    for attempt in 0..=MAX_RENAME_ATTEMPTS {
        if attempt > 0 {
            candidate = indexed_path(path, attempt);
        }
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(TaskError::Io {
                    path: candidate,
                    source,
                })
            }
        };
        let io_err = |source: std::io::Error| TaskError::Io {
            path: candidate.clone(),
            source,
        };
        file.write_all(bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        return Ok(candidate);
    }
    Err(TaskError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free file name after 9999 attempts",
        ),
    })
}
