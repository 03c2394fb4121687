use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://api.freepik.com";

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "x-freepik-api-key";

/// Environment variable that overrides the persisted API key.
pub const API_KEY_ENV: &str = "GENMEDIA_API_KEY";

/// Connection settings for [`ApiClient`](crate::ApiClient).
///
/// Use [`ClientConfig::builder()`] for construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API host, without a trailing slash.
    pub base_url: String,

    /// Value sent in the API key header.
    pub api_key: String,

    /// Per-request timeout (applies to API calls and artifact downloads).
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Point the client at a different host (e.g. a mock server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Poll timing. Every interval is identical; there is no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
            max_wait: Duration::from_millis(300_000),
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Default limit for one artifact download, headers through last byte.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Where default-named artifacts go, and how long a download may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeConfig {
    pub output_dir: PathBuf,
    pub filename_prefix: String,
    /// Replaces the API client's request timeout for artifact downloads,
    /// which can be far larger than API responses.
    pub download_timeout: Duration,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            filename_prefix: "genmedia".to_string(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl MaterializeConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

/// Contents of the persisted settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub generations: u64,
    pub notice_shown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output_path: Option<PathBuf>,
}

/// JSON settings file plus the history log next to it.
///
/// Reads never fail: a missing or corrupt file is treated as empty.
/// Updates within one process are serialized; across processes the last
/// writer wins.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Store rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<platform config dir>/genmedia`.
    pub fn default_location() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| TaskError::Config("Cannot determine config directory".into()))?;
        Ok(Self::new(base.join("genmedia")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("history.jsonl")
    }

    pub fn load(&self) -> Settings {
        std::fs::read_to_string(self.config_path())
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(settings)
    }

    /// Load, modify and save under the store's write lock.
    pub fn update<F>(&self, f: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut settings = self.load();
        f(&mut settings);
        self.write(&settings)?;
        Ok(settings)
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        let path = self.config_path();
        std::fs::create_dir_all(&self.dir).map_err(|source| TaskError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut text = serde_json::to_string_pretty(settings)?;
        text.push('\n');
        std::fs::write(&path, text).map_err(|source| TaskError::Io { path, source })
    }

    /// API key from `GENMEDIA_API_KEY`, falling back to the settings file.
    pub fn api_key(&self) -> Result<String> {
        self.api_key_with_env(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_env(&self, env_value: Option<String>) -> Result<String> {
        if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
            return Ok(key);
        }
        self.load()
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                TaskError::Config(format!(
                    "No API key found. Set {} or add \"apiKey\" to {}",
                    API_KEY_ENV,
                    self.config_path().display()
                ))
            })
    }

    /// Configured output directory, or the current directory.
    pub fn output_dir(&self) -> PathBuf {
        self.load().output_dir.unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path of the most recently saved artifact, if any.
    pub fn last_output_path(&self) -> Option<PathBuf> {
        self.load().last_output_path
    }
}

/// Show only the first and last four characters of a key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
