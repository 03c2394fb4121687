use std::future::Future;
use std::sync::{Arc, Mutex};

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::{json, Value};

use crate::config::{ClientConfig, API_KEY_HEADER};
use crate::error::{Result, TaskError};
use crate::types::RateLimitInfo;

const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Fields whose (usually base64) values are shortened in debug logs.
const BULKY_FIELDS: &[&str] = &["image", "image_url", "image_base64", "base64"];
const BULKY_KEEP: usize = 100;

/// The request seam used by submission and polling.
///
/// [`ApiClient`] is the HTTP implementation; tests substitute scripted ones.
pub trait Transport: Send + Sync {
    /// POST a JSON body to an API path and return the parsed response.
    fn post(&self, path: &str, body: &Value) -> impl Future<Output = Result<Value>> + Send;

    /// GET an API path and return the parsed response.
    fn get(&self, path: &str) -> impl Future<Output = Result<Value>> + Send;
}

/// Shared, last-write-wins snapshot of the rate-limit headers.
///
/// Every response overwrites it. It is read for display only and never
/// gates a request.
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    inner: Arc<Mutex<RateLimitInfo>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RateLimitInfo {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn record(&self, info: RateLimitInfo) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }
}

/// Authenticated JSON client for the generation API.
///
/// # Example
/// ```no_run
/// use genmedia_task::{ApiClient, ClientConfig, Transport};
///
/// # async fn example() -> genmedia_task::Result<()> {
/// let client = ApiClient::new(ClientConfig::builder().with_api_key("key").build())?;
/// let body = client.get("/v1/ai/text-to-image/flux-2-turbo").await?;
/// println!("{} remaining", client.rate_limit().remaining.unwrap_or(0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    rate_limit: RateLimitTracker,
}

impl ApiClient {
    /// Create a client from a [`ClientConfig`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TaskError::Network {
                context: "Failed to build HTTP client".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            rate_limit: RateLimitTracker::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, also used for artifact downloads.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Rate-limit headers from the most recent response.
    pub fn rate_limit(&self) -> RateLimitInfo {
        self.rate_limit.snapshot()
    }

    /// Issue one request and parse the body.
    ///
    /// Non-JSON bodies come back as `{"raw": text}`, empty bodies as `{}`.
    /// Non-2xx statuses become [`TaskError::RemoteApi`] carrying that body.
    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "api request");
        if let Some(b) = body {
            tracing::debug!(body = %redact_bulky(b), "request body");
        }

        let mut req = self
            .http
            .request(method, &url)
            .header(API_KEY_HEADER, &self.api_key);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| TaskError::Network {
            context: format!("Request to {} failed", url),
            source: e,
        })?;

        let info = parse_rate_limit(resp.headers());
        self.rate_limit.record(info);

        let status = resp.status();
        tracing::debug!(
            status = status.as_u16(),
            remaining = ?info.remaining,
            limit = ?info.limit,
            reset = ?info.reset_seconds,
            "api response"
        );

        let text = resp.text().await.map_err(|e| TaskError::Network {
            context: format!("Failed to read response from {}", url),
            source: e,
        })?;
        let data = parse_body(&text);

        if !status.is_success() {
            return Err(TaskError::RemoteApi {
                status: status.as_u16(),
                body: data,
            });
        }
        Ok(data)
    }
}

impl Transport for ApiClient {
    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None).await
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

fn parse_rate_limit(headers: &HeaderMap) -> RateLimitInfo {
    RateLimitInfo {
        limit: header_number(headers, RATE_LIMIT_LIMIT),
        remaining: header_number(headers, RATE_LIMIT_REMAINING),
        reset_seconds: header_number(headers, RATE_LIMIT_RESET),
    }
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Copy of `body` with long image payloads cut down for logging.
fn redact_bulky(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s)
                            if BULKY_FIELDS.contains(&k.as_str()) && s.len() > BULKY_KEEP =>
                        {
                            let cut: String = s.chars().take(BULKY_KEEP).collect();
                            Value::String(format!("{}...[truncated]", cut))
                        }
                        other => redact_bulky(other),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_bulky).collect()),
        other => other.clone(),
    }
}
