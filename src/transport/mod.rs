//! HTTP transport for the session backend.
//!
//! Every call carries a fresh `X-Request-Id`, is bounded by a timeout, and
//! fails with a classified [`ApiError`]. Only idempotent reads are retried.

pub mod retry;
pub mod trace;

pub use retry::RetryPolicy;
pub use trace::{REQUEST_ID_HEADER, RequestTrace};

use crate::error::ApiError;
use crate::util::truncate_with_ellipsis;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest error body kept in a failure message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Per-call knobs layered over the client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    /// Overrides the retry budget for idempotent calls. Mutations never retry.
    pub max_retries: Option<u32>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), format!("Bearer {token}"))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.max_retries = Some(0);
        self
    }
}

/// `{error, message}` body returned by the backend on failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct TransportClient {
    http: Client,
    base_url: String,
    default_timeout: Duration,
    retry: RetryPolicy,
}

impl TransportClient {
    pub fn new(
        base_url: &str,
        default_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        Url::parse(trimmed)
            .map_err(|e| ApiError::Config(format!("invalid base url '{base_url}': {e}")))?;

        let http = Client::builder()
            .connect_timeout(default_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: trimmed.to_string(),
            default_timeout,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        self.execute(Method::POST, path, body, options).await
    }

    /// Issue one logical call, retrying transient failures of idempotent methods.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<T, ApiError> {
        let trace = RequestTrace::new(method, path);
        let url = self.url(path);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let policy = if trace.is_idempotent() {
            self.retry
                .with_max_retries(options.max_retries.unwrap_or(self.retry.max_retries))
        } else {
            RetryPolicy::single_attempt()
        };

        tracing::debug!(
            request_id = %trace.id,
            method = %trace.method,
            path = %trace.path,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Request start"
        );

        policy
            .run(&trace, |attempt| {
                let body = body.as_ref();
                let trace = &trace;
                let url = url.as_str();
                async move {
                    let text = self
                        .attempt(trace, url, body, options, timeout, attempt)
                        .await?;
                    serde_json::from_str::<T>(&text).map_err(|e| {
                        ApiError::Decode(format!("{} {}: {e}", trace.method, trace.path))
                    })
                }
            })
            .await
    }

    /// Single GET without retries; returns the parsed body when it is JSON.
    pub async fn probe(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let trace = RequestTrace::new(Method::GET, path);
        let url = self.url(path);
        let options = RequestOptions::default().no_retry();
        let text = self
            .attempt(&trace, &url, None, &options, timeout, 0)
            .await?;
        Ok(serde_json::from_str(&text).ok())
    }

    /// One network exchange. The whole exchange (send and body read) is bounded
    /// by `timeout`; on expiry the in-flight future is dropped, which cancels it.
    async fn attempt(
        &self,
        trace: &RequestTrace,
        url: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
        timeout: Duration,
        attempt: u32,
    ) -> Result<String, ApiError> {
        let mut request = self
            .http
            .request(trace.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, trace.id.as_str());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::trace!(request_id = %trace.id, attempt, url, "Sending request");

        let exchange = async {
            let response = request.send().await.map_err(classify_reqwest_error)?;
            read_body(response).await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        return ApiError::Config(err.to_string());
    }
    ApiError::Network(err.to_string())
}

/// Success → body text. Failure → classified error with the best available message.
async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read response body: {e}")));
    }

    let code = status.as_u16();
    let message = match response.text().await {
        Ok(text) => error_message(code, &text),
        Err(_) => format!("HTTP {code}"),
    };
    Err(ApiError::from_status(code, message))
}

/// Message for a failed response: structured `{error, message}` body first,
/// raw text second, `HTTP {status}` when there is nothing to show.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if !parsed.message.trim().is_empty() {
            return parsed.message;
        }
        if !parsed.error.trim().is_empty() {
            return parsed.error;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        truncate_with_ellipsis(trimmed, MAX_ERROR_BODY_CHARS)
    }
}
