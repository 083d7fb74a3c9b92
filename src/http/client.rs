//! HTTP client for the upstream indexing API. Houses `ApiClient`, the
//! `FetchError` taxonomy, and the rate-limited retry loop every call runs
//! through.

use crate::http::auth::build_api_headers;
use crate::http::limiter::RateLimiter;
use crate::http::metrics::{ApiMetrics, ApiMetricsSnapshot};
use crate::http::options::FetchPolicy;
use crate::http::retry::{
    parse_retry_after, retry_delay, RetryContext, RetryDisposition, RetryMessages,
};
use anyhow::{anyhow, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const GENERIC_RETRY: RetryMessages = RetryMessages {
    permit: "rate limiter permit acquired",
    retry: "upstream request failed; retrying",
    exhausted: "upstream request exhausted retries",
    rejected: "upstream request rejected",
};

#[derive(Debug)]
pub enum FetchError {
    /// Connection, timeout, or body read failure.
    Network { url: String, source: reqwest::Error },
    /// 429 or a transient 5xx; `retry_after` carries the server hint.
    RetryableStatus {
        status: u16,
        retry_after: Option<Duration>,
    },
    /// Any other non-2xx status.
    ClientStatus { status: u16 },
    /// Successful HTTP status wrapping a non-zero envelope code.
    Application { code: i64, message: String },
    /// Body was not a JSON envelope.
    Decode { reason: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::RetryableStatus { .. }
        )
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network { url, source } => {
                write!(f, "network error calling {url}: {source}")
            }
            FetchError::RetryableStatus { status, .. } => {
                write!(f, "upstream returned retryable HTTP status {status}")
            }
            FetchError::ClientStatus { status } => {
                write!(f, "upstream returned HTTP status {status}")
            }
            FetchError::Application { code, message } => {
                write!(f, "upstream rejected request (code={code}): {message}")
            }
            FetchError::Decode { reason } => {
                write!(f, "upstream response is not a valid envelope: {reason}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Network { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Rate-limited JSON POST client. Cloning is cheap and every clone shares the
/// same limiter and metrics.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    limiter: Arc<RateLimiter>,
    metrics: Arc<ApiMetrics>,
}

impl ApiClient {
    pub fn new(limiter: Arc<RateLimiter>, api_key: Option<&str>) -> Result<Self> {
        let headers = build_api_headers(api_key)?;
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| anyhow!("failed to build HTTP client: {err}"))?;

        Ok(Self {
            http,
            limiter,
            metrics: Arc::new(ApiMetrics::default()),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> ApiMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// POSTs `payload` and returns the decoded envelope once its `code` is zero.
    pub async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        policy: &FetchPolicy,
    ) -> Result<Value> {
        self.post_with_context(url, payload, policy, RetryContext::new(&GENERIC_RETRY))
            .await
    }

    pub(crate) async fn post_with_context(
        &self,
        url: &str,
        payload: &Value,
        policy: &FetchPolicy,
        context: RetryContext<'_>,
    ) -> Result<Value> {
        policy.validate()?;
        let body = self
            .retry_with_limiter(policy, context, || {
                self.send_once(url, payload, policy.request_timeout)
            })
            .await?;

        tracing::debug!(url, "upstream request completed");
        Ok(body)
    }

    /// Shared retry loop: every attempt, retries included, first takes a
    /// limiter permit. Retryable failures sleep for the server hint or the
    /// capped backoff; everything else surfaces immediately.
    async fn retry_with_limiter<T, F, Fut>(
        &self,
        policy: &FetchPolicy,
        context: RetryContext<'_>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire().await;
            context.log_permit(attempt + 1);
            let start = Instant::now();

            let err = match operation().await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed());
                    return Ok(value);
                }
                Err(err) => err,
            };

            let elapsed = start.elapsed();
            match classify(&err) {
                RetryDisposition::Abort => {
                    self.metrics.record_failure(elapsed);
                    context.log_rejected(attempt + 1, &err);
                    return Err(err);
                }
                RetryDisposition::Retry { hint } => {
                    if matches!(
                        err.downcast_ref::<FetchError>(),
                        Some(FetchError::RetryableStatus { .. })
                    ) {
                        self.metrics.record_throttled(elapsed);
                    } else {
                        self.metrics.record_failure(elapsed);
                    }

                    if attempt >= policy.max_retries {
                        context.log_exhausted(attempt + 1, &err);
                        return Err(err);
                    }

                    let delay = retry_delay(policy, attempt, hint);
                    self.metrics.record_retry();
                    context.log_retry(attempt + 1, delay, &err, hint.is_some());
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, url: &str, payload: &Value, timeout: Duration) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if is_retryable_status(status) {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(FetchError::RetryableStatus {
                status: status.as_u16(),
                retry_after,
            }
            .into());
        }
        if !status.is_success() {
            return Err(FetchError::ClientStatus {
                status: status.as_u16(),
            }
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_owned(),
                source,
            })?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|err| FetchError::Decode {
            reason: err.to_string(),
        })?;

        check_envelope(body)
    }
}

fn classify(err: &anyhow::Error) -> RetryDisposition {
    match err.downcast_ref::<FetchError>() {
        Some(FetchError::RetryableStatus { retry_after, .. }) => RetryDisposition::Retry {
            hint: *retry_after,
        },
        Some(FetchError::Network { .. }) => RetryDisposition::Retry { hint: None },
        _ => RetryDisposition::Abort,
    }
}

/// Validates the `{code, message, data}` envelope and hands back the whole body.
pub(crate) fn check_envelope(body: Value) -> Result<Value> {
    let Some(envelope) = body.as_object() else {
        return Err(FetchError::Decode {
            reason: "expected a JSON object".to_owned(),
        }
        .into());
    };

    let code = match envelope.get("code") {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_i64().ok_or_else(|| FetchError::Decode {
            reason: format!("non-integer envelope code {value}"),
        })?,
    };

    if code != 0 {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Err(FetchError::Application { code, message }.into());
    }

    Ok(body)
}
