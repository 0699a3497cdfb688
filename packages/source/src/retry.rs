//! HTTP retry helpers for transient errors.
//!
//! Every adapter should use [`send_text`] or [`send_bytes`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so that all requests
//! get the same retry and error classification.
//!
//! # Usage
//!
//! ```ignore
//! use crate::retry;
//!
//! let csv = retry::send_text(|| client.get(url).header(ACCEPT, accept), policy).await?;
//! let xlsx = retry::send_bytes(|| client.get(url), policy).await?;
//! ```

use std::time::Duration;

use crate::SourceError;

/// Retry behaviour for one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one fails transiently.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Retry behaviour
///
/// Connection errors, timeouts, HTTP 429, and HTTP 5xx are retried up to
/// `policy.max_retries` times with exponential backoff. A failed body read
/// re-sends the whole request. HTTP 4xx (except 429) is permanent.
///
/// # Errors
///
/// Returns [`SourceError::Timeout`], [`SourceError::Status`], or
/// [`SourceError::Http`] once retries are exhausted.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: &RetryPolicy) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = send_inner(&build_request, policy).await?;
        let url = response.url().to_string();
        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < policy.max_retries && is_transient(&e) => {
                attempt += 1;
                log::warn!("  body read failed for {url}: {e}, re-fetching");
                tokio::time::sleep(policy.delay(attempt)).await;
            }
            Err(e) => return Err(classify(e, &url)),
        }
    }
}

/// Sends an HTTP request and returns the raw response body.
///
/// Behaves identically to [`send_text`]; used for binary downloads such as
/// spreadsheets.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(build_request: F, policy: &RetryPolicy) -> Result<Vec<u8>, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = send_inner(&build_request, policy).await?;
        let url = response.url().to_string();
        match response.bytes().await {
            Ok(bytes) => return Ok(bytes.to_vec()),
            Err(e) if attempt < policy.max_retries && is_transient(&e) => {
                attempt += 1;
                log::warn!("  body read failed for {url}: {e}, re-fetching");
                tokio::time::sleep(policy.delay(attempt)).await;
            }
            Err(e) => return Err(classify(e, &url)),
        }
    }
}

/// Core retry loop shared by [`send_text`] and [`send_bytes`].
///
/// Returns the first response with a 2xx or 3xx status.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                let url = e.url().map_or_else(String::new, ToString::to_string);
                return Err(classify(e, &url));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {}", response.url());
                        attempt += 1;
                        continue;
                    }
                    return Err(status_error(&response));
                }

                // 4xx other than 429 is permanent
                if status.is_client_error() {
                    return Err(status_error(&response));
                }

                return Ok(response);
            }
        }
    }
}

fn status_error(response: &reqwest::Response) -> SourceError {
    SourceError::Status {
        url: response.url().to_string(),
        status: response.status().as_u16(),
    }
}

fn classify(e: reqwest::Error, url: &str) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout {
            url: url.to_string(),
        }
    } else {
        SourceError::Http(e)
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
