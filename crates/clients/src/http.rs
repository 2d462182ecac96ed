//! Shared blocking HTTP plumbing: client construction and the retry loop.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::error::ClientError;

// ── Constants ───────────────────────────────────────────────────────

pub const USER_AGENT: &str = concat!("aedsync/", env!("CARGO_PKG_VERSION"));

/// Statuses worth another attempt. Everything else fails immediately.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

const MAX_ERROR_BODY_CHARS: usize = 300;

// ── Retry policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt. Used for non-idempotent writes.
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self { max_retries, ..self }
    }

    /// Backoff before retry number `attempt + 1`: base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build HTTP client")
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Send with retry and exponential backoff.
///
/// `build_request` is called once per attempt. Returns the first response
/// whose status is not retryable, which may still be a 4xx; pair with
/// [`ensure_success`] when the caller has no status-specific handling.
pub fn send_with_retry(
    service: &str,
    policy: &RetryPolicy,
    build_request: impl Fn() -> RequestBuilder,
) -> Result<Response, ClientError> {
    let mut attempt = 0u32;
    loop {
        let outcome = build_request().send();
        let exhausted = attempt >= policy.max_retries;

        let wait = match outcome {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !RETRYABLE_STATUS.contains(&status) {
                    return Ok(resp);
                }
                if exhausted {
                    let body = resp.text().unwrap_or_default();
                    return Err(ClientError::Http(
                        status,
                        format!("{} after {} attempts", trim_body(&body), attempt + 1),
                    ));
                }
                let backoff = policy.delay_for(attempt);
                let wait = if status == 429 {
                    retry_after(&resp).map_or(backoff, |d| d.min(policy.max_delay))
                } else {
                    backoff
                };
                log::warn!(
                    "{service}: retry {}/{} in {:?} (HTTP {status})",
                    attempt + 1,
                    policy.max_retries,
                    wait
                );
                wait
            }
            Err(e) => {
                if exhausted || !is_transient(&e) {
                    return Err(ClientError::Network(format!("{service}: {e}")));
                }
                let wait = policy.delay_for(attempt);
                log::warn!(
                    "{service}: retry {}/{} in {:?} ({e})",
                    attempt + 1,
                    policy.max_retries,
                    wait
                );
                wait
            }
        };

        thread::sleep(wait);
        attempt += 1;
    }
}

/// Map a non-2xx response to an error; 401/403 become [`ClientError::Auth`].
pub fn ensure_success(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    let body = resp.text().unwrap_or_default();
    if code == 401 || code == 403 {
        return Err(ClientError::Auth(format!("HTTP {code}: {}", trim_body(&body))));
    }
    Err(ClientError::Http(code, trim_body(&body)))
}

pub(crate) fn trim_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}
