//! Retry loop for lookup requests and classification of the errors it sees.

use log::{debug, warn};
use reqwest::StatusCode;
use std::error::Error as _;
use std::future::Future;

use crate::config::RetryPolicy;

/// Every way a single lookup attempt can fail.
#[derive(Debug)]
pub enum FetchError {
    /// The service answered with a non-2xx status
    Status(StatusCode),
    /// DNS, connect, timeout or body read failure
    Transport(String),
    /// 2xx response whose body is not the expected JSON object
    InvalidBody(String),
    /// 2xx JSON response lacking one or more required fields
    IncompleteData { missing: Vec<&'static str> },
}

impl FetchError {
    /// Transient failures go back through the retry loop. A well-formed reply
    /// with bad content will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Status(_) | FetchError::Transport(_))
    }

    /// Status code for log lines, `N/A` when the request never got one.
    pub fn status_label(&self) -> String {
        match self {
            FetchError::Status(status) => status.as_u16().to_string(),
            _ => "N/A".to_string(),
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Status(status) => write!(f, "HTTP {}", status),
            FetchError::Transport(msg) => write!(f, "Request failed: {}", msg),
            FetchError::InvalidBody(msg) => write!(f, "Invalid location response: {}", msg),
            FetchError::IncompleteData { missing } => {
                write!(f, "Incomplete location data (missing {})", missing.join(", "))
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        classify_error(error)
    }
}

/// Maps a reqwest error onto [`FetchError`].
///
/// The URL is stripped first: it carries the API token as a query parameter
/// and the message ends up in logs and in the failure result.
pub fn classify_error(error: reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return FetchError::Status(status);
    }

    let error = error.without_url();
    let mut message = if error.is_timeout() {
        "operation timed out".to_string()
    } else {
        error.to_string()
    };

    let mut source = error.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    FetchError::Transport(message)
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made. Sleeps `policy.delay`
/// between attempts. The 1-based attempt number is passed to `operation`.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                debug!("{}: non-retryable error: {}", operation_name, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed (status {}): {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    e.status_label(),
                    e
                );

                if attempt >= max_attempts {
                    return Err(e);
                }

                debug!("{}: retrying in {:?}...", operation_name, policy.delay);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
