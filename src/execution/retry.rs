//! Bounded retry of fallible async operations

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// How long to keep retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most `max` invocations with `sleep` between them
    Attempts { max: usize, sleep: Duration },
    /// Invoke every `interval` until `timeout` has elapsed
    Deadline { timeout: Duration, interval: Duration },
}

impl RetryPolicy {
    pub fn attempts(max: usize, sleep: Duration) -> Self {
        RetryPolicy::Attempts { max, sleep }
    }

    pub fn deadline(timeout: Duration, interval: Duration) -> Self {
        RetryPolicy::Deadline { timeout, interval }
    }
}

/// Retry gave up
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    #[error("{label} timed out before success after {attempts} attempts ({elapsed:?}): {last}")]
    Exhausted {
        label: String,
        attempts: usize,
        elapsed: Duration,
        last: E,
    },

    #[error("{label} did not succeed within {timeout:?}{}", describe_last(.last))]
    TimedOut {
        label: String,
        timeout: Duration,
        last: Option<E>,
    },
}

impl<E: fmt::Display> RetryError<E> {
    /// The last error returned by the operation, if it ran at all
    pub fn last(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::TimedOut { last, .. } => last.as_ref(),
        }
    }
}

fn describe_last<E: fmt::Display>(last: &Option<E>) -> String {
    match last {
        Some(err) => format!(": {}", err),
        None => String::new(),
    }
}

/// Run `op` until it succeeds or `policy` is used up.
///
/// `op` receives the 1-based attempt number. Intermediate failures are only
/// logged at debug.
pub async fn retry<T, E, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    E: fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();

    match *policy {
        RetryPolicy::Attempts { max, sleep } => {
            let max = max.max(1);
            let mut attempt = 1;
            loop {
                match op(attempt).await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        debug!(label, attempt, error = %err, "attempt failed");
                        if attempt >= max {
                            return Err(RetryError::Exhausted {
                                label: label.to_string(),
                                attempts: attempt,
                                elapsed: start.elapsed(),
                                last: err,
                            });
                        }
                        info!(label, attempt, "waiting for {}: {:?} elapsed", label, start.elapsed());
                    }
                }
                tokio::time::sleep(sleep).await;
                attempt += 1;
            }
        }
        RetryPolicy::Deadline { timeout, interval } => {
            let deadline = start + timeout;
            let mut attempt = 1;
            let mut last = None;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RetryError::TimedOut {
                        label: label.to_string(),
                        timeout,
                        last,
                    });
                }
                match tokio::time::timeout(remaining, op(attempt)).await {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(err)) => {
                        debug!(label, attempt, error = %err, "attempt failed");
                        last = Some(err);
                    }
                    Err(_) => {
                        debug!(label, attempt, "attempt cut off by deadline");
                    }
                }
                tokio::time::sleep_until((Instant::now() + interval).min(deadline)).await;
                attempt += 1;
            }
        }
    }
}
