//! Fixed-delay retry, adapted from the pipeline client's `pipeline/retry.rs`
//! (same `RetryConfig`/`with_retry`/`IsRetryable` shape). The exponential
//! backoff variant that module carried for Lambda's AWS API quirks has no
//! counterpart here — the crash-mover always retries a fixed number of
//! times with a fixed delay (spec.md §4.5).

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Execute an async operation with retries. Only retries while
/// `is_retryable()` holds and attempts remain.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error: Option<E> = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                tracing::debug!(
                    attempt = attempt + 1,
                    max = attempts,
                    delay_ms = config.delay.as_millis() as u64,
                    "retrying crash-mover sink write after transient error"
                );
                last_error = Some(e);
                tokio::time::sleep(config.delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.expect("retry loop should have returned an error"))
}
