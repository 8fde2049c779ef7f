//! Retry logic with exponential backoff
//!
//! Download attempts are repeated with exponential backoff and optional
//! jitter. The attempt bound is a configuration knob: `max_attempts: None`
//! retries indefinitely, matching the pipeline's historical behavior.

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server errors, interrupted writes)
/// should return `true`. Permanent failures should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        // Every fetch failure is transient from the worker's point of view:
        // the partial file has been removed and the token may have rotated
        // since the attempt started. Authorization failures are retried too;
        // they only become permanent if the refresher has died, which the
        // caller observes as an unending retry sequence.
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { .. } => true,
            FetchError::Write { .. } => true,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the first success, or the last error once the error is
/// non-retryable or the configured attempt bound is reached. With
/// `max_attempts: None` a retryable error never escapes this function.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e)
                if e.is_retryable() && config.max_attempts.map_or(true, |max| attempt < max) =>
            {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
