//! Fixed-delay retry shared by both deployment phases
//!
//! Each attempt runs strictly after the previous one has finished and the
//! delay has elapsed. The attempt number (1-based) is handed to the closure
//! so callers can log it or regenerate per-attempt state.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt bound and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Every attempt failed; carries the final error
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `operation` until it succeeds or `policy.max_attempts` attempts fail
///
/// All errors are retried. There is no jitter or growth; the delay is slept
/// only between attempts, never after the last one.
pub async fn retry_with_fixed_delay<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if attempt > 1 {
            debug!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = max_attempts,
                "Retrying operation"
            );
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if attempt < max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying after delay"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    error = %err,
                    "All retry attempts exhausted"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
        }
    }
}
