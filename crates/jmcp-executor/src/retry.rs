use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jmcp_core::{AppError, RetryPolicy, UpstreamError};
use tracing::{debug, warn};

/// Successful result and how many calls it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last error once retries are exhausted or the error is not retryable.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: u32,
}

impl RetryFailure<UpstreamError> {
    pub fn into_app_error(self) -> AppError {
        AppError::from_upstream(self.error, self.attempts)
    }
}

/// Reads are idempotent: connection failures, timeouts and 5xx are retried.
pub fn is_retryable_read(err: &UpstreamError) -> bool {
    err.is_transient()
}

/// Triggers are not idempotent: only retry failures where the build is
/// known not to have been queued.
pub fn is_retryable_trigger(err: &UpstreamError) -> bool {
    err.is_known_unapplied()
}

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sleep before retry `attempt_index` (0-based).
    fn backoff(&self, attempt_index: u32) -> Duration {
        let delay = self.policy.delay_for(attempt_index);
        if self.policy.jitter {
            jittered(delay)
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or `max_retries` retries have been spent.
    ///
    /// `label` names the call in log lines.
    pub async fn execute<T, E, F, Fut, R>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: R,
    ) -> Result<RetryOutcome<T>, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(label, attempts, "call succeeded after retry");
                    }
                    return Ok(RetryOutcome { value, attempts });
                }
                Err(error) => error,
            };

            let retries_used = attempts - 1;
            if !is_retryable(&error) || retries_used >= self.policy.max_retries {
                if retries_used > 0 {
                    warn!(label, attempts, error = %error, "giving up");
                }
                return Err(RetryFailure { error, attempts });
            }

            let delay = self.backoff(retries_used);
            warn!(
                label,
                attempt = attempts,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// [`execute`](Self::execute) with the read predicate, mapped into the
    /// application error taxonomy.
    pub async fn read<T, F, Fut>(&self, label: &str, operation: F) -> Result<RetryOutcome<T>, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        self.execute(label, operation, is_retryable_read)
            .await
            .map_err(RetryFailure::into_app_error)
    }
}

/// Randomize `delay` downward by up to half, so it never exceeds the
/// unjittered value (and therefore `max_delay`).
fn jittered(delay: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let fraction = f64::from(nanos) / 1_000_000_000.0;
    delay.mul_f64(1.0 - fraction / 2.0)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
