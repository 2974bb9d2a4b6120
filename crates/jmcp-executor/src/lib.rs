//! Retry executor for upstream calls.
//!
//! [`RetryExecutor::execute`] runs an async operation and retries it with
//! exponential backoff while a caller-supplied predicate says the failure is
//! retryable. Two predicates cover the Jenkins calls: [`is_retryable_read`]
//! for idempotent reads and [`is_retryable_trigger`] for build triggers.

mod retry;

pub use retry::{
    RetryExecutor, RetryFailure, RetryOutcome, is_retryable_read, is_retryable_trigger,
};
