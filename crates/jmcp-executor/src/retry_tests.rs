use super::*;
use jmcp_core::UpstreamErrorKind;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn upstream(kind: UpstreamErrorKind) -> UpstreamError {
    UpstreamError::new(kind, "get_build_status(deploy#1)", "boom")
}

/// Operation failing `failures` times with `kind`, then succeeding. Records
/// the instant of every call.
fn flaky(
    failures: u32,
    kind: UpstreamErrorKind,
    calls: Arc<Mutex<Vec<Instant>>>,
) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<&'static str, UpstreamError>> + Send>>
{
    move || {
        let calls = calls.clone();
        Box::pin(async move {
            let mut calls = calls.lock().unwrap();
            calls.push(Instant::now());
            if calls.len() as u32 <= failures {
                Err(upstream(kind))
            } else {
                Ok("ok")
            }
        })
    }
}

fn gaps(calls: &[Instant]) -> Vec<Duration> {
    calls.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_max_retries_with_exact_delays() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(policy(3));
    let outcome = executor
        .execute(
            "read",
            flaky(3, UpstreamErrorKind::Timeout, calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap();

    assert_eq!(outcome.value, "ok");
    assert_eq!(outcome.attempts, 4);
    assert_eq!(
        gaps(&calls.lock().unwrap()),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_retries() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(policy(2));
    let failure = executor
        .execute(
            "read",
            flaky(10, UpstreamErrorKind::Status(502), calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.error.status(), Some(502));
    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_called_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(policy(3));
    let started = Instant::now();
    let failure = executor
        .execute(
            "read",
            flaky(10, UpstreamErrorKind::Status(404), calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(Instant::now(), started);
}

#[tokio::test(start_paused = true)]
async fn test_delays_are_capped_at_max_delay() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(RetryPolicy {
        max_retries: 4,
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(25),
        backoff_multiplier: 3.0,
        jitter: false,
    });
    executor
        .execute(
            "read",
            flaky(4, UpstreamErrorKind::Connect, calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap();
    assert_eq!(
        gaps(&calls.lock().unwrap()),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(25),
            Duration::from_secs(25),
            Duration::from_secs(25)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_single_attempt() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(policy(0));
    let failure = executor
        .execute(
            "read",
            flaky(1, UpstreamErrorKind::Timeout, calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap_err();
    assert_eq!(failure.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_predicate_skips_ambiguous_failures() {
    let executor = RetryExecutor::new(policy(3));

    // A read timeout may have queued the build: not retried.
    let calls = Arc::new(Mutex::new(Vec::new()));
    let failure = executor
        .execute(
            "trigger",
            flaky(5, UpstreamErrorKind::Timeout, calls.clone()),
            is_retryable_trigger,
        )
        .await
        .unwrap_err();
    assert_eq!(failure.attempts, 1);

    // 503 is an explicit refusal: retried.
    let calls = Arc::new(Mutex::new(Vec::new()));
    let outcome = executor
        .execute(
            "trigger",
            flaky(2, UpstreamErrorKind::Status(503), calls.clone()),
            is_retryable_trigger,
        )
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 3);

    let calls = Arc::new(Mutex::new(Vec::new()));
    let failure = executor
        .execute(
            "trigger",
            flaky(5, UpstreamErrorKind::Status(500), calls.clone()),
            is_retryable_trigger,
        )
        .await
        .unwrap_err();
    assert_eq!(failure.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_never_exceeds_the_unjittered_delay() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let executor = RetryExecutor::new(RetryPolicy {
        jitter: true,
        ..policy(3)
    });
    executor
        .execute(
            "read",
            flaky(3, UpstreamErrorKind::Timeout, calls.clone()),
            is_retryable_read,
        )
        .await
        .unwrap();
    let expected = [1u64, 2, 4];
    for (gap, secs) in gaps(&calls.lock().unwrap()).into_iter().zip(expected) {
        let full = Duration::from_secs(secs);
        assert!(gap <= full, "{gap:?} > {full:?}");
        assert!(gap >= full / 2, "{gap:?} < half of {full:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_maps_failures_into_app_errors() {
    let executor = RetryExecutor::new(policy(1));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let err = executor
        .read("read", flaky(5, UpstreamErrorKind::Timeout, calls))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::TransientUpstream { attempts: 2, .. }
    ));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let err = executor
        .read("read", flaky(5, UpstreamErrorKind::Status(401), calls))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::PermanentUpstream {
            status: Some(401),
            attempts: 1,
            ..
        }
    ));
}
