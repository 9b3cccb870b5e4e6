//! Retry executor.
//!
//! Runs an asynchronous operation under a [`RetryPolicy`]: attempts are strictly
//! sequential, each one optionally raced against the policy timeout, and the
//! wait between attempts grows by the backoff multiplier.

use crate::error::{MenuResult, StructuredError};
use crate::retry::{RetryDecision, RetryPolicy};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run `operation` until it succeeds or the policy gives up.
///
/// The operation may be invoked up to `policy.max_retries + 1` times, so it
/// must be safe to repeat. Writes should use a conservative policy such as
/// [`RetryPolicy::writes`] and an idempotency key the backend understands.
///
/// Failures are normalized into [`StructuredError`]. The error returned is the
/// one from the last attempt; earlier attempts are available through
/// [`StructuredError::history`]. An invalid policy is reported as a
/// `VALIDATION_ERROR` without running the operation.
#[tracing::instrument(
    level = "debug",
    skip(operation, policy),
    fields(max_retries = policy.max_retries)
)]
pub async fn execute_with_retry<T, E, F, Fut>(operation: F, policy: &RetryPolicy) -> MenuResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<StructuredError>,
{
    run(operation, policy, None).await
}

/// [`execute_with_retry`] that stops as soon as `cancel` fires.
///
/// Cancellation interrupts both an in-flight attempt (which is dropped) and a
/// backoff wait, and resolves with a `CANCELLED` error. A token that is
/// already cancelled means the operation never runs.
#[tracing::instrument(
    level = "debug",
    skip(operation, policy, cancel),
    fields(max_retries = policy.max_retries)
)]
pub async fn execute_with_retry_cancellable<T, E, F, Fut>(
    operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> MenuResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<StructuredError>,
{
    run(operation, policy, Some(cancel)).await
}

async fn run<T, E, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
) -> MenuResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<StructuredError>,
{
    policy.validate()?;

    let mut history = Vec::new();
    let mut attempt: u32 = 0;

    loop {
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = attempt_once(&mut operation, policy.timeout) => Some(outcome),
            },
            None => Some(attempt_once(&mut operation, policy.timeout).await),
        };

        let error = match outcome {
            Some(Ok(value)) => return Ok(value),
            Some(Err(error)) => error,
            None => return Err(cancelled(attempt, history)),
        };

        match policy.decide(attempt, &error) {
            RetryDecision::Retry { delay } => {
                debug!(
                    attempt = attempt + 1,
                    max_attempts = policy.total_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    kind = %error.kind_or_unknown(),
                    error = %error,
                    "attempt failed, retrying after backoff"
                );
                history.push(error);

                if !backoff(delay, cancel).await {
                    return Err(cancelled(attempt + 1, history));
                }
                attempt += 1;
            }
            RetryDecision::GiveUp => {
                if attempt > 0 {
                    warn!(
                        attempts = attempt + 1,
                        kind = %error.kind_or_unknown(),
                        error = %error,
                        "giving up after retries"
                    );
                }
                return Err(error.with_history(history));
            }
        }
    }
}

async fn attempt_once<T, E, F, Fut>(
    operation: &mut F,
    timeout: Option<Duration>,
) -> MenuResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<StructuredError>,
{
    let pending = operation();
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, pending).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(StructuredError::timeout()),
        },
        None => pending.await.map_err(Into::into),
    }
}

/// Sleep for `delay`; false if cancelled first.
async fn backoff(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}

fn cancelled(attempts_started: u32, history: Vec<StructuredError>) -> StructuredError {
    info!(attempts_started, "retry loop cancelled");
    StructuredError::cancelled().with_history(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::BuiltinKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_delay(Duration::from_millis(10))
            .with_backoff_multiplier(2.0)
            .with_retryable_kinds([BuiltinKind::NetworkError])
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_network_failures_with_growing_delays() {
        // Given: an operation that fails twice with a retryable network error
        let calls = AtomicU32::new(0);
        let started = Mutex::new(Vec::new());

        // When: executing with three retries
        let result = execute_with_retry(
            || {
                started.lock().unwrap().push(Instant::now());
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(StructuredError::network("Failed to fetch"))
                    } else {
                        Ok("ok")
                    }
                }
            },
            &policy(3),
        )
        .await;

        // Then: the third attempt's value is returned after 10ms and 20ms waits
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let started = started.lock().unwrap();
        let gaps: Vec<_> = started.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(10) && gaps[0] < Duration::from_millis(15));
        assert!(gaps[1] >= Duration::from_millis(20) && gaps[1] < Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let begin = Instant::now();

        let result: MenuResult<()> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StructuredError::unauthorized("Invalid API key")) }
            },
            &policy(3),
        )
        .await;

        let error = result.unwrap_err();
        assert!(error.is_kind(BuiltinKind::Unauthorized));
        assert_eq!(error.message(), "Invalid API key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(begin.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_runs_exactly_once() {
        let calls = AtomicU32::new(0);

        let result: MenuResult<()> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StructuredError::network("offline")) }
            },
            &policy(0),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_uses_every_attempt_and_keeps_history() {
        let calls = AtomicU32::new(0);

        let result: MenuResult<()> = execute_with_retry(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(StructuredError::network(format!("attempt {call}"))) }
            },
            &policy(3),
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(error.message(), "attempt 3");
        assert_eq!(error.attempts(), 4);
        let earlier: Vec<_> = error.history().iter().map(|e| e.message()).collect();
        assert_eq!(earlier, vec!["attempt 0", "attempt 1", "attempt 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn nested_loops_keep_the_inner_history() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let inner = policy(1);
        let inner = &inner;

        let nested = |outer: RetryPolicy| async move {
            execute_with_retry(
                move || {
                    execute_with_retry(
                        move || {
                            let call = calls.fetch_add(1, Ordering::SeqCst);
                            async move {
                                Err::<(), _>(StructuredError::network(format!("inner {call}")))
                            }
                        },
                        inner,
                    )
                },
                &outer,
            )
            .await
        };

        // A single outer attempt passes the inner history through.
        let error = nested(policy(0)).await.unwrap_err();
        assert_eq!(error.message(), "inner 1");
        let earlier: Vec<_> = error.history().iter().map(|e| e.message()).collect();
        assert_eq!(earlier, vec!["inner 0"]);

        // Outer retries come first, then the last inner loop's own history.
        calls.store(0, Ordering::SeqCst);
        let error = nested(policy(1)).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(error.message(), "inner 3");
        let earlier: Vec<_> = error.history().iter().map(|e| e.message()).collect();
        assert_eq!(earlier, vec!["inner 1", "inner 2"]);
        assert_eq!(error.history()[0].history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_last_allowed_attempt_is_returned() {
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(StructuredError::network("offline"))
                    } else {
                        Ok(call)
                    }
                }
            },
            &policy(2),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_fail_with_request_timeout() {
        // Given: an operation slower than the per-attempt timeout
        let calls = AtomicU32::new(0);
        let slow = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, StructuredError>("late")
            }
        };

        // When: timeouts are not on the allow-list
        let result = execute_with_retry(slow, &policy(2).with_timeout(Duration::from_millis(50))).await;

        // Then: the timeout is final after one attempt
        let error = result.unwrap_err();
        assert_eq!(error.message(), "Request timeout");
        assert!(error.is_kind(BuiltinKind::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_retried_when_allowed() {
        let calls = AtomicU32::new(0);
        let begin = Instant::now();
        let policy = policy(2)
            .with_retryable_kinds([BuiltinKind::NetworkError, BuiltinKind::Timeout])
            .with_timeout(Duration::from_millis(50));

        let result = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, StructuredError>("late")
                }
            },
            &policy,
        )
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.message(), "Request timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 3 x 50ms timeouts plus 10ms and 20ms of backoff.
        assert!(begin.elapsed() >= Duration::from_millis(180));
        assert!(begin.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_errors_are_classified_before_the_decision() {
        let calls = AtomicU32::new(0);

        let result: MenuResult<()> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused",
                    ))
                }
            },
            &policy(1),
        )
        .await;

        let error = result.unwrap_err();
        assert!(error.is_kind(BuiltinKind::NetworkError));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_policy_never_runs_the_operation() {
        let calls = AtomicU32::new(0);

        let result: MenuResult<()> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), StructuredError>(()) }
            },
            &policy(3).with_backoff_multiplier(0.0),
        )
        .await;

        assert!(result.unwrap_err().is_kind(BuiltinKind::ValidationError));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_running_attempt() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let begin = Instant::now();

        let result = execute_with_retry_cancellable(
            || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, StructuredError>(())
            },
            &policy(3),
            &token,
        )
        .await;

        let error = result.unwrap_err();
        assert!(error.is_kind(BuiltinKind::Cancelled));
        assert!(!error.is_retryable());
        assert!(begin.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let calls = AtomicU32::new(0);

        let result: MenuResult<()> = execute_with_retry_cancellable(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StructuredError::network("offline")) }
            },
            &policy(3).with_delay(Duration::from_secs(1)),
            &token,
        )
        .await;

        let error = result.unwrap_err();
        assert!(error.is_kind(BuiltinKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(error.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pre_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);

        let result = execute_with_retry_cancellable(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, StructuredError>(()) }
            },
            &policy(3),
            &token,
        )
        .await;

        assert!(result.unwrap_err().is_kind(BuiltinKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
