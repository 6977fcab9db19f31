//! Backoff for discovery calls that hit a hosting provider's rate limit.
//!
//! Calls to lgtm.com are paced up front by the rate limited client and are
//! never retried; provider searches can still trip secondary limits, so
//! those are retried here.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::batch::{BatchProgress, ProgressCallback, emit};

/// First backoff delay.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Cap on a single backoff delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Attempts after the first one.
pub const MAX_RETRIES: usize = 5;

/// Exponential backoff between [`INITIAL_BACKOFF_MS`] and [`MAX_BACKOFF_MS`],
/// jittered, for at most [`MAX_RETRIES`] retries.
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(INITIAL_BACKOFF_MS))
        .with_max_delay(Duration::from_millis(MAX_BACKOFF_MS))
        .with_max_times(MAX_RETRIES)
        .with_jitter()
}

/// Run `operation`, retrying with exponential backoff while
/// `is_rate_limit` says the error is a rate limit.
///
/// Each retry emits [`BatchProgress::RateLimitBackoff`] naming `target`.
pub async fn with_retry<T, E, F, Fut, IsRateLimit, ShortMsg>(
    mut operation: F,
    is_rate_limit: IsRateLimit,
    short_message: ShortMsg,
    target: &str,
    on_progress: Option<&ProgressCallback>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRateLimit: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(default_backoff())
        .notify(|err, dur| {
            let current = attempt.load(Ordering::SeqCst);
            emit(
                on_progress,
                BatchProgress::RateLimitBackoff {
                    target: target.to_string(),
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current,
                },
            );
            tracing::debug!(
                target_name = %target,
                attempt = current,
                delay_ms = dur.as_millis() as u64,
                error = %short_message(err),
                "rate limited, backing off"
            );
        })
        .when(is_rate_limit)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct TestError {
        message: &'static str,
        rate_limited: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test(start_paused = true)]
    async fn rate_limits_are_retried_with_events() {
        let calls = Arc::new(AtomicU32::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |event| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        });

        let counter = Arc::clone(&calls);
        let operation = move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError {
                        message: "secondary rate limit",
                        rate_limited: true,
                    })
                } else {
                    Ok("done")
                }
            }
        };

        let result = with_retry(
            operation,
            |e: &TestError| e.rate_limited,
            |e: &TestError| e.to_string(),
            "language:go",
            Some(&callback),
        )
        .await;

        assert_eq!(result.expect("eventually succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        let attempts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                BatchProgress::RateLimitBackoff { target, attempt, .. } if target == "language:go" => {
                    Some(*attempt)
                }
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2]);
    }

    #[tokio::test]
    async fn other_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let operation = move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError {
                    message: "bad credentials",
                    rate_limited: false,
                })
            }
        };

        let err = with_retry(
            operation,
            |e: &TestError| e.rate_limited,
            |e: &TestError| e.to_string(),
            "octo",
            None,
        )
        .await
        .expect_err("not retried");
        assert_eq!(err.to_string(), "bad credentials");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
