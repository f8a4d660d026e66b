//! Rate limiting and bounded exponential backoff
//!
//! Used by the semantic grouping client: every request passes through a
//! [`RateLimiter`], and rate-limited responses are retried by
//! [`retry_with_backoff`].

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Enforces a minimum interval between calls made through one limiter
///
/// The interval is measured from the moment the previous call returned.
/// Calls are serialized: the lock is held for the duration of each call.
#[derive(Debug)]
pub struct RateLimiter {
    last_completed: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_completed: Mutex::new(None),
            min_interval,
        }
    }

    /// Run `call` once the minimum interval has elapsed
    pub async fn run<F>(&self, call: F) -> F::Output
    where
        F: Future,
    {
        let mut last = self.last_completed.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait_time.as_millis() as u64, "Rate limiting: waiting");
                tokio::time::sleep(wait_time).await;
            }
        }

        let output = call.await;
        *last = Some(Instant::now());
        output
    }
}

/// Delay before the retry that follows 0-based `attempt`: `base × 2^attempt`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Run `operation` up to `max_attempts` times, backing off exponentially
///
/// **Algorithm:**
/// 1. Attempt operation (the closure receives the 0-based attempt number)
/// 2. If successful, return result
/// 3. If the error is not retryable, return it immediately
/// 4. If attempts remain, sleep `base_delay × 2^attempt` and retry
/// 5. Otherwise return the last error
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    operation_name: &str,
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !is_retryable(&err) => {
                return Err(err);
            }
            Err(err) => {
                if attempt + 1 >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }

                let delay = backoff_delay(base_delay, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Busy,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn is_busy(err: &TestError) -> bool {
        *err == TestError::Busy
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = retry_with_backoff("test_op", 3, Duration::from_millis(1), is_busy, |_| async {
            Ok::<i32, TestError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = AtomicU32::new(0);

        let base = Duration::from_millis(20);
        let start = Instant::now();
        let result = retry_with_backoff("test_op", 3, base, is_busy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(TestError::Busy)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= base);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff("test_op", 3, Duration::from_millis(1), is_busy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, TestError>(TestError::Fatal) }
        })
        .await;

        assert_eq!(result.unwrap_err(), TestError::Fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff("test_op", 3, Duration::from_millis(1), is_busy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, TestError>(TestError::Busy) }
        })
        .await;

        assert_eq!(result.unwrap_err(), TestError::Busy);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limiter_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = Instant::now();
        limiter.run(async {}).await;
        let first_elapsed = start.elapsed();
        limiter.run(async {}).await;
        limiter.run(async {}).await;
        let third_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(50));
        assert!(third_elapsed >= Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_rate_limiter_measures_from_completion() {
        let limiter = RateLimiter::new(Duration::from_millis(50));

        limiter
            .run(tokio::time::sleep(Duration::from_millis(60)))
            .await;
        let after_first = Instant::now();
        limiter.run(async {}).await;

        assert!(after_first.elapsed() >= Duration::from_millis(45));
    }
}
