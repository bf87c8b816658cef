use super::trace::RequestTrace;
use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;

/// Upper bound for a single backoff wait.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Bounded exponential backoff for transient failures.
///
/// The wait before retry `n` (0-based) is `initial_delay * backoff_factor^n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 250, 2.0)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, backoff_factor: f64) -> Self {
        let backoff_factor = if backoff_factor.is_finite() {
            backoff_factor.max(1.0)
        } else {
            1.0
        };
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_backoff_ms),
            backoff_factor,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Wait before retry number `attempt_index` (0-based), capped at 30s.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64;
        let scaled = base_ms * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= MAX_BACKOFF_MS as f64 {
            return Duration::from_millis(MAX_BACKOFF_MS);
        }
        Duration::from_millis(scaled.round() as u64)
    }

    /// Drive `op` until it succeeds, fails non-transiently, or retries run out.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, trace: &RequestTrace, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            request_id = %trace.id,
                            method = %trace.method,
                            path = %trace.path,
                            attempt,
                            "Request recovered after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_transient() || attempt >= self.max_retries {
                        tracing::warn!(
                            request_id = %trace.id,
                            method = %trace.method,
                            path = %trace.path,
                            attempts = attempt + 1,
                            error = %err,
                            "Request failed"
                        );
                        return Err(err);
                    }

                    let wait = self.delay_for(attempt);
                    tracing::warn!(
                        request_id = %trace.id,
                        method = %trace.method,
                        path = %trace.path,
                        attempt = attempt + 1,
                        backoff_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reqwest::Method;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn trace() -> RequestTrace {
        RequestTrace::new(Method::GET, "/api/fast/status")
    }

    fn unavailable() -> ApiError {
        ApiError::Server {
            status: 503,
            message: "Service Unavailable".into(),
        }
    }

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy::new(4, 250, 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn delay_caps_at_30s() {
        let policy = RetryPolicy::new(40, 250, 2.0);
        assert_eq!(policy.delay_for(30), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn factor_below_one_is_clamped() {
        let policy = RetryPolicy::new(2, 100, 0.5);
        assert_eq!(policy.backoff_factor, 1.0);
        assert_eq!(policy.delay_for(3), Duration::from_millis(100));

        let nan = RetryPolicy::new(2, 100, f64::NAN);
        assert_eq!(nan.backoff_factor, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_recovers_with_backoff_schedule() {
        let policy = RetryPolicy::new(2, 250, 2.0);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);

        let result = policy
            .run(&trace(), move |attempt| {
                let recorded = Arc::clone(&recorded);
                async move {
                    recorded.lock().push(tokio::time::Instant::now());
                    if attempt < 2 {
                        Err(unavailable())
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        let calls = calls.lock();
        assert_eq!(calls.len(), 3);
        let first = calls[1] - calls[0];
        let second = calls[2] - calls[1];
        assert!(first >= Duration::from_millis(250) && first < Duration::from_millis(260));
        assert!(second >= Duration::from_millis(500) && second < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, 10, 2.0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = policy
            .run(&trace(), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(unavailable())
                }
            })
            .await
            .expect_err("should exhaust retries");

        assert_eq!(err, unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let policy = RetryPolicy::new(5, 1, 2.0);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = policy
            .run(&trace(), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ApiError::from_status(404, "Not Found".into()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = RetryPolicy::single_attempt()
            .run(&trace(), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ApiError::Timeout { timeout_ms: 5 })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
