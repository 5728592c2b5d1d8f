//! Rate-limit aware retries for carrier API calls.
//!
//! [`RetryPolicy::execute`] wraps any async operation returning
//! `Result<T, ApiError>`. Only [`ApiError::RateLimited`] is retried; every
//! other error goes straight back to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::ApiError;

/// Maximum number of retries for rate-limited (429) requests.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds when the server gives no retry time.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for the computed exponential backoff.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Called before each retry sleep with the error, the 1-based retry number
/// and the server-provided retry instant (if any).
pub type RetryCallback = Arc<dyn Fn(&ApiError, u32, Option<DateTime<Utc>>) + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    on_retry: Option<RetryCallback>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self {
            max_retries: MAX_RATE_LIMIT_RETRIES,
            on_retry: None,
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ApiError, u32, Option<DateTime<Utc>>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// `min(1000 * 2^attempt, 30000)` ms, `attempt` counted from zero
    pub fn backoff_delay(attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }

    /// How long to wait before retrying after `error` on the given zero-based attempt
    pub fn delay_for(error: &ApiError, attempt: u32, now: DateTime<Utc>) -> Duration {
        match error.retry_after() {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
            None => Self::backoff_delay(attempt),
        }
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() && attempt < self.max_retries => {
                    let retry_after = err.retry_after();
                    let delay = Self::delay_for(&err, attempt, Utc::now());
                    attempt += 1;

                    warn!(
                        retry = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    if let Some(ref callback) = self.on_retry {
                        callback(&err, attempt, retry_after);
                    }

                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_rate_limited() {
                        warn!(retries = attempt, "Rate limit retries exhausted");
                    } else {
                        debug!(error = %err, "Request failed without retry");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn rate_limited(retry_after: Option<DateTime<Utc>>) -> ApiError {
        ApiError::RateLimited {
            message: "Too Many Requests".to_string(),
            retry_after,
        }
    }

    #[test]
    fn test_backoff_delay_caps() {
        assert_eq!(RetryPolicy::backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::backoff_delay(4), Duration::from_millis(16_000));
        assert_eq!(RetryPolicy::backoff_delay(5), Duration::from_millis(30_000));
        assert_eq!(RetryPolicy::backoff_delay(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_delay_for_past_retry_after_is_zero() {
        let now = Utc::now();
        let err = rate_limited(Some(now - chrono::Duration::seconds(5)));
        assert_eq!(RetryPolicy::delay_for(&err, 0, now), Duration::ZERO);

        let err = rate_limited(Some(now + chrono::Duration::seconds(3)));
        assert_eq!(RetryPolicy::delay_for(&err, 2, now), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_honor_retry_after() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(Mutex::new(Vec::new()));

        let seen = retries.clone();
        let policy = RetryPolicy::new()
            .max_retries(3)
            .on_retry(move |err, attempt, retry_after| {
                assert!(err.is_rate_limited());
                assert!(retry_after.is_some());
                seen.lock().unwrap().push(attempt);
            });

        let started = tokio::time::Instant::now();
        let counter = calls.clone();
        let result = policy
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(rate_limited(Some(Utc::now() + chrono::Duration::seconds(2))))
                    } else {
                        Ok("quote-42")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "quote-42");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(*retries.lock().unwrap(), vec![1, 2, 3]);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5900), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(6100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_without_retry_after() {
        let started = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = RetryPolicy::new()
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited(None)) }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s
        assert_eq!(started.elapsed().as_secs(), 7);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let retried = Arc::new(AtomicU32::new(0));
        let hook = retried.clone();

        let result: Result<(), ApiError> = RetryPolicy::new()
            .max_retries(3)
            .on_retry(move |_, _, _| {
                hook.fetch_add(1, Ordering::SeqCst);
            })
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ApiError::Server {
                        status: 503,
                        message: "upstream down".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Server { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retried.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_retries_returns_first_rate_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = RetryPolicy::new()
            .max_retries(0)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited(None)) }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
