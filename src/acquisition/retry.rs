//! Bounded, classified retry with jittered exponential backoff.
//!
//! One invocation moves through `Attempting -> Retrying -> Attempting ...`
//! and ends in exactly one of: success, [`RetryError::Terminal`] (the error
//! was classified as not worth retrying) or [`RetryError::Exhausted`]
//! (`max_retries` retries were spent).

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::models::RetryConfig;

/// Classifies an error as transient or terminal.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Final failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with a non-retryable error.
    Terminal(E),
}

impl<E> RetryError<E> {
    /// The underlying error of the final attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Terminal(e) => e,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Terminal(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryError::Terminal(e) => write!(f, "non-retryable failure: {e}"),
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.last_error())
    }
}

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * exp;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay actually slept before retry number `attempt + 1`.
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Upper bound on total sleep time across all retries.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries).map(|a| self.backoff(a)).sum()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Runs async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails terminally, or retries run out.
    ///
    /// `operation` receives the zero-based attempt number.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        log::info!("Retry succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    log::error!("Non-retryable error: {}", error);
                    return Err(RetryError::Terminal(error));
                }
                Err(error) if attempt >= self.policy.max_retries => {
                    log::error!(
                        "Max retries ({}) exceeded. Last error: {}",
                        self.policy.max_retries,
                        error
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: error,
                    });
                }
                Err(error) => {
                    let delay = self.policy.delay(attempt);
                    log::warn!(
                        "Attempt {} failed: {}. Retrying in {:.2}s...",
                        attempt + 1,
                        error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(3),
            jitter,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy(false);
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(3));
        assert_eq!(p.backoff(40), Duration::from_secs(3));
        assert_eq!(p.max_total_delay(), Duration::from_secs(6));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let p = policy(true);
        for attempt in 0..4 {
            for _ in 0..50 {
                let d = p.delay(attempt);
                assert!(d <= p.backoff(attempt));
                assert!(d >= p.backoff(attempt).mul_f64(0.5));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let handler = RetryHandler::new(policy(false));
        let calls = AtomicU32::new(0);

        let result = handler
            .execute_with_retry(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(TestError::Flaky)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_is_not_retried() {
        let handler = RetryHandler::new(policy(false));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = handler
            .execute_with_retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Terminal(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_bounded_and_distinguishable() {
        let handler = RetryHandler::new(policy(true));
        let start = Instant::now();

        let result: Result<(), _> = handler
            .execute_with_retry(|_| async { Err(TestError::Flaky) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(
            err,
            RetryError::Exhausted {
                attempts: 4,
                last: TestError::Flaky
            }
        );
        // Timer deadlines round up to the millisecond.
        let slack = Duration::from_millis(10);
        assert!(start.elapsed() <= handler.policy().max_total_delay() + slack);
    }

    #[tokio::test]
    async fn zero_retries_runs_once() {
        let handler = RetryHandler::new(RetryPolicy {
            max_retries: 0,
            ..policy(false)
        });
        let result: Result<(), _> = handler
            .execute_with_retry(|_| async { Err(TestError::Flaky) })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 1, .. })
        ));
    }
}
