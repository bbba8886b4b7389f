use configuration::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// The longest single pause between two attempts.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Errors that can tell whether trying again might help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Bounded retry with exponential back-off.
///
/// The unit being retried must be safe to repeat from scratch: a single
/// autocommit statement, or a whole transaction. Never a statement inside an
/// open transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    backoff: f64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            backoff: if backoff.is_finite() { backoff.max(1.0) } else { 1.0 },
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or the attempts are used up. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        let mut delay = self.delay;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    tracing::warn!(
                        operation = name,
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts, settings.delay(), settings.backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 2.0);

        let result = policy
            .run("flaky", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::transient(io::Error::other("connection reset")))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_last_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::from_millis(10), 2.0);

        let result: Result<(), _> = policy
            .run("down", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::transient(io::Error::other("connection refused")))
            })
            .await;

        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(5, Duration::ZERO, 1.0);

        let result: Result<(), _> = policy
            .run("broken", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::failed(io::Error::other("syntax error")))
            })
            .await;

        assert!(matches!(result, Err(StoreError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_but_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 10.0);
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(10));
        assert_eq!(policy.next_delay(Duration::from_secs(10)), MAX_DELAY);
    }

    #[test]
    fn settings_convert_into_a_policy() {
        let policy = RetryPolicy::from(&RetrySettings::default());
        assert_eq!(policy.attempts(), 3);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }
}
