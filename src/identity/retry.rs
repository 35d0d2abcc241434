//! Bounded retry with a per-attempt timeout for calls leaving the process.
//!
//! Issuer requests and store queries go through [`RetryPolicy::run`], which turns
//! hangs and transport failures into a typed [`CallError`] instead of leaving the
//! caller waiting. Definitive answers (a missing row, an insert conflict) are
//! returned as `Ok` values by the callee and are never retried.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("{operation} timed out after {attempts} attempts")]
    Timeout {
        operation: &'static str,
        attempts: u32,
    },
    #[error("{operation} failed after {attempts} attempts: {message}")]
    Transport {
        operation: &'static str,
        attempts: u32,
        message: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    timeout: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl RetryPolicy {
    /// Default policy: 3 attempts, 10s per attempt, 200ms->2s exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let timeout = if self.timeout.is_zero() {
            Duration::from_secs(1)
        } else {
            self.timeout
        };
        let backoff_max = if self.backoff_max < self.backoff_base {
            self.backoff_base
        } else {
            self.backoff_max
        };
        Self {
            max_attempts: self.max_attempts.max(1),
            timeout,
            backoff_base: self.backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call` until it succeeds, the attempt budget is spent, or every attempt times out.
    ///
    /// # Errors
    /// Returns [`CallError::Timeout`] when the last attempt hit the timeout and
    /// [`CallError::Transport`] when it failed with an error.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let policy = self.normalize();
        let mut attempt = 1;
        loop {
            let last = match timeout(policy.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    warn!(operation, attempt, "call failed: {err:#}");
                    CallError::Transport {
                        operation,
                        attempts: attempt,
                        message: format!("{err:#}"),
                    }
                }
                Err(_) => {
                    warn!(operation, attempt, "call timed out after {:?}", policy.timeout);
                    CallError::Timeout {
                        operation,
                        attempts: attempt,
                    }
                }
            };

            if attempt >= policy.max_attempts {
                return Err(last);
            }

            sleep(backoff_delay(attempt, policy.backoff_base, policy.backoff_max)).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(3)
            .with_timeout(Duration::from_millis(50))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy()
            .run("test.ok", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transport_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy()
            .run("test.flaky", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow!("connection reset"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), CallError> = fast_policy()
            .run("test.down", || async { Err(anyhow!("connection refused")) })
            .await;
        assert_eq!(
            result,
            Err(CallError::Transport {
                operation: "test.down",
                attempts: 3,
                message: "connection refused".to_string(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let result: Result<(), CallError> = fast_policy()
            .with_max_attempts(2)
            .run("test.hang", || std::future::pending::<anyhow::Result<()>>())
            .await;
        assert_eq!(
            result,
            Err(CallError::Timeout {
                operation: "test.hang",
                attempts: 2,
            })
        );
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn normalize_enforces_minimums() {
        let policy = RetryPolicy::new()
            .with_max_attempts(0)
            .with_timeout(Duration::ZERO)
            .with_backoff(Duration::from_secs(2), Duration::from_secs(1))
            .normalize();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.timeout(), Duration::from_secs(1));
        assert_eq!(policy.backoff_max, Duration::from_secs(2));
    }

    #[test]
    fn backoff_is_capped() {
        let delay = backoff_delay(10, Duration::from_millis(100), Duration::from_millis(400));
        assert!(delay <= Duration::from_millis(400));
        assert!(delay >= Duration::from_millis(200));
    }
}
