//! Retry executor for fallible async operations.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Only `ResilienceError::Inner(E)` failures are retried; a `CircuitOpen`
//!   rejection (or any other policy error) returns immediately, so a retry
//!   loop wrapped around a breaker never pounds an open circuit.
//! - The task sleeps `policy.delay(attempt)` between failed attempts, never
//!   after the last one.
//! - Exhaustion yields `RetryExhausted` wrapping the final error; the
//!   fallback variant hands that final error to a caller-supplied recovery
//!   function whose result, success or failure, becomes the overall result.
//!
//! Attempts are not transactional: the operation must be idempotent or
//! side-effect-free on failure for retrying to be safe. That is the caller's
//! responsibility.
//!
//! Example
//! ```rust
//! use noteshield::{Retrier, RetryPolicy, ResilienceError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let retrier = Retrier::new(RetryPolicy::default());
//! let result: Result<u32, _> = retrier
//!     .execute(|| async { Ok::<_, ResilienceError<std::io::Error>>(7) })
//!     .await;
//! assert_eq!(result.unwrap(), 7);
//! # });
//! ```

use crate::{ResilienceError, RetryPolicy, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;

/// Executes operations under a [`RetryPolicy`].
///
/// Stateless between calls; cloning is cheap and clones are independent.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Retrier {
    /// Create a retrier that sleeps on the tokio timer.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, sleeper: Arc::new(TokioSleeper) }
    }

    /// Replace the sleeper (tests inject `InstantSleeper`/`TrackingSleeper`).
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// The policy this retrier runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    pub async fn execute<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let max_attempts = self.policy.max_attempts();
        for attempt in 0..max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(ResilienceError::Inner(e)) => {
                    if attempt + 1 >= max_attempts {
                        tracing::warn!(attempts = max_attempts, error = %e, "retry exhausted");
                        return Err(ResilienceError::RetryExhausted {
                            attempts: max_attempts,
                            last: e,
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(attempt, ?delay, "attempt failed, backing off");
                    self.sleeper.sleep(delay).await;
                }
                // Policy errors (circuit open) are not retried.
                Err(e) => return Err(e),
            }
        }

        // The loop always returns on its last iteration.
        debug_assert!(false, "retry loop must return within max_attempts iterations");
        unreachable!()
    }

    /// Like [`execute`](Self::execute), but on exhaustion invokes `fallback`
    /// once with the last error. The fallback is never retried.
    pub async fn execute_with_fallback<T, E, Fut, Op, FbFut, Fb>(
        &self,
        operation: Op,
        fallback: Fb,
    ) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
        FbFut: Future<Output = Result<T, E>> + Send,
        Fb: FnOnce(E) -> FbFut + Send,
    {
        match self.execute(operation).await {
            Err(ResilienceError::RetryExhausted { attempts, last }) => {
                tracing::warn!(attempts, "all attempts failed, running fallback");
                fallback(last).await.map_err(ResilienceError::Inner)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn instant_retrier(policy: RetryPolicy) -> Retrier {
        Retrier::new(policy).with_sleeper(InstantSleeper)
    }

    #[tokio::test]
    async fn first_attempt_success_runs_once() {
        let retrier = instant_retrier(RetryPolicy::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ResilienceError<TestError>>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eventual_success_uses_exactly_k_plus_one_attempts() {
        let policy =
            RetryPolicy::new(5, Duration::from_millis(10), Duration::from_secs(1), 2.0).unwrap();
        let retrier = instant_retrier(policy);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(ResilienceError::Inner(TestError(format!("attempt {}", attempt))))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error_and_attempt_count() {
        let retrier = instant_retrier(RetryPolicy::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ResilienceError::Inner(TestError(format!("attempt {}", attempt))))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ResilienceError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.0, "attempt 2");
            }
            e => panic!("expected RetryExhausted, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn sleeps_between_attempts_but_not_after_last() {
        let sleeper = TrackingSleeper::new();
        let retrier = Retrier::new(RetryPolicy::default()).with_sleeper(sleeper.clone());

        let _ = retrier
            .execute(|| async { Err::<(), _>(ResilienceError::Inner(TestError("fail".into()))) })
            .await;

        let calls = sleeper.calls();
        assert_eq!(calls.len(), 2, "3 attempts means 2 sleeps");
        // Jittered within ±10% of the 100ms/200ms exponential curve.
        assert!(calls[0] >= Duration::from_millis(90) && calls[0] <= Duration::from_millis(110));
        assert!(calls[1] >= Duration::from_millis(180) && calls[1] <= Duration::from_millis(220));
    }

    #[tokio::test]
    async fn circuit_open_is_not_retried() {
        let retrier = instant_retrier(RetryPolicy::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = retrier
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), ResilienceError<TestError>>(ResilienceError::CircuitOpen {
                        failure_count: 5,
                        open_for: Duration::from_secs(1),
                    })
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let sleeper = TrackingSleeper::new();
        let policy =
            RetryPolicy::new(1, Duration::from_millis(100), Duration::from_secs(5), 2.0).unwrap();
        let retrier = Retrier::new(policy).with_sleeper(sleeper.clone());

        let result = retrier
            .execute(|| async { Err::<(), _>(ResilienceError::Inner(TestError("fail".into()))) })
            .await;

        assert!(result.unwrap_err().is_retry_exhausted());
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn fallback_receives_last_error_after_exhaustion() {
        let retrier = instant_retrier(RetryPolicy::default());

        let result = retrier
            .execute_with_fallback(
                || async { Err::<u32, _>(ResilienceError::Inner(TestError("primary".into()))) },
                |last| async move {
                    assert_eq!(last.0, "primary");
                    Ok(99)
                },
            )
            .await;

        assert_eq!(result.unwrap(), 99);
    }

    #[tokio::test]
    async fn failed_fallback_becomes_overall_result() {
        let retrier = instant_retrier(RetryPolicy::default());

        let result = retrier
            .execute_with_fallback(
                || async { Err::<u32, _>(ResilienceError::Inner(TestError("primary".into()))) },
                |_last| async move { Err(TestError("fallback too".into())) },
            )
            .await;

        match result.unwrap_err() {
            ResilienceError::Inner(e) => assert_eq!(e.0, "fallback too"),
            e => panic!("expected Inner, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn fallback_is_skipped_on_success() {
        let retrier = instant_retrier(RetryPolicy::default());
        let fallback_ran = Arc::new(AtomicUsize::new(0));
        let fallback_clone = fallback_ran.clone();

        let result = retrier
            .execute_with_fallback(
                || async { Ok::<_, ResilienceError<TestError>>(1) },
                |_last| {
                    let fallback_ran = fallback_clone.clone();
                    async move {
                        fallback_ran.fetch_add(1, Ordering::SeqCst);
                        Ok(2)
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(fallback_ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_is_skipped_when_circuit_is_open() {
        let retrier = instant_retrier(RetryPolicy::default());

        let result = retrier
            .execute_with_fallback(
                || async {
                    Err::<u32, ResilienceError<TestError>>(ResilienceError::CircuitOpen {
                        failure_count: 3,
                        open_for: Duration::from_secs(2),
                    })
                },
                |_last| async move { Ok(7) },
            )
            .await;

        assert!(result.unwrap_err().is_circuit_open());
    }
}
