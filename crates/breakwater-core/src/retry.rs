//! Bounded retry loop driving calls through a circuit breaker.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::backoff::{Backoff, BackoffPolicy};
use crate::breaker::CircuitBreaker;
use crate::error::BreakerError;
use crate::recorder::{NoopRecorder, Outcome, OutcomeRecorder};

/// Retry orchestrator.
///
/// Drives up to `max_attempts` calls through a breaker, sleeping a jittered
/// backoff between failed attempts. A success returns immediately; the last
/// failure is returned once the budget is spent. Breaker rejections burn
/// retry budget like any other failed attempt: while the circuit is open the
/// loop is just backoff sleeps between instant rejections, which gives the
/// downstream time to recover without changing the caller-visible attempt
/// accounting.
pub struct Retrier {
    max_attempts: u32,
    backoff: Box<dyn Backoff>,
    recorder: Arc<dyn OutcomeRecorder>,
}

impl Retrier {
    /// Retrier with the default backoff policy and no outcome recorder.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Box::new(BackoffPolicy::default()),
            recorder: Arc::new(NoopRecorder),
        }
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Sink receiving one event per completed attempt.
    pub fn with_recorder(mut self, recorder: Arc<dyn OutcomeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` through `breaker` until it succeeds or the attempt
    /// budget is exhausted.
    ///
    /// The operation must be safe to invoke multiple times. Rejected attempts
    /// never invoke it; they surface as [`BreakerError::Open`] or
    /// [`BreakerError::TooManyRequests`] if the budget runs out first.
    pub async fn run<T, E, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        mut operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            let failure = match breaker.try_acquire() {
                Ok(permit) => match operation().await {
                    Ok(value) => {
                        permit.success();
                        self.recorder.record(Outcome::Success);
                        return Ok(value);
                    }
                    Err(err) => {
                        permit.failure();
                        self.recorder.record(Outcome::Failure);
                        BreakerError::Operation(err)
                    }
                },
                Err(rejection) => {
                    self.recorder.record(Outcome::Rejected);
                    rejection.into()
                }
            };

            attempt += 1;
            if attempt >= self.max_attempts {
                tracing::warn!(
                    breaker = %breaker.name(),
                    attempts = attempt,
                    error = %failure,
                    "attempt budget exhausted"
                );
                return Err(failure);
            }

            let delay = self.backoff.delay(attempt - 1);
            tracing::debug!(
                breaker = %breaker.name(),
                attempt,
                max_attempts = self.max_attempts,
                delay = ?delay,
                error = %failure,
                "attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::State;
    use crate::recorder::FnRecorder;
    use crate::config::BreakerConfig;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(10))
    }

    /// Backoff that counts how many times the loop actually slept.
    struct CountingBackoff {
        sleeps: Arc<AtomicU32>,
    }

    impl Backoff for CountingBackoff {
        fn delay(&self, _attempt: u32) -> Duration {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(5)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_skips_retries() {
        let breaker = CircuitBreaker::new(BreakerConfig::named("test"));
        let calls = AtomicU32::new(0);

        let result = Retrier::new(5)
            .with_backoff(quick_backoff())
            .run(&breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &str>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_of_five_attempts() {
        let breaker = CircuitBreaker::new(BreakerConfig::named("test"));
        let calls = AtomicU32::new(0);
        let sleeps = Arc::new(AtomicU32::new(0));

        let result = Retrier::new(5)
            .with_backoff(CountingBackoff {
                sleeps: Arc::clone(&sleeps),
            })
            .run(&breaker, || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err("flaky")
                    } else {
                        Ok(200)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One sleep between each pair of attempts, none after the success
        assert_eq!(sleeps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_returns_last_failure() {
        let breaker = CircuitBreaker::new(BreakerConfig::named("test"));
        let calls = AtomicU32::new(0);
        let sleeps = Arc::new(AtomicU32::new(0));

        let result = Retrier::new(3)
            .with_backoff(CountingBackoff {
                sleeps: Arc::clone(&sleeps),
            })
            .run(&breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("still down") }
            })
            .await;

        assert_eq!(result, Err(BreakerError::Operation("still down")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No sleep after the final failed attempt
        assert_eq!(sleeps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_consume_attempt_budget() {
        let breaker = CircuitBreaker::builder(BreakerConfig::named("test"))
            .ready_to_trip(|counts| counts.consecutive_failures > 0)
            .build();
        breaker.call(|| Err::<(), _>("boom")).unwrap_err();
        assert_eq!(breaker.state(), State::Open);

        let calls = AtomicU32::new(0);
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let outcomes_in_recorder = Arc::clone(&outcomes);

        let result = Retrier::new(4)
            .with_backoff(quick_backoff())
            .with_recorder(Arc::new(FnRecorder(move |outcome: Outcome| {
                outcomes_in_recorder.lock().push(outcome);
            })))
            .run(&breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &str>(()) }
            })
            .await;

        assert_eq!(result, Err(BreakerError::Open));
        // The breaker never admitted a call, so the operation never ran
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcomes.lock().as_slice(), &[Outcome::Rejected; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_sees_one_event_per_attempt() {
        let breaker = CircuitBreaker::new(BreakerConfig::named("test"));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let outcomes_in_recorder = Arc::clone(&outcomes);
        let calls = AtomicU32::new(0);

        Retrier::new(5)
            .with_backoff(quick_backoff())
            .with_recorder(Arc::new(FnRecorder(move |outcome: Outcome| {
                outcomes_in_recorder.lock().push(outcome);
            })))
            .run(&breaker, || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err("flaky")
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(
            outcomes.lock().as_slice(),
            &[Outcome::Failure, Outcome::Failure, Outcome::Success]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let breaker = CircuitBreaker::new(BreakerConfig::named("test"));
        let calls = AtomicU32::new(0);

        let result = Retrier::new(0)
            .run(&breaker, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &str>(()) }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
