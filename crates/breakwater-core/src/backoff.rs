//! Full-jitter exponential backoff.
//!
//! The delay for attempt `n` is drawn uniformly from
//! `[0, min(min_delay * 2^n, max_delay)]`. Randomizing over the whole range
//! rather than around the midpoint keeps concurrent callers from retrying in
//! lockstep after a shared outage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_secs;

/// Source of inter-attempt delays for the retry loop.
pub trait Backoff: Send + Sync {
    /// Wait duration after the given zero-based failed attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Stateless backoff policy mapping an attempt number to a wait duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Base delay for attempt zero (in seconds)
    #[serde(with = "duration_secs")]
    pub min_delay: Duration,

    /// Upper bound on any delay (in seconds)
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    /// Upper bound for the jittered delay of the given attempt.
    ///
    /// Doubling is clamped before the cap is applied, so large attempt
    /// numbers saturate at `max_delay` instead of overflowing.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let doubled = match 2u32.checked_pow(attempt) {
            Some(factor) => self.min_delay.saturating_mul(factor),
            None => Duration::MAX,
        };
        doubled.min(self.max_delay)
    }

    /// Jittered delay for the given attempt, using the thread-local RNG.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Jittered delay drawn from the supplied RNG.
    ///
    /// Deterministic for a seeded RNG, which is what the tests use.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let ceiling_nanos = ceiling.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rng.gen_range(0..=ceiling_nanos))
    }
}

impl Backoff for BackoffPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        BackoffPolicy::delay(self, attempt)
    }
}
