//! Rolling request/outcome counters owned by a circuit breaker.

use serde::{Deserialize, Serialize};

/// Outcome counters for the breaker's current measurement window.
///
/// A fresh window starts whenever the breaker changes generation: entering a
/// new state, or the rolling reset interval elapsing while closed. Within a
/// window the totals only grow; the consecutive streaks reset each other, so
/// at most one of them is nonzero at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Calls admitted in this window
    pub requests: u32,

    /// Successful outcomes in this window
    pub total_successes: u32,

    /// Failed outcomes in this window
    pub total_failures: u32,

    /// Successes since the last failure
    pub consecutive_successes: u32,

    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn request(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Counts::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaks_reset_each_other() {
        let mut counts = Counts::default();

        counts.failure();
        counts.failure();
        assert_eq!(counts.consecutive_failures, 2);
        assert_eq!(counts.consecutive_successes, 0);

        counts.success();
        assert_eq!(counts.consecutive_failures, 0);
        assert_eq!(counts.consecutive_successes, 1);

        counts.failure();
        assert_eq!(counts.consecutive_failures, 1);
        assert_eq!(counts.consecutive_successes, 0);
    }

    #[test]
    fn test_totals_survive_streak_resets() {
        let mut counts = Counts::default();

        counts.request();
        counts.failure();
        counts.request();
        counts.success();
        counts.request();
        counts.failure();

        assert_eq!(counts.requests, 3);
        assert_eq!(counts.total_successes, 1);
        assert_eq!(counts.total_failures, 2);
    }

    #[test]
    fn test_at_most_one_streak_nonzero() {
        let mut counts = Counts::default();

        for i in 0..20 {
            if i % 3 == 0 {
                counts.success();
            } else {
                counts.failure();
            }
            assert!(counts.consecutive_successes == 0 || counts.consecutive_failures == 0);
        }
    }

    #[test]
    fn test_clear() {
        let mut counts = Counts::default();
        counts.request();
        counts.failure();

        counts.clear();
        assert_eq!(counts, Counts::default());
    }
}
