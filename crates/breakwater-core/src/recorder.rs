//! Outcome events for the metrics sink.
//!
//! The retry loop emits one event per completed attempt. Delivery is
//! fire-and-forget: a slow or broken recorder must not be something the
//! resilience core blocks on, so implementations are expected to be cheap
//! (bump a counter, push to a channel).

use std::fmt;

/// What happened to a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The operation ran and succeeded
    Success,

    /// The operation ran and failed
    Failure,

    /// The breaker refused admission; the operation never ran
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for per-attempt outcome events.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, outcome: Outcome);
}

/// Adapter turning any `Fn(Outcome)` into a recorder.
pub struct FnRecorder<F>(pub F);

impl<F> OutcomeRecorder for FnRecorder<F>
where
    F: Fn(Outcome) + Send + Sync,
{
    fn record(&self, outcome: Outcome) {
        (self.0)(outcome)
    }
}

/// Recorder that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl OutcomeRecorder for NoopRecorder {
    fn record(&self, _outcome: Outcome) {}
}

/// Recorder that logs each outcome at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecorder;

impl OutcomeRecorder for LogRecorder {
    fn record(&self, outcome: Outcome) {
        tracing::debug!(%outcome, "attempt completed");
    }
}
