//! Circuit breaker state machine.
//!
//! One breaker instance is the admission authority for one logical downstream
//! dependency. It is constructed explicitly and shared (`Arc`) across every
//! request-handling context that calls that dependency; all state lives behind
//! a single lock so admission checks and transitions stay atomic with respect
//! to each other.
//!
//! The operation itself runs outside the lock. Each admitted call captures the
//! breaker's generation token; if a concurrent call changes state before the
//! outcome comes back, the stale outcome is discarded rather than counted
//! against the newer window.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::config::BreakerConfig;
use crate::counts::Counts;
use crate::error::{BreakerError, Rejection};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Normal operation, calls admitted and counted
    Closed,

    /// Rejecting, calls blocked until the open timeout elapses
    Open,

    /// Probing, a limited number of calls admitted to test recovery
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

type TripPredicate = Box<dyn Fn(&Counts) -> bool + Send + Sync>;
type StateChangeHandler = Box<dyn Fn(&str, State, State) + Send + Sync>;

struct Shared {
    state: State,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
    /// Transitions awaiting observer delivery, in occurrence order
    pending: VecDeque<(State, State)>,
}

/// Circuit breaker shielding one downstream dependency.
pub struct CircuitBreaker {
    config: BreakerConfig,
    ready_to_trip: TripPredicate,
    on_state_change: Option<StateChangeHandler>,
    shared: Mutex<Shared>,
    /// Serializes observer delivery so callbacks run outside the state lock
    /// but still see transitions in the order they occurred. Reentrant so a
    /// callback may call back into the breaker without wedging it.
    notify: ReentrantMutex<()>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder supplying the trip predicate and state-change observer.
pub struct BreakerBuilder {
    config: BreakerConfig,
    ready_to_trip: TripPredicate,
    on_state_change: Option<StateChangeHandler>,
}

impl BreakerBuilder {
    fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            // Default: trip on the sixth consecutive failure
            ready_to_trip: Box::new(|counts| counts.consecutive_failures > 5),
            on_state_change: None,
        }
    }

    /// Predicate deciding Closed -> Open, evaluated after each failure outcome.
    pub fn ready_to_trip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.ready_to_trip = Box::new(predicate);
        self
    }

    /// Observer invoked on every state transition as `(name, from, to)`.
    ///
    /// Called synchronously, in exact transition order, with no breaker lock
    /// held in a way that blocks the callback: the observer may read the
    /// breaker back (`state()`, `counts()`) or issue calls through it. A
    /// panic in the observer is caught and logged; it cannot corrupt or
    /// abort an in-progress transition.
    pub fn on_state_change<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> CircuitBreaker {
        let expiry = if self.config.closed_reset_interval.is_zero() {
            None
        } else {
            Some(Instant::now() + self.config.closed_reset_interval)
        };

        CircuitBreaker {
            config: self.config,
            ready_to_trip: self.ready_to_trip,
            on_state_change: self.on_state_change,
            shared: Mutex::new(Shared {
                state: State::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
                pending: VecDeque::new(),
            }),
            notify: ReentrantMutex::new(()),
        }
    }
}

impl CircuitBreaker {
    /// Create a breaker with the default trip predicate and no observer.
    pub fn new(config: BreakerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: BreakerConfig) -> BreakerBuilder {
        BreakerBuilder::new(config)
    }

    /// Diagnostic name from the configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state, applying any due lazy transition first.
    pub fn state(&self) -> State {
        let state = {
            let mut shared = self.shared.lock();
            self.refresh(&mut shared, Instant::now());
            shared.state
        };
        self.deliver_pending();
        state
    }

    /// Snapshot of the current window's counters.
    pub fn counts(&self) -> Counts {
        let counts = {
            let mut shared = self.shared.lock();
            self.refresh(&mut shared, Instant::now());
            shared.counts
        };
        self.deliver_pending();
        counts
    }

    /// Ask for admission without running anything yet.
    ///
    /// On success the returned [`Permit`] carries the generation captured at
    /// admission; report the outcome with [`Permit::success`] or
    /// [`Permit::failure`]. Dropping the permit without reporting counts as a
    /// failure, so a panicking or cancelled operation is not lost.
    pub fn try_acquire(&self) -> Result<Permit<'_>, Rejection> {
        let decision = {
            let mut shared = self.shared.lock();
            self.refresh(&mut shared, Instant::now());
            match shared.state {
                State::Open => Err(Rejection::Open),
                State::HalfOpen
                    if self.config.max_half_open_requests > 0
                        && shared.counts.requests >= self.config.max_half_open_requests =>
                {
                    Err(Rejection::TooManyRequests)
                }
                _ => {
                    shared.counts.request();
                    Ok(shared.generation)
                }
            }
        };
        self.deliver_pending();

        decision.map(|generation| Permit {
            breaker: self,
            generation,
            reported: false,
        })
    }

    /// Run a synchronous operation through the breaker.
    ///
    /// The operation is invoked at most once; if admission is rejected it is
    /// never invoked at all.
    pub fn call<T, E>(&self, operation: impl FnOnce() -> Result<T, E>) -> Result<T, BreakerError<E>> {
        let permit = self.try_acquire()?;
        match operation() {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(err) => {
                permit.failure();
                Err(BreakerError::Operation(err))
            }
        }
    }

    /// Apply an outcome recorded under `generation`.
    ///
    /// Outcomes from a stale generation are dropped: the window they belong
    /// to is gone and counting them would corrupt the current one.
    fn record(&self, generation: u64, success: bool) {
        {
            let mut shared = self.shared.lock();
            let now = Instant::now();
            self.refresh(&mut shared, now);

            if shared.generation != generation {
                tracing::debug!(
                    breaker = %self.config.name,
                    "discarding outcome from a stale generation"
                );
            } else if success {
                self.on_success(&mut shared, now);
            } else {
                self.on_failure(&mut shared, now);
            }
        }
        self.deliver_pending();
    }

    /// Apply lazy time-based transitions. Caller holds the state lock.
    fn refresh(&self, shared: &mut Shared, now: Instant) {
        match shared.state {
            State::Closed => {
                // Rolling window reset: new generation, no state change
                if shared.expiry.is_some_and(|expiry| now >= expiry) {
                    self.new_generation(shared, now);
                }
            }
            State::Open => {
                if shared.expiry.is_some_and(|expiry| now >= expiry) {
                    self.set_state(shared, State::HalfOpen, now);
                }
            }
            State::HalfOpen => {}
        }
    }

    fn on_success(&self, shared: &mut Shared, now: Instant) {
        match shared.state {
            State::Closed => shared.counts.success(),
            State::HalfOpen => {
                shared.counts.success();
                if shared.counts.consecutive_successes >= self.config.max_half_open_requests {
                    self.set_state(shared, State::Closed, now);
                }
            }
            State::Open => {}
        }
    }

    fn on_failure(&self, shared: &mut Shared, now: Instant) {
        match shared.state {
            State::Closed => {
                shared.counts.failure();
                if (self.ready_to_trip)(&shared.counts) {
                    self.set_state(shared, State::Open, now);
                }
            }
            // Any failed probe reopens immediately with a fresh timeout
            State::HalfOpen => self.set_state(shared, State::Open, now),
            State::Open => {}
        }
    }

    fn set_state(&self, shared: &mut Shared, to: State, now: Instant) {
        let from = shared.state;
        if from == to {
            return;
        }
        shared.state = to;
        self.new_generation(shared, now);
        shared.pending.push_back((from, to));
    }

    fn new_generation(&self, shared: &mut Shared, now: Instant) {
        shared.generation += 1;
        shared.counts.clear();
        shared.expiry = match shared.state {
            State::Closed => {
                if self.config.closed_reset_interval.is_zero() {
                    None
                } else {
                    Some(now + self.config.closed_reset_interval)
                }
            }
            State::Open => Some(now + self.config.open_timeout),
            State::HalfOpen => None,
        };
    }

    /// Deliver queued transitions to the observer, in order, outside the
    /// state lock.
    ///
    /// Whichever caller wins the notify lock drains everything queued so far,
    /// so concurrent transitions are still observed in occurrence order. The
    /// notify lock is reentrant: an observer that calls back into the breaker
    /// re-enters here on the same thread and simply finds the queue already
    /// drained, instead of deadlocking.
    fn deliver_pending(&self) {
        let _ordering = self.notify.lock();
        loop {
            let event = self.shared.lock().pending.pop_front();
            let Some((from, to)) = event else { break };

            match to {
                State::Open => tracing::warn!(
                    breaker = %self.config.name,
                    %from,
                    "circuit opened"
                ),
                _ => tracing::info!(
                    breaker = %self.config.name,
                    %from,
                    %to,
                    "circuit state changed"
                ),
            }

            if let Some(handler) = &self.on_state_change {
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| handler(&self.config.name, from, to)));
                if outcome.is_err() {
                    tracing::warn!(
                        breaker = %self.config.name,
                        "state-change observer panicked; transition already applied"
                    );
                }
            }
        }
    }
}

/// Admission token for one in-flight call.
///
/// Holds the generation captured when the call was admitted. Consumed by
/// reporting an outcome; dropping it unreported records a failure.
#[must_use = "report the call's outcome via success() or failure()"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    reported: bool,
}

impl Permit<'_> {
    /// Record a successful outcome for this call.
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, true);
    }

    /// Record a failed outcome for this call.
    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, false);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.record(self.generation, false);
        }
    }
}
