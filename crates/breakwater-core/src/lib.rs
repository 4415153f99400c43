//! # breakwater-core
//!
//! Circuit breaker and jittered-backoff retry core for services that depend
//! on an unreliable downstream API.
//!
//! The breaker is the single in-process authority on whether the downstream
//! may be called: it admits calls while closed, rejects them outright while
//! open, and admits a capped number of probes while half-open. The retry
//! orchestrator drives bounded attempts through the breaker with full-jitter
//! exponential backoff between failures.
//!
//! Transport, metrics storage, and the downstream call itself stay outside
//! this crate: callers supply the operation, and observers receive
//! state-change and per-attempt outcome events to feed whatever sink they
//! use.
//!
//! ## Example
//!
//! ```rust,no_run
//! use breakwater_core::{BreakerConfig, CircuitBreaker, Retrier};
//!
//! # async fn demo() {
//! let breaker = CircuitBreaker::builder(BreakerConfig::named("api"))
//!     .ready_to_trip(|counts| counts.consecutive_failures > 3)
//!     .on_state_change(|name, from, to| {
//!         eprintln!("breaker {name}: {from} -> {to}");
//!     })
//!     .build();
//!
//! let result = Retrier::new(5)
//!     .run(&breaker, || async { call_downstream().await })
//!     .await;
//!
//! match result {
//!     Ok(status) => println!("request succeeded: {status}"),
//!     // Open, TooManyRequests, and exhausted retries all map to
//!     // "service unavailable" at the transport layer
//!     Err(err) => eprintln!("service unavailable: {err}"),
//! }
//! # }
//! # async fn call_downstream() -> Result<u16, std::io::Error> { Ok(200) }
//! ```

mod backoff;
mod breaker;
mod config;
mod counts;
mod error;
mod recorder;
mod retry;

pub use backoff::{Backoff, BackoffPolicy};
pub use breaker::{BreakerBuilder, CircuitBreaker, Permit, State};
pub use config::BreakerConfig;
pub use counts::Counts;
pub use error::{BreakerError, Rejection};
pub use recorder::{FnRecorder, LogRecorder, NoopRecorder, Outcome, OutcomeRecorder};
pub use retry::Retrier;
