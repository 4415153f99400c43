//! Error taxonomy for calls made through the breaker.

use thiserror::Error;

/// Why an admission check refused to run the operation.
///
/// Rejections never touch the breaker's counters: the operation was not
/// invoked, so there is no outcome to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The circuit is open and its timeout has not elapsed
    #[error("circuit breaker is open")]
    Open,

    /// The half-open probe cap has been reached
    #[error("too many requests while probing recovery")]
    TooManyRequests,
}

/// Failure of a single call made through the breaker.
///
/// `Open` and `TooManyRequests` mean the operation never ran;
/// `Operation` carries the downstream failure itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error("too many requests while probing recovery")]
    TooManyRequests,

    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True if the breaker refused admission without running the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Open | Self::TooManyRequests)
    }
}

impl<E> From<Rejection> for BreakerError<E> {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Open => Self::Open,
            Rejection::TooManyRequests => Self::TooManyRequests,
        }
    }
}
