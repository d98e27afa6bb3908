//! Error types shared by the resilience policies.
use std::fmt;
use std::time::Duration;

/// Unified error type returned by the retrier and the circuit breaker.
///
/// `Inner` wraps a failure of the guarded operation itself; the other
/// variants are produced by the policies. Only `Inner` errors are ever
/// retried — a `CircuitOpen` rejection propagates immediately so a retry
/// loop never hammers an open breaker.
#[derive(Debug, Clone)]
pub enum ResilienceError<E> {
    /// The circuit breaker rejected the call without invoking the operation.
    CircuitOpen {
        /// Consecutive failures recorded when the breaker opened.
        failure_count: u32,
        /// How long the breaker has been open.
        open_for: Duration,
    },
    /// All retry attempts were exhausted; wraps the last underlying error.
    RetryExhausted { attempts: u32, last: E },
    /// The underlying operation failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { failure_count, open_for } => {
                write!(
                    f,
                    "circuit breaker is open ({} consecutive failures, open for {:?})",
                    failure_count, open_for
                )
            }
            Self::RetryExhausted { attempts, last } => {
                write!(f, "retry failed after {} attempts: {}", attempts, last)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last),
            Self::CircuitOpen { .. } => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this error is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is due to retry exhaustion.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Check if this error wraps an operation failure.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Extract the inner error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Extract the wrapped error, whether it came from a direct failure or
    /// from exhaustion.
    pub fn into_last(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { last, .. } => Some(last),
            Self::CircuitOpen { .. } => None,
        }
    }

    /// Access retry exhaustion info as (attempts, last error).
    pub fn retry_exhausted_info(&self) -> Option<(u32, &E)> {
        match self {
            Self::RetryExhausted { attempts, last } => Some((*attempts, last)),
            _ => None,
        }
    }
}
