//! Convenient re-exports for common noteshield types.
pub use crate::{
    backoff::{PolicyError, RetryPolicy},
    cache::{SweeperHandle, TtlCache, SWEEP_INTERVAL},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    retry::Retrier,
    token::{Claims, TokenCodec, TokenError, TOKEN_TTL},
    ResilienceError,
};
