//! Pre-configured policies matching how the notes backend runs them.
//!
//! The request-handling layer reads its knobs from the environment and can
//! pass any values it likes; these are the defaults it starts from.

use crate::{CircuitBreakerConfig, RetryPolicy};
use std::time::Duration;

/// How long a cached note read stays fresh.
pub const NOTE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const STARTUP_RETRY_ATTEMPTS: u32 = 5;
const STARTUP_RETRY_INITIAL_MILLIS: u64 = 500;
const STARTUP_RETRY_MAX_SECS: u64 = 10;

const DB_BREAKER_FAILURES: u32 = 5;
const DB_BREAKER_SUCCESSES: u32 = 2;
const DB_BREAKER_TIMEOUT_SECS: u64 = 30;

/// Patient policy for connecting to the database at process start:
/// 5 attempts, 500 ms initial delay, 10 s cap, doubling.
///
/// The request-path default is [`RetryPolicy::default`].
pub fn startup_retry() -> RetryPolicy {
    RetryPolicy::new(
        STARTUP_RETRY_ATTEMPTS,
        Duration::from_millis(STARTUP_RETRY_INITIAL_MILLIS),
        Duration::from_secs(STARTUP_RETRY_MAX_SECS),
        2.0,
    )
    .expect("startup retry preset is valid")
}

/// Breaker guarding the database: opens after 5 consecutive failures,
/// probes after 30 s, closes again on 2 consecutive successes.
pub fn database_breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(
        DB_BREAKER_FAILURES,
        DB_BREAKER_SUCCESSES,
        Duration::from_secs(DB_BREAKER_TIMEOUT_SECS),
    )
    .expect("database breaker preset is valid")
}
