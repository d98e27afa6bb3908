#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # noteshield
//!
//! The resilience, caching, and auth-token layer of a notes backend,
//! packaged as a library. The HTTP/SQL layer consumes these as explicit
//! instances — there are no globals, so tests can run any number of
//! caches and breakers side by side.
//!
//! ## What's inside
//!
//! - **Retry** with capped exponential backoff and ±10% jitter
//! - **Circuit breaker** with half-open recovery probes
//! - **TTL cache** with lazy expiry and a background sweeper
//! - **Token codec**: HMAC-SHA-256 signed claims, constant-time verify
//!
//! ## Quick start
//!
//! ```rust
//! use noteshield::{CircuitBreaker, Retrier, RetryPolicy, ResilienceError};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let breaker = CircuitBreaker::new(5, 2, Duration::from_secs(30)).unwrap();
//!     let retrier = Retrier::new(RetryPolicy::default());
//!
//!     // Retry around the breaker: an open circuit short-circuits the loop.
//!     let result = retrier
//!         .execute(|| breaker.call(|| async {
//!             Ok::<_, ResilienceError<std::io::Error>>("rows")
//!         }))
//!         .await;
//!     assert_eq!(result.unwrap(), "rows");
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod prelude;
pub mod presets;
pub mod retry;
pub mod sleeper;
pub mod token;

// Re-exports
pub use backoff::{PolicyError, RetryPolicy};
pub use cache::{SweeperHandle, TtlCache, SWEEP_INTERVAL};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use clock::{Clock, MonotonicClock};
pub use error::ResilienceError;
pub use retry::Retrier;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use token::{Claims, TokenCodec, TokenError, TOKEN_TTL};
