//! Retry policy and exponential backoff calculation.
//!
//! The delay for attempt `n` (0-based) is `initial_delay * multiplier^n`,
//! capped at `max_delay`, with symmetric jitter of ±10% of the capped value.
//! Jitter desynchronizes concurrent retriers so a shared dependency coming
//! back up is not hit by a synchronized storm.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use noteshield::RetryPolicy;
//!
//! let policy = RetryPolicy::default(); // 3 attempts, 100ms initial, 5s cap, x2
//! assert_eq!(policy.raw_delay(0), Duration::from_millis(100));
//! assert_eq!(policy.raw_delay(1), Duration::from_millis(200));
//! assert_eq!(policy.raw_delay(10), Duration::from_secs(5)); // capped
//! ```

use rand::{rng, Rng};
use std::fmt;
use std::time::Duration;

/// Fraction of the raw delay applied as symmetric jitter (±10%).
const JITTER_FRACTION: f64 = 0.1;

/// Errors returned when constructing a retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(u32),
    /// `multiplier` must be a finite value >= 1.
    InvalidMultiplier(f64),
    /// `max_delay` must not be smaller than `initial_delay`.
    MaxLessThanInitial { initial: Duration, max: Duration },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
            PolicyError::InvalidMultiplier(m) => {
                write!(f, "multiplier must be finite and >= 1 (got {})", m)
            }
            PolicyError::MaxLessThanInitial { initial, max } => {
                write!(f, "max_delay ({:?}) must be >= initial_delay ({:?})", max, initial)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

/// Immutable retry configuration: attempt budget plus backoff curve.
///
/// Passed by value per call site; there is no shared mutable state here.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    /// The default request-path policy: 3 attempts, 100 ms initial delay,
    /// 5 s cap, doubling between attempts.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy, validating the inputs.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::InvalidMaxAttempts(max_attempts));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(multiplier));
        }
        if max_delay < initial_delay {
            return Err(PolicyError::MaxLessThanInitial { initial: initial_delay, max: max_delay });
        }
        Ok(Self { max_attempts, initial_delay, max_delay, multiplier })
    }

    /// Total attempts (initial try + retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry, prior to growth and jitter.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on any computed delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor applied per attempt.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// The capped exponential delay for `attempt` (0-based), without jitter.
    ///
    /// Non-decreasing in `attempt` and never exceeds `max_delay`; overflow
    /// saturates at the cap.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let grown = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        // f64::min returns the other operand for NaN, so a degenerate
        // product still lands on the cap.
        Duration::from_secs_f64(grown.min(cap))
    }

    /// The jittered delay for `attempt`: `raw_delay` perturbed by a uniform
    /// ±10%, clamped non-negative.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rng())
    }

    /// Same as [`delay`](Self::delay) with a caller-supplied RNG, for
    /// deterministic tests.
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay(attempt).as_secs_f64();
        let jitter = raw * JITTER_FRACTION * (2.0 * rng.random::<f64>() - 1.0);
        Duration::from_secs_f64((raw + jitter).max(0.0))
    }
}
