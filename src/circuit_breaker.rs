//! Circuit breaker guarding a downstream dependency.
//!
//! Three states: `Closed` passes calls through and counts consecutive
//! failures; `Open` rejects calls outright until `timeout` has elapsed since
//! the last failure; `HalfOpen` admits trial probes and closes again after
//! `success_threshold` consecutive successes, reopening on any failure.
//!
//! The whole check → invoke → update sequence for one `call` runs under a
//! single async mutex, so concurrent callers serialize and the admit/reject
//! decision is atomic with the state update. Exactly one invocation happens
//! per admitted call. The breaker never retries; compose a [`Retrier`]
//! around (or inside) it if retries are wanted.
//!
//! [`Retrier`]: crate::Retrier

use crate::clock::{Clock, MonotonicClock};
use crate::ResilienceError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Calls are rejected without invoking the operation.
    Open,
    /// Trial probes are admitted to test recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    InvalidFailureThreshold { provided: u32 },
    /// Success threshold must be > 0.
    InvalidSuccessThreshold { provided: u32 },
    /// Open-state timeout must be > 0.
    InvalidTimeout(Duration),
}

impl fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerError::InvalidFailureThreshold { provided } => {
                write!(f, "failure_threshold must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidSuccessThreshold { provided } => {
                write!(f, "success_threshold must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidTimeout(timeout) => {
                write!(f, "timeout must be > 0 (got {:?})", timeout)
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

/// Validated breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        if failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if success_threshold == 0 {
            return Err(CircuitBreakerError::InvalidSuccessThreshold { provided: 0 });
        }
        if timeout.is_zero() {
            return Err(CircuitBreakerError::InvalidTimeout(timeout));
        }
        Ok(Self { failure_threshold, success_threshold, timeout })
    }

    /// Consecutive failures before opening from `Closed`.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Consecutive half-open successes before closing again.
    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    /// How long the breaker stays `Open` before admitting a probe.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_millis: u64,
}

/// Circuit breaker guarding one downstream dependency.
///
/// Clones share the same underlying state via `Arc`, so every handle
/// observes and affects the same circuit lifecycle. Construct one breaker
/// per protected dependency and pass it explicitly; there is no global
/// registry.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    core: Arc<Mutex<BreakerCore>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker, validating the thresholds and timeout.
    ///
    /// # Examples
    /// ```
    /// use noteshield::CircuitBreaker;
    /// use std::time::Duration;
    /// let breaker = CircuitBreaker::new(5, 2, Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        Ok(Self::from_config(CircuitBreakerConfig::new(
            failure_threshold,
            success_threshold,
            timeout,
        )?))
    }

    /// Create a breaker from a validated config.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::from_config(config)
    }

    /// Override the clock (deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn from_config(config: CircuitBreakerConfig) -> Self {
        Self {
            core: Arc::new(Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_millis: 0,
            })),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// The config this breaker runs under.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute `operation` under breaker protection.
    ///
    /// Returns `ResilienceError::CircuitOpen` without invoking the operation
    /// when the circuit is open and the timeout has not elapsed; otherwise
    /// invokes the operation exactly once and records the outcome. Every
    /// `Err` from the operation counts as a failure, every `Ok` as a
    /// success.
    ///
    /// The mutex is held across the invocation, so a slow operation in
    /// half-open serializes other callers behind it on the same breaker;
    /// callers needing per-call deadlines must compose one around the
    /// operation itself.
    pub async fn call<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let mut core = self.core.lock().await;

        if core.state == CircuitState::Open {
            let open_for =
                Duration::from_millis(self.now_millis().saturating_sub(core.last_failure_millis));
            if open_for > self.config.timeout {
                core.state = CircuitState::HalfOpen;
                core.success_count = 0;
                tracing::info!("circuit breaker: open -> half-open, admitting probe");
            } else {
                return Err(ResilienceError::CircuitOpen {
                    failure_count: core.failure_count,
                    open_for,
                });
            }
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.on_success(&mut core),
            Err(_) => self.on_failure(&mut core),
        }

        result
    }

    /// Current state. A pure read: the open-state timeout is only applied by
    /// [`call`](Self::call), so an idle breaker reports `Open` until the
    /// next call probes it.
    pub async fn state(&self) -> CircuitState {
        self.core.lock().await.state
    }

    /// Force the breaker back to `Closed` with cleared counters.
    pub async fn reset(&self) {
        let mut core = self.core.lock().await;
        core.state = CircuitState::Closed;
        core.failure_count = 0;
        core.success_count = 0;
        tracing::info!("circuit breaker reset to closed");
    }

    /// Any success zeroes the consecutive-failure count, so only an
    /// unbroken failure streak can trip the breaker.
    fn on_success(&self, core: &mut BreakerCore) {
        core.failure_count = 0;
        if core.state == CircuitState::HalfOpen {
            core.success_count += 1;
            if core.success_count >= self.config.success_threshold {
                core.state = CircuitState::Closed;
                core.success_count = 0;
                tracing::info!("circuit breaker: half-open -> closed");
            }
        }
    }

    fn on_failure(&self, core: &mut BreakerCore) {
        core.failure_count += 1;
        core.last_failure_millis = self.now_millis();

        match core.state {
            CircuitState::HalfOpen => {
                core.state = CircuitState::Open;
                tracing::warn!(failures = core.failure_count, "circuit breaker: probe failed -> open");
            }
            CircuitState::Closed => {
                if core.failure_count >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    tracing::error!(
                        failures = core.failure_count,
                        threshold = self.config.failure_threshold,
                        "circuit breaker: closed -> open"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}
