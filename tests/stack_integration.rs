//! Cross-component behavior: retry composed with the breaker, fallbacks
//! reading from the cache, and read-through caching in front of a guarded
//! store.

use noteshield::{
    CircuitBreaker, Clock, InstantSleeper, ResilienceError, Retrier, RetryPolicy, TtlCache,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DbError(String);

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "db error: {}", self.0)
    }
}

impl std::error::Error for DbError {}

#[derive(Debug, Clone)]
struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    fn new() -> Self {
        Self { now: Arc::new(AtomicU64::new(0)) }
    }

    fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

fn retrier() -> Retrier {
    Retrier::new(RetryPolicy::default()).with_sleeper(InstantSleeper)
}

#[tokio::test]
async fn retry_stops_as_soon_as_the_breaker_opens() {
    let breaker = CircuitBreaker::new(2, 1, Duration::from_secs(60)).unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();

    let result: Result<(), _> = retrier()
        .execute(|| {
            let breaker = breaker.clone();
            let invocations = invocations_clone.clone();
            async move {
                breaker
                    .call(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Err(ResilienceError::Inner(DbError("connection refused".into())))
                    })
                    .await
            }
        })
        .await;

    // Two invocations trip the breaker; the third attempt is rejected
    // without reaching the store and is not retried further.
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert!(result.unwrap_err().is_circuit_open());
}

#[tokio::test]
async fn retry_rides_out_a_flaky_store_behind_the_breaker() {
    let breaker = CircuitBreaker::new(5, 1, Duration::from_secs(60)).unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();

    let result = retrier()
        .execute(|| {
            let breaker = breaker.clone();
            let invocations = invocations_clone.clone();
            async move {
                breaker
                    .call(|| async move {
                        let n = invocations.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Err(ResilienceError::Inner(DbError("timeout".into())))
                        } else {
                            Ok(vec!["note-1", "note-2"])
                        }
                    })
                    .await
            }
        })
        .await;

    assert_eq!(result.unwrap(), vec!["note-1", "note-2"]);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.state().await, noteshield::CircuitState::Closed);
}

#[tokio::test]
async fn breaker_recovery_lets_a_later_retry_cycle_succeed() {
    let clock = ManualClock::new();
    let breaker =
        CircuitBreaker::new(2, 1, Duration::from_millis(100)).unwrap().with_clock(clock.clone());

    // Exhaust one retry cycle and trip the breaker.
    let result: Result<(), _> = retrier()
        .execute(|| {
            let breaker = breaker.clone();
            async move {
                breaker
                    .call(|| async {
                        Err(ResilienceError::Inner(DbError("down".into())))
                    })
                    .await
            }
        })
        .await;
    assert!(result.unwrap_err().is_circuit_open());

    // The dependency comes back; past the cooldown the probe succeeds.
    clock.advance(101);
    let result = retrier()
        .execute(|| {
            let breaker = breaker.clone();
            async move {
                breaker.call(|| async { Ok::<_, ResilienceError<DbError>>(1u32) }).await
            }
        })
        .await;
    assert_eq!(result.unwrap(), 1);
    assert_eq!(breaker.state().await, noteshield::CircuitState::Closed);
}

#[tokio::test]
async fn fallback_serves_stale_cache_when_the_store_is_gone() {
    let cache: TtlCache<String> = TtlCache::new();
    cache.set("notes:7", "cached notes".to_string(), Duration::from_secs(300));

    let fallback_cache = cache.clone();
    let result = retrier()
        .execute_with_fallback(
            || async { Err::<String, _>(ResilienceError::Inner(DbError("down".into()))) },
            |_last| async move {
                fallback_cache.get("notes:7").ok_or_else(|| DbError("cache empty too".into()))
            },
        )
        .await;

    assert_eq!(result.unwrap(), "cached notes");
}

#[tokio::test]
async fn read_through_cache_spares_the_store() {
    let cache: TtlCache<Vec<String>> = TtlCache::new();
    let breaker = CircuitBreaker::new(5, 2, Duration::from_secs(30)).unwrap();
    let store_reads = Arc::new(AtomicUsize::new(0));

    let list_notes = |key: &'static str| {
        let cache = cache.clone();
        let breaker = breaker.clone();
        let store_reads = store_reads.clone();
        async move {
            if let Some(hit) = cache.get(key) {
                return Ok::<_, ResilienceError<DbError>>(hit);
            }
            let rows = breaker
                .call(|| async move {
                    store_reads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["a note".to_string()])
                })
                .await?;
            cache.set(key, rows.clone(), noteshield::presets::NOTE_CACHE_TTL);
            Ok(rows)
        }
    };

    assert_eq!(list_notes("notes:1").await.unwrap(), vec!["a note".to_string()]);
    assert_eq!(list_notes("notes:1").await.unwrap(), vec!["a note".to_string()]);
    assert_eq!(store_reads.load(Ordering::SeqCst), 1, "second read must hit the cache");

    // A write invalidates; the next read goes back to the store.
    cache.delete("notes:1");
    assert_eq!(list_notes("notes:1").await.unwrap(), vec!["a note".to_string()]);
    assert_eq!(store_reads.load(Ordering::SeqCst), 2);
}
