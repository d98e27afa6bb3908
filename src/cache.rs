//! Concurrent TTL cache with a background sweeper.
//!
//! Entries are visible to `get` only while `now < expires_at`; an expired
//! entry is treated as absent on read without being removed (lazy expiry).
//! Physical removal happens through [`TtlCache::sweep`], normally driven by
//! the periodic sweeper task, which bounds growth from entries that are set
//! but never re-read. [`TtlCache::len`] reports physical occupancy, expired
//! entries included, so tests can observe the sweep happening.
//!
//! Reads share the lock; writes (`set`/`delete`/`clear`/sweep) are mutually
//! exclusive with everything else. No lock is held across `.await` or I/O.
//! Clones share the same store, so one cache can be handed to many request
//! handlers and the sweeper task at once.

use crate::clock::{Clock, MonotonicClock};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often the background sweeper scans for expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at_millis: u64,
}

#[derive(Debug)]
struct Shared<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

/// Thread-safe in-memory cache with per-entry TTL.
///
/// `V` is the concrete value type of the call site (a serialized notes
/// page, a single note, ...), so type mismatches are caught at compile time
/// instead of through a runtime downcast.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache on the monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::default())
    }

    /// Create an empty cache with a caller-supplied clock (deterministic
    /// expiry in tests).
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                clock: Arc::new(clock),
            }),
        }
    }

    /// Store `value` under `key` for `ttl`, overwriting any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at_millis = self.now_millis().saturating_add(as_millis_saturated(ttl));
        let mut entries = self.shared.entries.write().expect("cache lock poisoned");
        entries.insert(key.into(), CacheEntry { value, expires_at_millis });
    }

    /// Fetch the value for `key`, or `None` if absent or expired.
    ///
    /// Expired entries are left in place for the sweeper; `get` never
    /// mutates the store.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.shared.entries.read().expect("cache lock poisoned");
        let entry = entries.get(key)?;
        if self.now_millis() >= entry.expires_at_millis {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Remove the entry for `key`; no-op if absent.
    pub fn delete(&self, key: &str) {
        let mut entries = self.shared.entries.write().expect("cache lock poisoned");
        entries.remove(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.shared.entries.write().expect("cache lock poisoned");
        entries.clear();
    }

    /// Number of entries physically stored, including expired entries the
    /// sweeper has not reclaimed yet.
    pub fn len(&self) -> usize {
        self.shared.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physically remove every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now_millis();
        let mut entries = self.shared.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at_millis);
        before - entries.len()
    }

    /// Start the periodic sweeper task for this cache.
    ///
    /// The returned handle owns the task: dropping it (or calling
    /// [`SweeperHandle::stop`]) aborts the task, so tests and shutdown paths
    /// never leak a background task. Production callers use
    /// [`SWEEP_INTERVAL`].
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval resolves immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired cache entries");
                }
            }
        });
        SweeperHandle { task }
    }

    fn now_millis(&self) -> u64 {
        self.shared.clock.now_millis()
    }
}

/// Owns a cache's background sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper. Idempotent; also happens on drop.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn as_millis_saturated(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
