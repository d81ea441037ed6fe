//! Process-local result cache with a fixed time-to-live.
//!
//! Entries older than the TTL count as misses and are replaced. Once the
//! entry count passes the capacity, expired entries are swept; live entries
//! are never evicted, so the cache may transiently exceed its capacity.
//! Values are computed outside the lock and concurrent misses on one key may
//! compute twice; the last writer wins.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// TTL and capacity settings of one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// Entry count that triggers a sweep of expired entries.
    pub capacity: usize,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expired: usize,
    pub swept: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry<V> {
    value: V,
    timestamp: Instant,
}

/// Thread-safe TTL cache.
pub struct ResultCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    stats: Mutex<CacheStats>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            ttl: settings.ttl(),
            capacity: settings.capacity.max(1),
            clock,
        }
    }

    /// Live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let hit = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now.duration_since(entry.timestamp) < self.ttl => {
                    Some(entry.value.clone())
                }
                Some(_) => {
                    self.stats.lock().expired += 1;
                    None
                }
                None => None,
            }
        };
        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Store `value`, sweeping expired entries once over capacity.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        entries.insert(
            key,
            CacheEntry {
                value,
                timestamp: now,
            },
        );
        if entries.len() > self.capacity {
            let before = entries.len();
            let ttl = self.ttl;
            entries.retain(|_, e| now.duration_since(e.timestamp) < ttl);
            let swept = before - entries.len();
            if swept > 0 {
                log::debug!("Cache sweep removed {} expired entries", swept);
            }
            self.stats.lock().swept += swept;
        }
    }

    /// Cached value or the result of `compute`, stored on success.
    pub fn get_or_try_compute<E, F>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key.clone(), value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}
