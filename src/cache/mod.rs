//! TTL + LRU cache
//!
//! Generic key/value cache combining per-entry TTL stamps with strict
//! least-recently-used eviction. Eviction order is a property of the backing
//! ordered map, not of iteration order: every hit refreshes recency, and
//! inserting at capacity removes exactly the least-recently-used entry.
//!
//! The service owns independent instances for listings, metadata, and bucket
//! accessibility, each with its own capacity and TTL.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// One cached value with its expiry stamp.
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// String-keyed TTL + LRU cache.
///
/// A present-but-expired entry behaves identically to a miss and is removed
/// by the read that observed it. The lock is never held across an await;
/// all operations are short critical sections.
pub struct TtlCache<V> {
    name: &'static str,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the given capacity and default TTL.
    pub fn new(name: &'static str, capacity: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a key, refreshing its recency on a hit.
    ///
    /// Expired entries are deleted and reported as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = matches!(entries.peek(key), Some(entry) if entry.is_expired());
        if expired {
            entries.pop(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(cache = self.name, key = key, "cache entry expired");
            return None;
        }

        match entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(cache = self.name, key = key, "cache HIT");
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(cache = self.name, key = key, "cache MISS");
                None
            }
        }
    }

    /// Insert a value with the default TTL.
    pub fn set(&self, key: String, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert a value with an explicit TTL.
    ///
    /// At capacity the single least-recently-used entry is evicted first.
    pub fn set_with_ttl(&self, key: String, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key, entry) {
            trace!(cache = self.name, key = %evicted, "evicted LRU entry");
        }
    }

    /// Remove one key.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.pop(key).is_some() {
            debug!(cache = self.name, key = key, "invalidated cache entry");
        }
    }

    /// Remove every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        let count = doomed.len();
        for key in doomed {
            entries.pop(&key);
        }
        if count > 0 {
            debug!(
                cache = self.name,
                prefix = prefix,
                count = count,
                "invalidated cache entries by prefix"
            );
        }
    }

    /// Drop every entry and reset counters.
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!(cache = self.name, "cleared cache");
    }

    /// Number of resident entries (expired-but-unread ones included).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters since creation (or the last `clear`).
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Hit/miss counters for one cache instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
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
