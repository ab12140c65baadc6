//! Bounded key-value cache with per-entry TTL and LRU eviction
//!
//! Expiry is checked at lookup time with a strict `>` comparison: an entry
//! whose TTL has exactly elapsed is still served. The gateway wraps each
//! instance in a `std::sync::Mutex` so the read-check-evict-write sequence is
//! atomic across threads.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use serde::Serialize;

/// A single cached payload with its freshness window
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Outcome of probing the entry map, resolved before any mutation
enum Lookup<V> {
    Absent,
    Expired,
    Fresh(V),
}

/// Monotonic counters accumulated since cache creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub total_requests: u64,
    pub items: usize,
    pub max_items: usize,
}

/// Bounded TTL/LRU cache.
///
/// `recency` holds the same key set as `entries`, least-recently-used at the
/// front; both are mutated in lockstep.
pub struct TtlLruCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    recency: VecDeque<K>,
    capacity: usize,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries, each living
    /// `default_ttl` unless overridden per insert.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
            capacity,
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a key, counting a hit or a miss.
    ///
    /// An expired entry found here is removed immediately and reported as a
    /// miss. A hit refreshes the key's recency position.
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        self.lookup(key, now, true)
    }

    /// Like [`get`](Self::get) but without touching the hit/miss counters.
    ///
    /// For re-checks after an in-flight wait, where the caller's original
    /// `get` already counted the lookup.
    pub fn peek(&mut self, key: &K) -> Option<V> {
        self.lookup(key, Instant::now(), false)
    }

    fn lookup(&mut self, key: &K, now: Instant, counted: bool) -> Option<V> {
        let lookup = match self.entries.get(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => Lookup::Fresh(entry.value.clone()),
        };

        match lookup {
            Lookup::Absent => {
                if counted {
                    self.misses += 1;
                }
                None
            }
            Lookup::Expired => {
                self.remove_entry(key);
                if counted {
                    self.misses += 1;
                }
                None
            }
            Lookup::Fresh(value) => {
                self.touch(key);
                if counted {
                    self.hits += 1;
                }
                Some(value)
            }
        }
    }

    /// Insert or overwrite a key with the cache's default TTL.
    pub fn insert(&mut self, key: K, value: V) {
        let ttl = self.default_ttl;
        self.insert_with_ttl(key, value, ttl);
    }

    /// Insert or overwrite a key with an entry-specific TTL.
    ///
    /// Inserting a new key at capacity evicts the least-recently-used entry
    /// first; overwriting an existing key never evicts.
    pub fn insert_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    pub(crate) fn insert_at(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
        self.touch(&key);
    }

    /// Remove one entry and its recency record.
    pub fn remove(&mut self, key: &K) {
        self.remove_entry(key);
    }

    /// Drop every entry. Counters are not reset.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot the hit/miss counters. `hit_ratio` is 0 before any request.
    pub fn stats(&self) -> CacheStats {
        let total_requests = self.hits + self.misses;
        let hit_ratio = if total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / total_requests as f64
        };

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_ratio,
            total_requests,
            items: self.entries.len(),
            max_items: self.capacity,
        }
    }

    /// Move `key` to the most-recently-used position.
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key.clone());
    }

    fn remove_entry(&mut self, key: &K) {
        self.entries.remove(key);
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            self.recency.remove(pos);
        }
    }

    fn evict_lru(&mut self) {
        if let Some(lru) = self.recency.front().cloned() {
            self.remove_entry(&lru);
        }
    }
}
