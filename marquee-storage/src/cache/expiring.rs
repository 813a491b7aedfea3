//! Capacity-bounded TTL cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use marquee_core::{Clock, MarqueeResult, StorageError, Timestamp, ValidationError};

use super::traits::CacheStats;

struct CacheEntry<V> {
    value: V,
    expires_at: Timestamp,
    /// Insertion sequence number; the key into `CacheInner::order`.
    seq: u64,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Insertion order, oldest first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    expirations: u64,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> CacheInner<K, V> {
    fn remove_entry(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Timestamp) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(entry.expires_at, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        self.expirations += expired.len() as u64;
        expired.len()
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// An entry is dead from its expiry instant onward.
fn is_expired(expires_at: Timestamp, now: Timestamp) -> bool {
    now >= expires_at
}

/// Bounded key/value store with per-entry TTL.
///
/// All operations take a single short-lived lock, so concurrent callers see
/// serializable per-key behavior. When a new key arrives at a full cache,
/// expired entries are purged first and, if that frees nothing, the
/// oldest-inserted entry is evicted. Overwriting a key counts as a fresh
/// insertion for eviction order.
pub struct ExpiringCache<K, V> {
    capacity: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<CacheInner<K, V>>,
}

impl<K, V> fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("capacity", &self.capacity)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            clock,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
                expirations: 0,
                evictions: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MarqueeResult<MutexGuard<'_, CacheInner<K, V>>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Look up a live entry. An expired entry is dropped and reported as a miss.
    pub fn get(&self, key: &K) -> MarqueeResult<Option<V>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;

        let expired = inner
            .entries
            .get(key)
            .map(|entry| is_expired(entry.expires_at, now));

        match expired {
            None => {
                inner.misses += 1;
                Ok(None)
            }
            Some(true) => {
                inner.remove_entry(key);
                inner.expirations += 1;
                inner.misses += 1;
                Ok(None)
            }
            Some(false) => {
                inner.hits += 1;
                Ok(inner.entries.get(key).map(|entry| entry.value.clone()))
            }
        }
    }

    /// Insert or overwrite `key`, live for `ttl` from now.
    ///
    /// Returns the key evicted to make room, if the cache was full of live
    /// entries.
    pub fn set(&self, key: K, value: V, ttl: Duration) -> MarqueeResult<Option<K>> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| ValidationError::InvalidValue {
            field: "ttl".to_string(),
            reason: e.to_string(),
        })?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "ttl".to_string(),
                reason: "expiry overflows the timestamp range".to_string(),
            })?;

        let mut inner = self.lock()?;
        let mut evicted = None;

        if inner.remove_entry(&key).is_none() && inner.entries.len() >= self.capacity {
            inner.purge_expired(now);
            if inner.entries.len() >= self.capacity {
                evicted = inner.evict_oldest();
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                seq,
            },
        );

        Ok(evicted)
    }

    /// Remove `key`, returning its value if it was still live.
    pub fn remove(&self, key: &K) -> MarqueeResult<Option<V>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        Ok(inner
            .remove_entry(key)
            .filter(|entry| !is_expired(entry.expires_at, now))
            .map(|entry| entry.value))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> MarqueeResult<usize> {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        Ok(inner.purge_expired(now))
    }

    /// Entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> MarqueeResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> MarqueeResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> MarqueeResult<CacheStats> {
        let inner = self.lock()?;
        Ok(CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            expirations: inner.expirations,
            evictions: inner.evictions,
            entry_count: inner.entries.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use marquee_core::{MarqueeError, ManualClock};
    use proptest::prelude::*;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    fn cache(capacity: usize, clock: &ManualClock) -> ExpiringCache<u32, String> {
        ExpiringCache::new(capacity, Arc::new(clock.clone()))
    }

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn test_get_returns_value_until_expiry() {
        let clock = clock();
        let cache = cache(4, &clock);
        cache.set(1, "one".to_string(), TTL).unwrap();

        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(cache.get(&1).unwrap(), Some("one".to_string()));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get(&1).unwrap(), None);
        assert_eq!(cache.len().unwrap(), 0);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_full_cache_evicts_oldest_inserted() {
        let clock = clock();
        let cache = cache(3, &clock);
        for key in 1..=3 {
            cache.set(key, key.to_string(), TTL).unwrap();
        }

        let evicted = cache.set(4, "four".to_string(), TTL).unwrap();
        assert_eq!(evicted, Some(1));
        assert_eq!(cache.len().unwrap(), 3);
        assert_eq!(cache.get(&1).unwrap(), None);
        assert!(cache.get(&4).unwrap().is_some());
        assert_eq!(cache.stats().unwrap().evictions, 1);
    }

    #[test]
    fn test_overwrite_counts_as_fresh_insertion() {
        let clock = clock();
        let cache = cache(3, &clock);
        for key in 1..=3 {
            cache.set(key, key.to_string(), TTL).unwrap();
        }
        cache.set(1, "uno".to_string(), TTL).unwrap();
        assert_eq!(cache.len().unwrap(), 3);

        let evicted = cache.set(4, "four".to_string(), TTL).unwrap();
        assert_eq!(evicted, Some(2));
        assert_eq!(cache.get(&1).unwrap(), Some("uno".to_string()));
    }

    #[test]
    fn test_expired_entries_purged_before_eviction() {
        let clock = clock();
        let cache = cache(2, &clock);
        cache.set(1, "short".to_string(), Duration::from_secs(10)).unwrap();
        cache.set(2, "long".to_string(), TTL).unwrap();

        clock.advance(chrono::Duration::seconds(11));
        let evicted = cache.set(3, "three".to_string(), TTL).unwrap();

        assert_eq!(evicted, None);
        assert_eq!(cache.get(&2).unwrap(), Some("long".to_string()));
        assert_eq!(cache.get(&3).unwrap(), Some("three".to_string()));
        assert_eq!(cache.stats().unwrap().evictions, 0);
    }

    #[test]
    fn test_purge_expired_and_remove() {
        let clock = clock();
        let cache = cache(8, &clock);
        cache.set(1, "a".to_string(), Duration::from_secs(5)).unwrap();
        cache.set(2, "b".to_string(), Duration::from_secs(5)).unwrap();
        cache.set(3, "c".to_string(), TTL).unwrap();

        clock.advance(chrono::Duration::seconds(6));
        assert_eq!(cache.purge_expired().unwrap(), 2);
        assert_eq!(cache.len().unwrap(), 1);

        assert_eq!(cache.remove(&3).unwrap(), Some("c".to_string()));
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_poisoned_lock_surfaces_error() {
        let clock = clock();
        let cache = Arc::new(cache(2, &clock));
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert_eq!(
            cache.get(&1),
            Err(MarqueeError::Storage(StorageError::LockPoisoned))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The cache never holds more than its capacity.
        #[test]
        fn prop_len_never_exceeds_capacity(
            capacity in 1usize..16,
            keys in proptest::collection::vec(0u32..64, 0..200)
        ) {
            let clock = clock();
            let cache = cache(capacity, &clock);
            for key in keys {
                cache.set(key, key.to_string(), TTL).unwrap();
                prop_assert!(cache.len().unwrap() <= capacity);
            }
        }

        /// Inserting capacity+1 distinct keys evicts exactly the first one.
        #[test]
        fn prop_overflow_evicts_exactly_one(capacity in 1usize..32) {
            let clock = clock();
            let cache = cache(capacity, &clock);
            for key in 0..capacity as u32 {
                prop_assert_eq!(cache.set(key, key.to_string(), TTL).unwrap(), None);
            }
            let evicted = cache.set(capacity as u32, "new".to_string(), TTL).unwrap();
            prop_assert_eq!(evicted, Some(0));
            prop_assert_eq!(cache.len().unwrap(), capacity);
        }
    }
}
