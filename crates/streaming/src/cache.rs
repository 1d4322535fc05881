use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Anything stored in a [`MemoryCache`] reports its own footprint.
pub trait Cacheable {
    fn size_in_bytes(&self) -> usize;
}

impl<T: Cacheable + ?Sized> Cacheable for Arc<T> {
    fn size_in_bytes(&self) -> usize {
        (**self).size_in_bytes()
    }
}

/// Byte budget with a hard cap and an eviction target.
///
/// A put that would push the cache past `capacity` evicts least-recently-used
/// entries until the new total fits under `low_water`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBudget {
    pub capacity: usize,
    pub low_water: usize,
}

impl MemoryBudget {
    /// Low watermark defaults to 80% of capacity.
    pub fn new(capacity: usize) -> Self {
        Self::with_low_water(capacity, capacity / 5 * 4)
    }

    pub fn with_low_water(capacity: usize, low_water: usize) -> Self {
        Self {
            capacity,
            low_water: low_water.min(capacity),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub used_bytes: usize,
    pub len: usize,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    bytes: usize,
    last_used_tick: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    used_bytes: usize,
    tick: u64,
    entries: BTreeMap<K, CacheEntry<V>>,
    // Ticks are unique, so this is a total LRU order: first = least recent.
    lru: BTreeMap<u64, K>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Ord + Clone, V> CacheState<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &K) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.lru.remove(&entry.last_used_tick);
            entry.last_used_tick = tick;
            self.lru.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.last_used_tick);
        self.used_bytes = self.used_bytes.saturating_sub(entry.bytes);
        Some(entry.value)
    }

    /// Evicts least-recently-used entries until `used_bytes <= target`.
    fn evict_down_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.used_bytes > target {
            let Some((_, key)) = self.lru.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.used_bytes = self.used_bytes.saturating_sub(entry.bytes);
                evicted += 1;
            }
        }
        self.evictions += evicted as u64;
        evicted
    }
}

/// Bounded, thread-safe key→value store with LRU eviction.
///
/// Values are expected to be cheap to clone (`Arc`s). Bookkeeping sits behind
/// a single mutex so the query thread and completing load tasks can `get` and
/// `put` concurrently.
pub struct MemoryCache<K, V> {
    name: &'static str,
    budget: MemoryBudget,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> fmt::Debug for MemoryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("name", &self.name)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl<K, V> MemoryCache<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: Cacheable + Clone,
{
    pub fn new(name: &'static str, budget: MemoryBudget) -> Self {
        Self {
            name,
            budget,
            state: Mutex::new(CacheState {
                used_bytes: 0,
                tick: 0,
                entries: BTreeMap::new(),
                lru: BTreeMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Membership test. Does not count as a use.
    pub fn contains(&self, key: &K) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Returns a clone of the value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let Some(value) = state.entries.get(key).map(|e| e.value.clone()) else {
            state.misses += 1;
            return None;
        };
        state.hits += 1;
        state.touch(key);
        Some(value)
    }

    /// Inserts `value` unless `key` is already present.
    ///
    /// Returns `false` (and leaves the cache untouched) for a present key.
    /// Never fails on capacity: victims are evicted first, and a single entry
    /// larger than the whole budget is still admitted.
    pub fn put(&self, key: K, value: V) -> bool {
        let bytes = value.size_in_bytes();
        let mut state = self.state.lock();
        if state.entries.contains_key(&key) {
            return false;
        }

        if state.used_bytes + bytes > self.budget.capacity {
            let target = self.budget.low_water.saturating_sub(bytes);
            let evicted = state.evict_down_to(target);
            if evicted > 0 {
                debug!(
                    cache = self.name,
                    evicted,
                    used_bytes = state.used_bytes,
                    "evicted least-recently-used entries"
                );
            }
        }

        let tick = state.next_tick();
        state.used_bytes += bytes;
        state.lru.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                bytes,
                last_used_tick: tick,
            },
        );
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.state.lock().remove(key)
    }

    /// Keeps only the entries for which `keep` returns `true`. Returns the
    /// number of entries removed.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<K> = state
            .entries
            .iter()
            .filter(|(k, e)| !keep(k, &e.value))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    pub fn keys(&self) -> Vec<K> {
        self.state.lock().entries.keys().cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru.clear();
        state.used_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            used_bytes: state.used_bytes,
            len: state.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cacheable, MemoryBudget, MemoryCache};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(usize);

    impl Cacheable for Blob {
        fn size_in_bytes(&self) -> usize {
            self.0
        }
    }

    fn cache(capacity: usize, low_water: usize) -> MemoryCache<&'static str, Blob> {
        MemoryCache::new("test", MemoryBudget::with_low_water(capacity, low_water))
    }

    #[test]
    fn lru_eviction_is_deterministic() {
        let c = cache(10, 10);
        c.put("a", Blob(6));
        c.put("b", Blob(6));

        // Total 12 > 10, so 'a' (older) goes.
        assert!(!c.contains(&"a"));
        assert!(c.contains(&"b"));
        assert!(c.used_bytes() <= c.budget().capacity);
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn get_refreshes_recency() {
        let c = cache(12, 12);
        c.put("a", Blob(4));
        c.put("b", Blob(4));
        c.put("c", Blob(4));
        assert_eq!(c.get(&"a"), Some(Blob(4)));

        c.put("d", Blob(4));
        assert!(c.contains(&"a"));
        assert!(!c.contains(&"b"));
        assert!(c.contains(&"c"));
        assert!(c.contains(&"d"));
    }

    #[test]
    fn eviction_drains_to_low_watermark() {
        let c = cache(10, 4);
        for (k, n) in [("a", 3), ("b", 3), ("c", 3)] {
            c.put(k, Blob(n));
        }
        assert_eq!(c.used_bytes(), 9);

        // 9 + 3 > 10: evict until 3 more bytes fit under 4.
        c.put("d", Blob(3));
        assert_eq!(c.keys(), vec!["d"]);
        assert_eq!(c.used_bytes(), 3);
    }

    #[test]
    fn put_is_idempotent_for_present_keys() {
        let c = cache(100, 80);
        assert!(c.put("a", Blob(10)));
        let before = (c.len(), c.used_bytes());
        assert!(!c.put("a", Blob(50)));
        assert_eq!((c.len(), c.used_bytes()), before);
        assert_eq!(c.get(&"a"), Some(Blob(10)));
    }

    #[test]
    fn oversized_entry_is_admitted_alone() {
        let c = cache(10, 8);
        c.put("small", Blob(2));
        assert!(c.put("huge", Blob(25)));
        assert!(c.contains(&"huge"));
        assert!(!c.contains(&"small"));
        assert_eq!(c.used_bytes(), 25);
    }

    #[test]
    fn retain_and_remove_update_bytes() {
        let c = cache(100, 100);
        c.put("a", Blob(1));
        c.put("b", Blob(2));
        c.put("c", Blob(3));
        assert_eq!(c.retain(|_, v| v.0 != 2), 1);
        assert_eq!(c.used_bytes(), 4);
        assert_eq!(c.remove(&"a"), Some(Blob(1)));
        assert_eq!(c.used_bytes(), 3);
        c.clear();
        assert!(c.is_empty());
        assert_eq!(c.used_bytes(), 0);
    }

    #[test]
    fn hit_and_miss_counters() {
        let c = cache(100, 100);
        c.put("a", Blob(1));
        c.get(&"a");
        c.get(&"zz");
        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn concurrent_puts_and_gets_stay_within_budget() {
        let c = Arc::new(MemoryCache::<u32, Blob>::new(
            "shared",
            MemoryBudget::with_low_water(64, 48),
        ));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for i in 0..200u32 {
                        let key = t * 1000 + i;
                        c.put(key, Blob(4));
                        let _ = c.get(&key);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker");
        }
        assert!(c.used_bytes() <= 64);
        assert_eq!(c.used_bytes(), c.len() * 4);
    }
}
