//! Bounded tile store with LRU eviction
//!
//! Holds generated tile content keyed by tile index. When an insertion pushes
//! the entry count over the configured capacity, the least recently used entry
//! is evicted. All operations run under one mutex, including the generator
//! call on a miss, so the check-generate-insert-evict sequence is atomic.

use lru::LruCache;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maximum number of entries a store may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Evict once the entry count exceeds this bound
    Bounded(NonZeroUsize),

    /// Never evict
    Unbounded,
}

impl Capacity {
    /// Interpret a configured entry count; zero or negative means unbounded
    pub fn from_config(value: i64) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Capacity::Unbounded, Capacity::Bounded)
    }

    /// The bound as a plain number, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        match self {
            Capacity::Bounded(n) => Some(n.get()),
            Capacity::Unbounded => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, Capacity::Bounded(_))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bounded(n) => write!(f, "{} entries", n),
            Capacity::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Statistics about store usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently cached
    pub entry_count: usize,

    /// Configured bound, `None` when unbounded
    pub capacity: Option<usize>,

    /// Number of lookups answered from the cache
    pub hits: u64,

    /// Number of lookups that required generation
    pub misses: u64,

    /// Number of entries evicted by the LRU policy
    pub evictions: u64,

    /// Number of generator calls that returned an error
    pub generation_failures: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Callback receiving each entry evicted by the LRU policy
///
/// Runs after the store lock has been released, so it may recycle the
/// content or call back into the store.
pub type EvictionHook<K, V> = Arc<dyn Fn(&K, Arc<V>) + Send + Sync>;

struct StoreState<K: Hash + Eq, V> {
    entries: LruCache<K, Arc<V>>,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> StoreState<K, V> {
    /// Insert or replace an entry, returning the entry evicted to make room
    fn insert(&mut self, key: K, value: Arc<V>) -> Option<(K, Arc<V>)> {
        match self.entries.push(key.clone(), value) {
            // Same key: the old content was replaced in place
            Some((old_key, _)) if old_key == key => None,
            Some(evicted) => {
                self.stats.evictions += 1;
                Some(evicted)
            }
            None => None,
        }
    }
}

/// Thread-safe LRU store for generated tiles
///
/// Content is kept behind `Arc` so a caller can keep drawing a tile after the
/// store has evicted it.
///
/// # Example
///
/// ```
/// use tilecache_cache::{Capacity, TileStore};
///
/// let store: TileStore<(i32, i32), Vec<u8>> = TileStore::new(Capacity::from_config(2));
///
/// let tile = store.get_or_create((0, 0), |_| Ok::<_, String>(vec![0u8; 16]))?;
/// assert_eq!(tile.len(), 16);
///
/// // Second request is a hit; the generator is not called
/// store.get_or_create((0, 0), |_| Err("not called".to_string()))?;
/// assert_eq!(store.stats().hits, 1);
/// # Ok::<(), String>(())
/// ```
pub struct TileStore<K: Hash + Eq, V> {
    state: Mutex<StoreState<K, V>>,
    capacity: Capacity,
    eviction_hook: Option<EvictionHook<K, V>>,
}

impl<K, V> TileStore<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
{
    /// Create an empty store
    pub fn new(capacity: Capacity) -> Self {
        let entries = match capacity {
            Capacity::Bounded(n) => LruCache::new(n),
            Capacity::Unbounded => LruCache::unbounded(),
        };

        Self {
            state: Mutex::new(StoreState {
                entries,
                stats: CacheStats { capacity: capacity.limit(), ..Default::default() },
            }),
            capacity,
            eviction_hook: None,
        }
    }

    /// Register a hook that receives every evicted entry
    pub fn with_eviction_hook(mut self, hook: EvictionHook<K, V>) -> Self {
        self.eviction_hook = Some(hook);
        self
    }

    // A panicking generator leaves the state untouched, so a poisoned lock is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, StoreState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_evicted(&self, evicted: Option<(K, Arc<V>)>) {
        if let Some((key, value)) = evicted {
            tracing::debug!(?key, "evicted least recently used tile");
            if let Some(hook) = &self.eviction_hook {
                hook(&key, value);
            }
        }
    }

    /// Return the cached content for `key`, generating it on a miss
    ///
    /// A hit marks the entry most recently used. On a miss the generator runs
    /// once, its result is inserted as most recently used, and if the store is
    /// now over capacity the least recently used entry is evicted. A generator
    /// error is returned unchanged and nothing is inserted.
    ///
    /// The generator runs while the store is locked: a concurrent request for
    /// the same key waits and then hits. The generator must not call back into
    /// this store.
    pub fn get_or_create<E, G>(&self, key: K, generator: G) -> Result<Arc<V>, E>
    where
        G: FnOnce(&K) -> Result<V, E>,
    {
        self.get_or_create_if(key, |_| true, generator)
    }

    /// Like [`get_or_create`](Self::get_or_create), but a cached entry
    /// rejected by `is_valid` is treated as a miss and replaced
    pub fn get_or_create_if<E, P, G>(&self, key: K, is_valid: P, generator: G) -> Result<Arc<V>, E>
    where
        P: FnOnce(&V) -> bool,
        G: FnOnce(&K) -> Result<V, E>,
    {
        let mut state = self.lock();

        if let Some(cached) = state.entries.get(&key).cloned() {
            if is_valid(&*cached) {
                state.stats.hits += 1;
                tracing::trace!(?key, "tile cache hit");
                return Ok(cached);
            }
            // Stale content must not survive a failed regeneration
            state.entries.pop(&key);
            tracing::trace!(?key, "discarded stale tile");
        }

        state.stats.misses += 1;
        tracing::trace!(?key, "tile cache miss");

        let value = match generator(&key) {
            Ok(value) => Arc::new(value),
            Err(error) => {
                state.stats.generation_failures += 1;
                return Err(error);
            }
        };

        let evicted = state.insert(key, Arc::clone(&value));
        state.stats.entry_count = state.entries.len();
        drop(state);

        self.notify_evicted(evicted);
        Ok(value)
    }

    /// Look up `key` without generating, marking a hit most recently used
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.get_if(key, |_| true)
    }

    /// Look up `key`, counting an entry rejected by `is_valid` as a miss
    ///
    /// A rejected entry is left in place and keeps its recency.
    pub fn get_if<P>(&self, key: &K, is_valid: P) -> Option<Arc<V>>
    where
        P: FnOnce(&V) -> bool,
    {
        let mut state = self.lock();

        let valid = state.entries.peek(key).is_some_and(|v| is_valid(&**v));
        if valid {
            state.stats.hits += 1;
            state.entries.get(key).cloned()
        } else {
            state.stats.misses += 1;
            None
        }
    }

    /// Look up `key` without touching recency or statistics
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.lock().entries.peek(key).cloned()
    }

    /// Check if `key` is cached without updating LRU tracking
    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains(key)
    }

    /// Insert or replace content for `key`
    ///
    /// Replacing keeps a single entry per key and refreshes its recency.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut state = self.lock();
        let evicted = state.insert(key, Arc::clone(&value));
        state.stats.entry_count = state.entries.len();
        drop(state);

        self.notify_evicted(evicted);
        value
    }

    /// Remove the entry for `key`, returning its content
    pub fn invalidate(&self, key: &K) -> Option<Arc<V>> {
        let mut state = self.lock();
        let removed = state.entries.pop(key);
        state.stats.entry_count = state.entries.len();

        if removed.is_some() {
            tracing::debug!(?key, "invalidated tile");
        }
        removed
    }

    /// Remove every entry matching `predicate`
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K, &V) -> bool,
    {
        let mut state = self.lock();
        let doomed: Vec<K> = state
            .entries
            .iter()
            .filter(|&(k, v)| predicate(k, &**v))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &doomed {
            state.entries.pop(key);
        }
        state.stats.entry_count = state.entries.len();

        tracing::debug!(removed = doomed.len(), "invalidated tiles");
        doomed.len()
    }

    /// Remove all entries
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.stats.entry_count = 0;
    }

    /// Keys from least to most recently used
    pub fn keys_lru_order(&self) -> Vec<K> {
        self.lock().entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Get current statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats { entry_count: state.entries.len(), ..state.stats }
    }
}
