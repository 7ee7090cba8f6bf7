//! Device Object Cache
//!
//! Value-keyed deduplication of device objects. Two passes that build equal
//! layout descriptions (or equal pipeline keys) receive the same shared
//! handle, so layouts and pipeline states are created once per shape.
//!
//! Backends embed one cache per object family. Lookups take a read lock;
//! only a miss takes the write lock, and the creator runs outside of any
//! lock so a slow compile never blocks other threads' hits.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

pub struct DeviceObjectCache<K, V> {
    entries: RwLock<FxHashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Default for DeviceObjectCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<K: Eq + Hash, V: Clone> DeviceObjectCache<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the cached value for `key`, creating it on a miss.
    ///
    /// A `None` from `create` is not cached; the next lookup retries.
    /// If two threads miss concurrently, the first insert wins and both
    /// receive the same value.
    pub fn get_or_try_insert_with(&self, key: K, create: impl FnOnce() -> Option<V>) -> Option<V> {
        if let Some(value) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let created = create()?;
        let mut entries = self.entries.write();
        Some(entries.entry(key).or_insert(created).clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every cached value.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.entries.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
