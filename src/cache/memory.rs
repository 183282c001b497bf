//! Bounded in-process LRU layer.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use super::entry::CachedThumbnail;
use super::key::CacheKey;

/// Default number of decoded thumbnails kept in memory.
pub const DEFAULT_MEMORY_CAPACITY: usize = 200;

/// Thread-safe LRU map from cache key to decoded thumbnail.
///
/// All operations take a single mutex and never block on I/O.
pub struct MemoryLru {
    inner: Mutex<LruCache<CacheKey, CachedThumbnail>>,
    capacity: NonZeroUsize,
}

impl MemoryLru {
    /// Create an LRU holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CachedThumbnail>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<CachedThumbnail> {
        self.lock().get(key).cloned()
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: &CacheKey) -> Option<CachedThumbnail> {
        self.lock().peek(key).cloned()
    }

    /// Insert or overwrite `key`.
    ///
    /// Returns the key that was evicted to make room, if any.
    pub fn put(&self, key: CacheKey, value: CachedThumbnail) -> Option<CacheKey> {
        match self.lock().push(key.clone(), value) {
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    /// Drop `key` if present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.lock().pop(key).is_some()
    }

    /// Empty the layer (memory-pressure hook).
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the layer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for MemoryLru {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}
