//! Bounded front cache for string lookups.
//!
//! Advisory only: a miss always falls through to the bucket table, and a
//! capacity of zero turns every operation into a no-op.

use std::num::NonZeroUsize;

use lru::LruCache;

/// LRU map from string to the last value seen for it.
pub(crate) struct FrontCache {
    lru: Option<LruCache<String, u64>>,
}

impl FrontCache {
    /// Creates a cache holding at most `capacity` entries.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lru: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    pub(crate) fn get(&mut self, key: &str) -> Option<u64> {
        self.lru.as_mut()?.get(key).copied()
    }

    pub(crate) fn insert(&mut self, key: &str, value: u64) {
        if let Some(lru) = self.lru.as_mut() {
            lru.put(key.to_owned(), value);
        }
    }

    pub(crate) fn clear(&mut self) {
        if let Some(lru) = self.lru.as_mut() {
            lru.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lru.as_ref().map_or(0, LruCache::len)
    }
}

impl std::fmt::Debug for FrontCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontCache")
            .field("len", &self.len())
            .field("capacity", &self.lru.as_ref().map_or(0, |l| l.cap().get()))
            .finish()
    }
}
