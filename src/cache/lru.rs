//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use lru::LruCache;

use crate::cache::CacheKey;

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// - Front = Most recently used
/// - Back = Least recently used
///
/// The tracker itself is unbounded; the container decides when to evict.
#[derive(Debug)]
pub struct LruTracker {
    order: LruCache<CacheKey, ()>,
}

impl Default for LruTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    ///
    /// Returns true if the key was not tracked before.
    pub fn touch(&mut self, key: &CacheKey) -> bool {
        if self.order.contains(key.as_str()) {
            self.order.promote(key.as_str());
            return false;
        }
        self.order.put(key.clone(), ());
        true
    }

    // == Remove ==
    /// Removes a key from the tracker, returning whether it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        self.order.pop(key).is_some()
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        self.order.pop_lru().map(|(key, _)| key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.peek_lru().map(|(key, _)| key)
    }

    /// Keys ordered from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<CacheKey> {
        self.order.iter().map(|(key, _)| key.clone()).collect()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.order.contains(key)
    }
}
