//! Bounded duplicate-suppression cache.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::debug;

/// Default number of identifiers held before the cache is cleared.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// A bounded set of already-dispatched event identifiers.
///
/// When an insertion pushes the set past its capacity the whole set is
/// cleared, including the identifier that was just inserted. Identifiers
/// `<= 0` are never checked or recorded.
#[derive(Debug)]
pub struct DedupCache {
    seen: Mutex<HashSet<i64>>,
    capacity: usize,
}

impl DedupCache {
    /// Creates a cache that clears itself after holding more than `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Returns `true` if `id` was recorded since the last clear.
    pub fn seen(&self, id: i64) -> bool {
        id > 0 && self.seen.lock().contains(&id)
    }

    /// Records `id`, clearing the whole set if it grows past capacity.
    pub fn record(&self, id: i64) {
        if id <= 0 {
            return;
        }

        let mut seen = self.seen.lock();
        seen.insert(id);
        if seen.len() > self.capacity {
            seen.clear();
            debug!(capacity = self.capacity, "Dedup cache cleared");
        }
    }

    /// Number of identifiers currently held.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns `true` if no identifiers are held.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_seen() {
        let cache = DedupCache::default();
        assert!(!cache.seen(5));
        cache.record(5);
        assert!(cache.seen(5));

        cache.record(5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_non_positive_ids_ignored() {
        let cache = DedupCache::new(3);
        cache.record(0);
        cache.record(-1);
        assert!(cache.is_empty());
        assert!(!cache.seen(0));
    }

    #[test]
    fn test_overflow_clears_everything() {
        let cache = DedupCache::new(3);
        for id in 1..=3 {
            cache.record(id);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.seen(1));

        cache.record(4);
        assert!(cache.is_empty());
        for id in 1..=4 {
            assert!(!cache.seen(id), "id {id} survived the clear");
        }
    }
}
