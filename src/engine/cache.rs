// Memoization of (vehicle, timestamp) distance lookups
//
// Rankings and forecasts poll the same timestamps repeatedly, so results are
// cached. Eviction is a batch removal of the oldest insertions once the
// bound is crossed, not a strict LRU: the update loop only ever queries
// forward in time, so recency tracking would buy nothing.

use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub(crate) struct DistanceCache {
    entries: HashMap<(u32, u64), f64>,
    insertion_order: VecDeque<(u32, u64)>,
    capacity: usize,
    cleanup_batch: usize,
}

impl DistanceCache {
    pub(crate) fn new(capacity: usize, cleanup_batch: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
            cleanup_batch,
        }
    }

    pub(crate) fn get(&self, vehicle_id: u32, timestamp_ms: u64) -> Option<f64> {
        self.entries.get(&(vehicle_id, timestamp_ms)).copied()
    }

    /// Stores a computed distance. When the cache grows past its capacity
    /// the oldest `cleanup_batch` insertions are dropped in one pass.
    pub(crate) fn insert(&mut self, vehicle_id: u32, timestamp_ms: u64, meters: f64) {
        let key = (vehicle_id, timestamp_ms);
        if self.entries.insert(key, meters).is_none() {
            self.insertion_order.push_back(key);
        }

        if self.entries.len() > self.capacity {
            for _ in 0..self.cleanup_batch {
                match self.insertion_order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let mut cache = DistanceCache::new(10, 2);
        cache.insert(1, 1000, 42.0);
        assert_eq!(cache.get(1, 1000), Some(42.0));
        assert_eq!(cache.get(1, 2000), None);
        assert_eq!(cache.get(2, 1000), None);
    }

    #[test]
    fn test_batch_eviction_removes_oldest() {
        let mut cache = DistanceCache::new(5, 2);
        for t in 0..6u64 {
            cache.insert(1, t, t as f64);
        }
        // 6th insert crossed the bound: the 2 oldest entries go, 4 remain
        assert_eq!(cache.len(), 5 - 2 + 1);
        assert_eq!(cache.get(1, 0), None);
        assert_eq!(cache.get(1, 1), None);
        assert_eq!(cache.get(1, 2), Some(2.0));
        assert_eq!(cache.get(1, 5), Some(5.0));
    }

    #[test]
    fn test_overwrite_does_not_duplicate_order_entry() {
        let mut cache = DistanceCache::new(3, 1);
        cache.insert(1, 1000, 1.0);
        cache.insert(1, 1000, 2.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1, 1000), Some(2.0));
        assert_eq!(cache.insertion_order.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = DistanceCache::new(5, 1);
        cache.insert(1, 1000, 1.0);
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get(1, 1000), None);
    }
}
