// Bounded per-vehicle log of accepted distance points

use std::collections::VecDeque;

use serde::Serialize;

/// One accepted (post-recovery) distance reading for a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DistancePoint {
    pub timestamp_ms: u64,
    pub meters: f64,
}

/// Append-only distance log with strictly increasing timestamps, capped at
/// a fixed size. On overflow the oldest points are dropped first. Only the
/// engine's update path appends; readers get copies.
#[derive(Debug)]
pub struct DistanceHistory {
    points: VecDeque<DistancePoint>,
    cap: usize,
}

impl DistanceHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            points: VecDeque::new(),
            cap,
        }
    }

    /// Records an accepted distance. A point at or before the last recorded
    /// timestamp is ignored, which keeps the ordering invariant intact when
    /// a caller re-queries a past timestamp after a cache eviction.
    pub fn push(&mut self, point: DistancePoint) {
        if let Some(last) = self.points.back() {
            if point.timestamp_ms <= last.timestamp_ms {
                return;
            }
        }
        self.points.push_back(point);
        while self.points.len() > self.cap {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<DistancePoint> {
        self.points.back().copied()
    }

    /// The entry before the most recent one. Recovery strategies use this as
    /// the last reading known to be good, skipping the just-flagged one.
    pub fn last_good(&self) -> Option<DistancePoint> {
        if self.points.len() < 2 {
            return None;
        }
        self.points.get(self.points.len() - 2).copied()
    }

    /// The most recent `n` points in chronological order.
    pub fn recent(&self, n: usize) -> Vec<DistancePoint> {
        let start = self.points.len().saturating_sub(n);
        self.points.iter().skip(start).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp_ms: u64, meters: f64) -> DistancePoint {
        DistancePoint {
            timestamp_ms,
            meters,
        }
    }

    #[test]
    fn test_cap_drops_oldest_first() {
        let mut history = DistanceHistory::new(3);
        for i in 0..5u64 {
            history.push(point(i * 1000, i as f64 * 100.0));
        }
        assert_eq!(history.len(), 3);
        let recent = history.recent(3);
        let times: Vec<u64> = recent.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(times, vec![2000, 3000, 4000]);
    }

    #[test]
    fn test_retains_most_recent_in_order_at_large_cap() {
        let mut history = DistanceHistory::new(1000);
        for i in 0..1200u64 {
            history.push(point(i, i as f64));
        }
        assert_eq!(history.len(), 1000);
        let recent = history.recent(1000);
        assert_eq!(recent.first().unwrap().timestamp_ms, 200);
        assert_eq!(recent.last().unwrap().timestamp_ms, 1199);
        assert!(recent.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn test_stale_point_is_ignored() {
        let mut history = DistanceHistory::new(10);
        history.push(point(2000, 50.0));
        history.push(point(1000, 25.0));
        history.push(point(2000, 60.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().meters, 50.0);
    }

    #[test]
    fn test_last_good_skips_most_recent() {
        let mut history = DistanceHistory::new(10);
        assert!(history.last_good().is_none());
        history.push(point(1000, 100.0));
        assert!(history.last_good().is_none());
        history.push(point(2000, 200.0));
        assert_eq!(history.last_good().unwrap().meters, 100.0);
        history.push(point(3000, 300.0));
        assert_eq!(history.last_good().unwrap().meters, 200.0);
    }
}
