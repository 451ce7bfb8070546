use std::collections::VecDeque;

use crate::types::PricePoint;

/// Fixed-capacity price ring. The oldest sample is evicted on overflow;
/// trailing-window filtering happens at metric-computation time, not on
/// insert, so a quiet feed never truncates history early.
#[derive(Debug)]
pub struct PriceBuffer {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: PricePoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Prices inside the trailing window, oldest first.
    pub fn window(&self, now_ms: u64, window_ms: u64) -> Vec<f64> {
        let cutoff = now_ms.saturating_sub(window_ms);
        self.points
            .iter()
            .filter(|p| p.ts_ms >= cutoff)
            .map(|p| p.price)
            .collect()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts_ms: u64, price: f64) -> PricePoint {
        PricePoint { ts_ms, price }
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut buf = PriceBuffer::new(3);
        for i in 0..5u64 {
            buf.push(point(i * 1_000, 100.0 + i as f64));
        }

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.latest().unwrap().price, 104.0);
        // Samples 0 and 1 were evicted.
        assert_eq!(buf.window(4_000, 60_000), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn window_filters_by_age_not_count() {
        let mut buf = PriceBuffer::new(10);
        buf.push(point(0, 1.0));
        buf.push(point(5_000, 2.0));
        buf.push(point(9_000, 3.0));

        assert_eq!(buf.window(9_000, 5_000), vec![2.0, 3.0]);
        assert_eq!(buf.window(9_000, 1_000), vec![3.0]);
    }

    #[test]
    fn empty_buffer_yields_empty_window() {
        let buf = PriceBuffer::new(4);
        assert!(buf.is_empty());
        assert!(buf.window(1_000, 1_000).is_empty());
    }
}
