use std::collections::VecDeque;

use crate::types::{Side, Timeframe};

/// Compact per-event record kept inside a sliding window.
#[derive(Clone, Copy, Debug)]
pub struct WindowEvent {
    pub ts_ms: u64,
    pub side: Side,
    pub size_usd: f64,
}

/// Aggregate over the in-window events of one timeframe.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowStats {
    pub count: usize,
    pub volume_usd: f64,
    pub longs: usize,
    pub shorts: usize,
    pub max_size_usd: f64,
}

impl WindowStats {
    pub fn avg_size_usd(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.volume_usd / self.count as f64
    }
}

/// Count-capped event ring for one timeframe. Events are stored in arrival
/// order; trailing-window filtering happens when stats are taken, not on
/// insert.
#[derive(Debug)]
pub struct SlidingWindow {
    timeframe: Timeframe,
    events: VecDeque<WindowEvent>,
}

impl SlidingWindow {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            events: VecDeque::new(),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn push(&mut self, event: WindowEvent) {
        if self.events.len() == self.timeframe.max_events() {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Aggregate stats over events inside the trailing window ending at
    /// `now_ms`.
    pub fn stats(&self, now_ms: u64) -> WindowStats {
        let cutoff = now_ms.saturating_sub(self.timeframe.window_ms());
        let mut stats = WindowStats::default();

        for event in &self.events {
            if event.ts_ms < cutoff || event.ts_ms > now_ms {
                continue;
            }
            stats.count += 1;
            stats.volume_usd += event.size_usd;
            match event.side {
                Side::Long => stats.longs += 1,
                Side::Short => stats.shorts += 1,
            }
            if event.size_usd > stats.max_size_usd {
                stats.max_size_usd = event.size_usd;
            }
        }

        stats
    }
}
