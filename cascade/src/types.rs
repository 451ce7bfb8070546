use volatility::TimeframeBucket;

/// Side of the position that was force-closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

/// One forced closure reported by an upstream feed.
#[derive(Clone, Debug)]
pub struct LiquidationEvent {
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    /// Contracts / base units closed.
    pub quantity: f64,
    pub usd_value: f64,
    pub price: f64,
    /// Epoch milliseconds. Feeds that omit a timestamp stamp ingestion time.
    pub ts_ms: u64,
}

/// Five-level alert ladder, ordered by escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CascadeSignal {
    None,
    Watch,
    Alert,
    Critical,
    Extreme,
}

/// The six parallel detection windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeframe {
    UltraFast,
    Fast,
    Normal,
    Medium,
    Slow,
    Macro,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::UltraFast,
        Timeframe::Fast,
        Timeframe::Normal,
        Timeframe::Medium,
        Timeframe::Slow,
        Timeframe::Macro,
    ];

    pub fn window_ms(self) -> u64 {
        match self {
            Timeframe::UltraFast => 100,
            Timeframe::Fast => 500,
            Timeframe::Normal => 2_000,
            Timeframe::Medium => 10_000,
            Timeframe::Slow => 60_000,
            Timeframe::Macro => 300_000,
        }
    }

    pub fn window_secs(self) -> f64 {
        self.window_ms() as f64 / 1_000.0
    }

    /// Ring capacity; longer windows get more headroom.
    pub fn max_events(self) -> usize {
        match self {
            Timeframe::UltraFast => 512,
            Timeframe::Fast => 1_024,
            Timeframe::Normal => 2_048,
            Timeframe::Medium => 4_096,
            Timeframe::Slow => 8_192,
            Timeframe::Macro => 8_192,
        }
    }

    /// Bucket addressed by regime-tuned weight maps. The macro window sits
    /// outside the weighted blend.
    pub fn bucket(self) -> Option<TimeframeBucket> {
        match self {
            Timeframe::UltraFast => Some(TimeframeBucket::UltraFast),
            Timeframe::Fast => Some(TimeframeBucket::Fast),
            Timeframe::Normal => Some(TimeframeBucket::Normal),
            Timeframe::Medium => Some(TimeframeBucket::Medium),
            Timeframe::Slow => Some(TimeframeBucket::Slow),
            Timeframe::Macro => None,
        }
    }
}

/// Derived snapshot recomputed on every ingested event, using the fast
/// window for responsiveness.
#[derive(Clone, Debug)]
pub struct LiquidationMetrics {
    pub ts_ms: u64,
    pub events_per_second: f64,
    pub volume_per_second: f64,
    /// Finite difference of event rate against the previous snapshot.
    pub events_acceleration: f64,
    pub volume_acceleration: f64,
    /// `inf` when only longs were liquidated; 0.0 on an empty window.
    pub long_short_ratio: f64,
    pub avg_liquidation_size: f64,
    pub max_liquidation_size: f64,
    /// Cross-exchange synchrony proxy in [0, 1].
    pub exchange_correlation: f64,
    pub leading_exchange: Option<String>,
    pub cascade_probability: f64,
    pub signal: CascadeSignal,
}

/// Sub-score weights for the cascade probability composite.
///
/// Only velocity, acceleration, volume and correlation are folded into the
/// composite today; the funding and open-interest slots are reserved for
/// context-driven sub-scores, so the active weights sum to 0.80.
#[derive(Clone, Copy, Debug)]
pub struct ProbabilityWeights {
    pub velocity: f64,
    pub acceleration: f64,
    pub volume: f64,
    pub correlation: f64,
    pub funding: f64,
    pub open_interest: f64,
}

impl Default for ProbabilityWeights {
    fn default() -> Self {
        Self {
            velocity: 0.25,
            acceleration: 0.20,
            volume: 0.20,
            correlation: 0.15,
            funding: 0.10,
            open_interest: 0.10,
        }
    }
}

/// Detection thresholds. Velocity in events/s, acceleration in events/s²,
/// volume in USD/s.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub velocity_warning: f64,
    pub velocity_critical: f64,
    pub acceleration_critical: f64,
    pub volume_critical: f64,
    /// Window for cross-exchange correlation, independent of the metric
    /// timeframe.
    pub correlation_window_ms: u64,
    /// Bounded history of computed snapshots.
    pub history_cap: usize,
    /// Per-exchange activity log cap.
    pub exchange_log_cap: usize,
    pub weights: ProbabilityWeights,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            velocity_warning: 10.0,
            velocity_critical: 50.0,
            acceleration_critical: 20.0,
            volume_critical: 50_000_000.0,
            correlation_window_ms: 2_000,
            history_cap: 100,
            exchange_log_cap: 1_000,
            weights: ProbabilityWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframes_are_ordered_by_window() {
        let mut previous = 0;
        for tf in Timeframe::ALL {
            assert!(tf.window_ms() > previous);
            previous = tf.window_ms();
        }
    }

    #[test]
    fn active_probability_weights_sum_to_080() {
        let w = ProbabilityWeights::default();
        let active = w.velocity + w.acceleration + w.volume + w.correlation;
        assert!((active - 0.80).abs() < 1e-12);
    }

    #[test]
    fn signals_escalate_in_order() {
        assert!(CascadeSignal::Watch > CascadeSignal::None);
        assert!(CascadeSignal::Extreme > CascadeSignal::Critical);
    }
}
