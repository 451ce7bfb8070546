//! Liquidation cascade detection.
//!
//! ## What this detector answers
//! > "Are forced closures arriving fast enough, accelerating hard enough and
//! > synchronized enough across venues to look like a cascade?"
//!
//! Events land in six parallel sliding windows (100ms to 5min). Metrics are
//! recomputed per event from the fast window only, so the hot path stays
//! responsive; the slower windows are served on demand via [`CascadeDetector::metrics_for`].
//!
//! Snapshots are pure functions of window contents: calling
//! [`CascadeDetector::metrics_for`] twice without ingesting anything returns
//! identical values.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::debug;
use volatility::SignalAdjustment;

use crate::types::{
    CascadeSignal, DetectorConfig, LiquidationEvent, LiquidationMetrics, Timeframe,
};
use crate::window::{SlidingWindow, WindowEvent};

pub struct CascadeDetector {
    config: DetectorConfig,
    /// Regime bundle from the volatility engine; neutral by default.
    adjustment: SignalAdjustment,
    /// One ring per timeframe, aligned with `Timeframe::ALL`.
    windows: [SlidingWindow; 6],
    /// Per-exchange event timestamps for the correlation proxy.
    exchange_logs: HashMap<String, VecDeque<u64>>,
    /// Bounded history of computed snapshots.
    history: VecDeque<LiquidationMetrics>,
}

impl Default for CascadeDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl CascadeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            adjustment: SignalAdjustment::default(),
            windows: Timeframe::ALL.map(SlidingWindow::new),
            exchange_logs: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    /// Ingest one liquidation and recompute metrics from the fast window.
    ///
    /// Budget is 10ms per call; overruns are logged via the `performance`
    /// target, never failed.
    pub fn process_liquidation(&mut self, event: &LiquidationEvent) -> LiquidationMetrics {
        common::logger::warn_if_slow("process_liquidation", Duration::from_millis(10), || {
            self.ingest(event)
        })
    }

    fn ingest(&mut self, event: &LiquidationEvent) -> LiquidationMetrics {
        let record = WindowEvent {
            ts_ms: event.ts_ms,
            side: event.side,
            size_usd: event.usd_value,
        };
        for window in self.windows.iter_mut() {
            window.push(record);
        }

        let log = self.exchange_logs.entry(event.exchange.clone()).or_default();
        if log.len() == self.config.exchange_log_cap {
            log.pop_front();
        }
        log.push_back(event.ts_ms);

        let metrics = self.metrics_for(Timeframe::Fast, event.ts_ms);
        debug!(
            exchange = %event.exchange,
            usd = event.usd_value,
            events_per_second = metrics.events_per_second,
            signal = ?metrics.signal,
            "liquidation ingested"
        );

        if self.history.len() == self.config.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(metrics.clone());
        metrics
    }

    /// Compute a fresh snapshot over one window's trailing contents.
    ///
    /// An empty window is a quiet market, not an error: every field zeroes
    /// out and the signal is `None`.
    pub fn metrics_for(&self, timeframe: Timeframe, now_ms: u64) -> LiquidationMetrics {
        let stats = self.window(timeframe).stats(now_ms);
        let secs = timeframe.window_secs();

        let events_per_second = stats.count as f64 / secs;
        let volume_per_second = stats.volume_usd / secs;

        let long_short_ratio = match (stats.longs, stats.shorts) {
            (0, 0) => 0.0,
            (_, 0) => f64::INFINITY,
            (longs, shorts) => longs as f64 / shorts as f64,
        };

        let (events_acceleration, volume_acceleration) = match self.history.back() {
            Some(prev) if now_ms > prev.ts_ms => {
                let dt = (now_ms - prev.ts_ms) as f64 / 1_000.0;
                (
                    (events_per_second - prev.events_per_second) / dt,
                    (volume_per_second - prev.volume_per_second) / dt,
                )
            }
            _ => (0.0, 0.0),
        };

        let (exchange_correlation, leading_exchange) = self.exchange_correlation(now_ms);

        let cascade_probability = self.cascade_probability(
            events_per_second,
            events_acceleration,
            volume_per_second,
            exchange_correlation,
        );
        let signal = self.classify_signal(
            cascade_probability,
            events_per_second,
            events_acceleration,
            volume_per_second,
        );

        LiquidationMetrics {
            ts_ms: now_ms,
            events_per_second,
            volume_per_second,
            events_acceleration,
            volume_acceleration,
            long_short_ratio,
            avg_liquidation_size: stats.avg_size_usd(),
            max_liquidation_size: stats.max_size_usd,
            exchange_correlation,
            leading_exchange,
            cascade_probability,
            signal,
        }
    }

    /// Probability blended across the sub-5-minute windows using the
    /// regime-tuned bucket weights. Buckets missing from the map weigh 1.0.
    pub fn composite_probability(&self, now_ms: u64) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for timeframe in Timeframe::ALL {
            let Some(bucket) = timeframe.bucket() else {
                continue;
            };
            let weight = self
                .adjustment
                .timeframe_weights
                .get(&bucket)
                .copied()
                .unwrap_or(1.0);
            weighted += weight * self.metrics_for(timeframe, now_ms).cascade_probability;
            total += weight;
        }
        if total == 0.0 { 0.0 } else { weighted / total }
    }

    /// Install the regime bundle from the volatility engine. A neutral
    /// bundle restores the configured thresholds.
    pub fn apply_signal_adjustment(&mut self, adjustment: SignalAdjustment) {
        self.adjustment = adjustment;
    }

    /// The most recent computed snapshot, if any event has been ingested.
    pub fn latest(&self) -> Option<&LiquidationMetrics> {
        self.history.back()
    }

    pub fn history(&self) -> &VecDeque<LiquidationMetrics> {
        &self.history
    }

    fn window(&self, timeframe: Timeframe) -> &SlidingWindow {
        let index = Timeframe::ALL
            .iter()
            .position(|tf| *tf == timeframe)
            .expect("timeframe is a member of ALL");
        &self.windows[index]
    }

    /// Cross-exchange synchrony over the trailing correlation window:
    /// `1 - variance/mean²` of per-exchange event counts, clamped to [0, 1],
    /// plus the busiest exchange. Needs at least two active exchanges.
    fn exchange_correlation(&self, now_ms: u64) -> (f64, Option<String>) {
        let cutoff = now_ms.saturating_sub(self.config.correlation_window_ms);

        let mut active: Vec<(&str, usize)> = Vec::new();
        for (exchange, log) in &self.exchange_logs {
            let count = log
                .iter()
                .filter(|&&ts| ts >= cutoff && ts <= now_ms)
                .count();
            if count > 0 {
                active.push((exchange.as_str(), count));
            }
        }

        if active.len() < 2 {
            return (0.0, None);
        }

        let counts: Vec<f64> = active.iter().map(|(_, n)| *n as f64).collect();
        let mean = volatility::stats::mean(&counts);
        let std = volatility::stats::std_dev(&counts);
        let correlation = (1.0 - (std * std) / (mean * mean)).clamp(0.0, 1.0);

        let leading = active
            .iter()
            .max_by_key(|(_, n)| *n)
            .map(|(exchange, _)| exchange.to_string());

        (correlation, leading)
    }

    fn velocity_warning(&self) -> f64 {
        self.config.velocity_warning * self.adjustment.velocity_threshold_multiplier
    }

    fn velocity_critical(&self) -> f64 {
        self.config.velocity_critical * self.adjustment.velocity_threshold_multiplier
    }

    fn volume_critical(&self) -> f64 {
        self.config.volume_critical * self.adjustment.volume_threshold_multiplier
    }

    /// Weighted sum of normalized sub-scores. The funding/open-interest
    /// weights in the table are reserved and not folded in here.
    fn cascade_probability(
        &self,
        velocity: f64,
        acceleration: f64,
        volume: f64,
        correlation: f64,
    ) -> f64 {
        let w = &self.config.weights;

        let velocity_score = (velocity / self.velocity_critical()).clamp(0.0, 1.0);
        let acceleration_score =
            (acceleration / self.config.acceleration_critical).clamp(0.0, 1.0);
        let volume_score = (volume / self.volume_critical()).clamp(0.0, 1.0);
        let correlation_score =
            (correlation - self.adjustment.correlation_threshold_adjustment).clamp(0.0, 1.0);

        let mut probability = w.velocity * velocity_score
            + w.acceleration * acceleration_score
            + w.volume * volume_score
            + w.correlation * correlation_score;

        if acceleration > self.config.acceleration_critical {
            probability *= 1.5;
        }

        probability.clamp(0.0, 1.0)
    }

    /// First matching level wins, checked from the top. The raw-magnitude
    /// overrides escalate even when the blended probability lags behind.
    fn classify_signal(
        &self,
        probability: f64,
        velocity: f64,
        acceleration: f64,
        volume: f64,
    ) -> CascadeSignal {
        let warning = self.velocity_warning();
        let critical = self.velocity_critical();
        let volume_critical = self.volume_critical();

        if probability > 0.9 || velocity > 2.0 * critical || volume > 2.0 * volume_critical {
            CascadeSignal::Extreme
        } else if probability > 0.7
            || (velocity > critical && acceleration > self.config.acceleration_critical)
        {
            CascadeSignal::Critical
        } else if probability > 0.5 || velocity > 2.0 * warning {
            CascadeSignal::Alert
        } else if probability > 0.3 || velocity > warning {
            CascadeSignal::Watch
        } else {
            CascadeSignal::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn liquidation(exchange: &str, side: Side, usd: f64, ts_ms: u64) -> LiquidationEvent {
        LiquidationEvent {
            exchange: exchange.to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            quantity: usd / 50_000.0,
            usd_value: usd,
            price: 50_000.0,
            ts_ms,
        }
    }

    #[test]
    fn empty_window_is_a_quiet_market() {
        let detector = CascadeDetector::default();
        let metrics = detector.metrics_for(Timeframe::Fast, 1_000_000);

        assert_eq!(metrics.events_per_second, 0.0);
        assert_eq!(metrics.volume_per_second, 0.0);
        assert_eq!(metrics.long_short_ratio, 0.0);
        assert_eq!(metrics.signal, CascadeSignal::None);
        assert_eq!(metrics.leading_exchange, None);
    }

    #[test]
    fn metrics_are_idempotent_without_new_events() {
        let mut detector = CascadeDetector::default();
        detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_000_000));

        let a = detector.metrics_for(Timeframe::Fast, 1_000_050);
        let b = detector.metrics_for(Timeframe::Fast, 1_000_050);
        assert_eq!(a.events_per_second, b.events_per_second);
        assert_eq!(a.cascade_probability, b.cascade_probability);
        assert_eq!(a.signal, b.signal);
    }

    #[test]
    fn burst_of_sixty_million_dollar_events_is_extreme() {
        let mut detector = CascadeDetector::default();
        let start = 1_000_000u64;

        let mut last = None;
        for i in 0..60u64 {
            let side = if i % 2 == 0 { Side::Long } else { Side::Short };
            let event = liquidation("binance", side, 1_000_000.0, start + i * 8);
            last = Some(detector.process_liquidation(&event));
        }
        let metrics = last.unwrap();

        // 60 events and $60M inside the trailing 500ms window.
        assert_eq!(metrics.events_per_second, 120.0);
        assert_eq!(metrics.volume_per_second, 120_000_000.0);
        assert!((metrics.long_short_ratio - 1.0).abs() < 1e-12);
        // $120M/s is past twice the $50M/s critical volume.
        assert_eq!(metrics.signal, CascadeSignal::Extreme);
    }

    #[test]
    fn long_only_flow_reports_infinite_ratio() {
        let mut detector = CascadeDetector::default();
        let metrics =
            detector.process_liquidation(&liquidation("binance", Side::Long, 5_000.0, 1_000_000));
        assert!(metrics.long_short_ratio.is_infinite());
    }

    #[test]
    fn acceleration_sign_tracks_rate_change() {
        let mut detector = CascadeDetector::default();
        detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_000_000));

        // Rate rises: two events in the window vs one before.
        detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_001_000));
        let rising =
            detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_001_050));
        assert!(rising.events_acceleration > 0.0);

        // Long gap: rate back down to a single in-window event.
        let falling =
            detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_004_000));
        assert!(falling.events_acceleration < 0.0);
    }

    #[test]
    fn correlation_requires_two_active_exchanges() {
        let mut detector = CascadeDetector::default();
        let metrics =
            detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, 1_000_000));
        assert_eq!(metrics.exchange_correlation, 0.0);
        assert_eq!(metrics.leading_exchange, None);
    }

    #[test]
    fn synchronized_exchanges_correlate_and_busiest_leads() {
        let mut detector = CascadeDetector::default();
        let start = 1_000_000u64;

        detector.process_liquidation(&liquidation("binance", Side::Long, 1_000.0, start));
        detector.process_liquidation(&liquidation("bybit", Side::Long, 1_000.0, start + 100));
        detector.process_liquidation(&liquidation("bybit", Side::Short, 1_000.0, start + 200));
        let metrics =
            detector.process_liquidation(&liquidation("bybit", Side::Long, 1_000.0, start + 300));

        // Counts 1 vs 3: mean 2, var 1, correlation 1 - 1/4.
        assert!((metrics.exchange_correlation - 0.75).abs() < 1e-12);
        assert_eq!(metrics.leading_exchange.as_deref(), Some("bybit"));
    }

    #[test]
    fn moderate_burst_raises_a_watch() {
        let mut detector = CascadeDetector::default();
        let start = 1_000_000u64;

        let mut last = None;
        for i in 0..6u64 {
            last = Some(detector.process_liquidation(&liquidation(
                "binance",
                Side::Short,
                10_000.0,
                start + i * 80,
            )));
        }
        let metrics = last.unwrap();

        // 6 events / 500ms = 12/s, past the 10/s warning line.
        assert_eq!(metrics.events_per_second, 12.0);
        assert!(metrics.signal >= CascadeSignal::Watch);
        assert!(metrics.signal < CascadeSignal::Critical);
    }

    #[test]
    fn dormant_adjustment_tightens_the_ladder() {
        let mut detector = CascadeDetector::default();
        let dormant = SignalAdjustment {
            velocity_threshold_multiplier: 0.5,
            volume_threshold_multiplier: 0.6,
            correlation_threshold_adjustment: -0.05,
            timeframe_weights: Default::default(),
        };
        detector.apply_signal_adjustment(dormant);

        let start = 1_000_000u64;
        let mut last = None;
        for i in 0..6u64 {
            last = Some(detector.process_liquidation(&liquidation(
                "binance",
                Side::Short,
                10_000.0,
                start + i * 80,
            )));
        }
        let metrics = last.unwrap();

        // 12/s clears twice the halved warning threshold (2 × 5/s).
        assert!(metrics.signal >= CascadeSignal::Alert);
    }

    #[test]
    fn history_is_bounded() {
        let mut detector = CascadeDetector::new(DetectorConfig {
            history_cap: 10,
            ..DetectorConfig::default()
        });
        for i in 0..50u64 {
            detector.process_liquidation(&liquidation(
                "binance",
                Side::Long,
                1_000.0,
                1_000_000 + i * 10,
            ));
        }
        assert_eq!(detector.history().len(), 10);
        assert!(detector.latest().is_some());
    }

    #[test]
    fn composite_probability_stays_normalized() {
        let mut detector = CascadeDetector::default();
        let start = 1_000_000u64;
        for i in 0..30u64 {
            detector.process_liquidation(&liquidation(
                "binance",
                Side::Long,
                2_000_000.0,
                start + i * 10,
            ));
        }
        let composite = detector.composite_probability(start + 300);
        assert!((0.0..=1.0).contains(&composite));
    }
}
