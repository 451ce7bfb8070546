//! Multi-timeframe realized-volatility engine.
//!
//! ## What this engine answers
//! > "How turbulent is the market right now, and is that turbulence
//! > accelerating?"
//!
//! The engine keeps one fast price ring plus four downsampled rings, and on
//! every tick recomputes a full metrics snapshot from buffer state. The
//! snapshot is a pure function of the buffers, so identical buffer contents
//! always produce identical metrics.
//!
//! ## Downsampling
//! A single shared last-update timestamp gates the slower rings: a sample is
//! admitted to the 5s/30s/1m/5m rings only when the gap since the previous
//! update reaches that ring's threshold. The gates are NOT independent.
//!
//! ## Concurrency
//! The engine is single-writer. Parallel ingestion must funnel through one
//! consumer (see the `monitor` crate) rather than sharing the rings.

use std::collections::{HashMap, VecDeque};

use tracing::info;

use crate::buffer::PriceBuffer;
use crate::stats;
use crate::types::{
    PricePoint, RegimeChange, SignalAdjustment, TimeframeBucket, VolatilityMetrics,
    VolatilityRegime,
};

/// Seconds in a non-stop crypto trading year.
const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// 24h of 5-minute volatility samples.
const VOL_HISTORY_CAP: usize = 288;

/// Bounded regime transition log.
const REGIME_LOG_CAP: usize = 100;

pub struct VolatilityEngine {
    /// Every tick lands here: 60 samples of 1-second cadence.
    buf_1s: PriceBuffer,
    /// Downsampled rings: 5 minutes, 15 minutes, 1 hour, 24 hours.
    buf_5s: PriceBuffer,
    buf_30s: PriceBuffer,
    buf_1m: PriceBuffer,
    buf_5m: PriceBuffer,
    /// Shared downsampling gate for the slower rings.
    last_update_ms: Option<u64>,
    /// Rolling 24h history of `vol_5min` samples.
    vol_history: VecDeque<f64>,
    current_regime: VolatilityRegime,
    regime_log: VecDeque<RegimeChange>,
}

impl Default for VolatilityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatilityEngine {
    pub fn new() -> Self {
        Self {
            buf_1s: PriceBuffer::new(60),
            buf_5s: PriceBuffer::new(60),
            buf_30s: PriceBuffer::new(30),
            buf_1m: PriceBuffer::new(60),
            buf_5m: PriceBuffer::new(288),
            last_update_ms: None,
            vol_history: VecDeque::with_capacity(VOL_HISTORY_CAP),
            current_regime: VolatilityRegime::Dormant,
            regime_log: VecDeque::new(),
        }
    }

    /// Ingest a tick stamped with the current wall clock.
    pub fn update_price(&mut self, price: f64) -> VolatilityMetrics {
        self.update_price_at(price, common::time::now_ms())
    }

    /// Ingest a tick with an explicit timestamp and return a fresh snapshot.
    ///
    /// Callers are expected to validate `price > 0`; degenerate inputs yield
    /// degenerate-but-defined metrics rather than errors, to keep the hot
    /// path non-blocking.
    pub fn update_price_at(&mut self, price: f64, ts_ms: u64) -> VolatilityMetrics {
        let point = PricePoint { ts_ms, price };
        self.buf_1s.push(point);

        // One shared gate: the gap since the previous update (of any ring)
        // decides which downsampled rings admit this sample. The first tick
        // seeds everything.
        let gap_ms = self.last_update_ms.map(|last| ts_ms.saturating_sub(last));
        let admits = |threshold_ms: u64| gap_ms.is_none_or(|gap| gap >= threshold_ms);

        if admits(5_000) {
            self.buf_5s.push(point);
        }
        if admits(30_000) {
            self.buf_30s.push(point);
        }
        if admits(60_000) {
            self.buf_1m.push(point);
        }
        if admits(300_000) {
            self.buf_5m.push(point);
        }
        self.last_update_ms = Some(ts_ms);

        self.calculate_metrics(ts_ms)
    }

    /// Recompute the full snapshot from current buffer state.
    ///
    /// Appends the fresh `vol_5min` to the 24h history (so percentile and
    /// z-score include the current sample) and records regime transitions.
    pub fn calculate_metrics(&mut self, now_ms: u64) -> VolatilityMetrics {
        let vol_1min = realized_volatility(&self.buf_1s, now_ms, 60);
        let vol_5min = realized_volatility(&self.buf_5s, now_ms, 300);
        let vol_15min = realized_volatility(&self.buf_30s, now_ms, 900);
        let vol_1h = realized_volatility(&self.buf_1m, now_ms, 3_600);

        if self.vol_history.len() == VOL_HISTORY_CAP {
            self.vol_history.pop_front();
        }
        self.vol_history.push_back(vol_5min);

        let vol_acceleration = self.acceleration();
        let vol_dispersion = dispersion(vol_1min, vol_5min, vol_15min);

        let (vol_percentile_24h, vol_zscore) = if self.vol_history.len() > 10 {
            let history: Vec<f64> = self.vol_history.iter().copied().collect();
            (
                stats::percentile_rank(&history, vol_5min),
                stats::zscore(&history, vol_5min),
            )
        } else {
            (50.0, 0.0)
        };

        let regime = VolatilityRegime::classify(vol_5min);
        let regime_change = regime != self.current_regime;
        if regime_change {
            if self.regime_log.len() == REGIME_LOG_CAP {
                self.regime_log.pop_front();
            }
            self.regime_log.push_back(RegimeChange {
                ts_ms: now_ms,
                from: self.current_regime,
                to: regime,
                vol_5min,
            });
            info!(
                from = ?self.current_regime,
                to = ?regime,
                vol_5min,
                "volatility regime change"
            );
            self.current_regime = regime;
        }

        let cascade_risk_multiplier = risk_multiplier(
            regime,
            vol_acceleration,
            vol_percentile_24h,
            vol_dispersion,
            vol_zscore,
        );

        VolatilityMetrics {
            ts_ms: now_ms,
            vol_1min,
            vol_5min,
            vol_15min,
            vol_1h,
            vol_acceleration,
            vol_dispersion,
            regime,
            regime_change,
            vol_percentile_24h,
            vol_zscore,
            cascade_risk_multiplier,
        }
    }

    /// Read-only 5-minute realized volatility, without touching the 24h
    /// history. Used by snapshot composers that must not advance engine
    /// state.
    pub fn realized_vol_5min(&self, now_ms: u64) -> f64 {
        realized_volatility(&self.buf_5s, now_ms, 300)
    }

    /// Coarse slope over the last (up to) three history samples.
    fn acceleration(&self) -> f64 {
        let take = self.vol_history.len().min(3);
        if take < 2 {
            return 0.0;
        }
        let skip = self.vol_history.len() - take;
        let oldest = self.vol_history[skip];
        let newest = self.vol_history[self.vol_history.len() - 1];
        (newest - oldest) / take as f64
    }

    pub fn current_regime(&self) -> VolatilityRegime {
        self.current_regime
    }

    pub fn regime_changes(&self) -> &VecDeque<RegimeChange> {
        &self.regime_log
    }

    /// Threshold bundle for the cascade detector, keyed by the current
    /// regime.
    ///
    /// Only Extreme, High and Dormant override the neutral bundle. Low,
    /// Normal and Elevated pass through unmodified; leaving the common-case
    /// regimes untuned is policy, not an omission.
    pub fn signal_adjustment(&self) -> SignalAdjustment {
        use TimeframeBucket::*;

        match self.current_regime {
            VolatilityRegime::Extreme => SignalAdjustment {
                velocity_threshold_multiplier: 2.0,
                volume_threshold_multiplier: 2.5,
                correlation_threshold_adjustment: 0.10,
                timeframe_weights: HashMap::from([
                    (UltraFast, 1.5),
                    (Fast, 1.3),
                    (Normal, 1.0),
                    (Medium, 0.7),
                    (Slow, 0.5),
                ]),
            },
            VolatilityRegime::High => SignalAdjustment {
                velocity_threshold_multiplier: 1.5,
                volume_threshold_multiplier: 1.8,
                correlation_threshold_adjustment: 0.05,
                timeframe_weights: HashMap::from([
                    (UltraFast, 1.3),
                    (Fast, 1.2),
                    (Normal, 1.0),
                    (Medium, 0.8),
                    (Slow, 0.6),
                ]),
            },
            VolatilityRegime::Dormant => SignalAdjustment {
                velocity_threshold_multiplier: 0.5,
                volume_threshold_multiplier: 0.6,
                correlation_threshold_adjustment: -0.05,
                timeframe_weights: HashMap::from([
                    (UltraFast, 0.7),
                    (Fast, 0.8),
                    (Normal, 1.0),
                    (Medium, 1.2),
                    (Slow, 1.5),
                ]),
            },
            _ => SignalAdjustment::default(),
        }
    }
}

/// Annualized realized volatility over the trailing window of one ring.
///
/// Log-returns of consecutive in-window prices, population std, annualized
/// by `sqrt(seconds_per_year / window)`; continuous markets, no trading-day
/// adjustment. Fewer than two in-window points yield exactly 0.0.
fn realized_volatility(buffer: &PriceBuffer, now_ms: u64, window_secs: u64) -> f64 {
    let prices = buffer.window(now_ms, window_secs * 1_000);
    if prices.len() < 2 {
        return 0.0;
    }
    let returns = stats::log_returns(&prices);
    if returns.is_empty() {
        return 0.0;
    }
    let periods_per_year = SECONDS_PER_YEAR / window_secs as f64;
    stats::std_dev(&returns) * periods_per_year.sqrt()
}

/// Coefficient of variation across the short timeframes.
fn dispersion(vol_1min: f64, vol_5min: f64, vol_15min: f64) -> f64 {
    let vols = [vol_1min, vol_5min, vol_15min];
    let m = stats::mean(&vols);
    if m == 0.0 {
        return 0.0;
    }
    stats::std_dev(&vols) / m
}

/// Multiplicative risk stack on top of the per-regime base, capped at 10.
fn risk_multiplier(
    regime: VolatilityRegime,
    acceleration: f64,
    percentile: f64,
    dispersion: f64,
    zscore: f64,
) -> f64 {
    let mut m = regime.base_multiplier();

    if acceleration > 0.0 {
        m *= 1.0 + acceleration * 10.0;
    }
    if percentile > 95.0 {
        m *= 1.5;
    } else if percentile > 90.0 {
        m *= 1.2;
    }
    if dispersion > 0.5 {
        m *= 1.3;
    }
    if zscore.abs() > 3.0 {
        m *= 2.0;
    } else if zscore.abs() > 2.0 {
        m *= 1.5;
    }

    m.min(10.0)
}
