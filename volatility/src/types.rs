use std::collections::HashMap;

/// A single observed price at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
    pub ts_ms: u64,
    pub price: f64,
}

/// Discrete volatility regime, ordered by increasing 5-minute realized
/// volatility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VolatilityRegime {
    Dormant,
    Low,
    Normal,
    Elevated,
    High,
    Extreme,
}

impl VolatilityRegime {
    /// Classify from 5-minute realized volatility. Boundary comparisons are
    /// strict, so a value sitting exactly on a boundary lands in the higher
    /// bucket.
    pub fn classify(vol_5min: f64) -> Self {
        if vol_5min < 0.005 {
            Self::Dormant
        } else if vol_5min < 0.01 {
            Self::Low
        } else if vol_5min < 0.02 {
            Self::Normal
        } else if vol_5min < 0.03 {
            Self::Elevated
        } else if vol_5min < 0.05 {
            Self::High
        } else {
            Self::Extreme
        }
    }

    /// Base cascade-risk multiplier for this regime.
    pub fn base_multiplier(self) -> f64 {
        match self {
            Self::Dormant => 1.0,
            Self::Low => 1.2,
            Self::Normal => 1.5,
            Self::Elevated => 2.0,
            Self::High => 3.0,
            Self::Extreme => 5.0,
        }
    }
}

/// Logged transition between regimes.
#[derive(Clone, Copy, Debug)]
pub struct RegimeChange {
    pub ts_ms: u64,
    pub from: VolatilityRegime,
    pub to: VolatilityRegime,
    /// The 5-minute realized volatility that triggered the transition.
    pub vol_5min: f64,
}

/// Derived snapshot, recomputed from buffer state on every price update.
#[derive(Clone, Debug)]
pub struct VolatilityMetrics {
    pub ts_ms: u64,
    pub vol_1min: f64,
    pub vol_5min: f64,
    pub vol_15min: f64,
    pub vol_1h: f64,
    /// Slope over the most recent few samples of the 24h vol history.
    pub vol_acceleration: f64,
    /// Coefficient of variation across the short timeframes; high values
    /// mean the timeframes disagree.
    pub vol_dispersion: f64,
    pub regime: VolatilityRegime,
    pub regime_change: bool,
    pub vol_percentile_24h: f64,
    pub vol_zscore: f64,
    /// Multiplier in [1, 10] handed to downstream risk scoring.
    pub cascade_risk_multiplier: f64,
}

/// Detector timeframe buckets addressable by regime-tuned weight maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeframeBucket {
    UltraFast,
    Fast,
    Normal,
    Medium,
    Slow,
}

/// Threshold multipliers handed to the cascade detector.
///
/// Only the Extreme, High and Dormant regimes override the neutral bundle;
/// the middle regimes deliberately pass through untuned.
#[derive(Clone, Debug)]
pub struct SignalAdjustment {
    pub velocity_threshold_multiplier: f64,
    pub volume_threshold_multiplier: f64,
    /// Raises (or lowers) the bar for cross-exchange correlation before it
    /// contributes to cascade probability.
    pub correlation_threshold_adjustment: f64,
    /// Per-bucket weighting for cross-window blending. Empty means neutral.
    pub timeframe_weights: HashMap<TimeframeBucket, f64>,
}

impl Default for SignalAdjustment {
    fn default() -> Self {
        Self {
            velocity_threshold_multiplier: 1.0,
            volume_threshold_multiplier: 1.0,
            correlation_threshold_adjustment: 0.0,
            timeframe_weights: HashMap::new(),
        }
    }
}
