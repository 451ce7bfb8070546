use chrono::{DateTime, Utc};

/// Whether a context section was populated this cycle or zero-filled after
/// a failed fetch. Lets callers tell "legitimately zero" apart from
/// "source unavailable".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SectionValidity {
    /// Fetch failed or timed out; the section holds zero defaults.
    #[default]
    Missing,
    /// Populated from a live response this cycle.
    Valid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FundingTrend {
    Increasing,
    Decreasing,
    #[default]
    Neutral,
}

/// Funding-rate section. Rates are in percent per funding interval.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FundingSection {
    pub rate: f64,
    /// Latest rate vs ten samples back, ±10% bands.
    pub trend: FundingTrend,
    pub max_24h: f64,
    pub validity: SectionValidity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OpenInterestSection {
    pub open_interest: f64,
    pub change_1m_pct: f64,
    pub change_5m_pct: f64,
    pub change_1h_pct: f64,
    pub validity: SectionValidity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthSection {
    /// Notional within ±2% of mid, per side.
    pub bid_depth_usd: f64,
    pub ask_depth_usd: f64,
    /// `(bid − ask) / (bid + ask)`.
    pub imbalance: f64,
    pub change_1m_pct: f64,
    pub validity: SectionValidity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PremiumSection {
    pub spot_price: f64,
    pub perp_price: f64,
    /// `(perp − spot) / spot`, as a fraction.
    pub premium: f64,
    pub validity: SectionValidity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VolatilitySection {
    /// Locally computed 5-minute realized volatility.
    pub realized_5min: f64,
    pub validity: SectionValidity,
}

/// Composed cross-venue snapshot. The aggregator caches one of these for
/// ~100ms to bound upstream call rate.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketContext {
    pub symbol: String,
    pub time: DateTime<Utc>,
    pub ts_ms: u64,
    pub funding: FundingSection,
    pub open_interest: OpenInterestSection,
    pub depth: DepthSection,
    pub premium: PremiumSection,
    pub volatility: VolatilitySection,
    /// Additive 0–100 cascade-risk score over the sections above.
    pub risk_score: u8,
}
