pub mod aggregator;
pub mod client;
pub mod de;
pub mod errors;
pub mod types;

pub use aggregator::{AggregatorConfig, ContextAggregator, cascade_risk_score};
pub use client::{
    BinanceFuturesApi, EngineVolatility, ExchangeApi, OpenInterestRead, OrderBook,
    VolatilityProvider,
};
pub use errors::FetchError;
pub use types::{
    DepthSection, FundingSection, FundingTrend, MarketContext, OpenInterestSection,
    PremiumSection, SectionValidity, VolatilitySection,
};
