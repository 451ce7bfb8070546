pub mod api;
pub mod tracker;
pub mod types;

pub use api::{HyperliquidFeed, TradeFeed};
pub use tracker::{LiquidationTracker, TrackerConfig};
pub use types::{
    BlockchainLiquidation, LiquidationSide, LiquidationTotals, TradeRecord, TradeSide,
    UserDetail,
};
