use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Aggressor side of a venue trade: `B` buyer, `A` seller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TradeSide {
    B,
    A,
}

/// Raw record from the venue's trade-query endpoint. Prices and sizes stay
/// string-encoded on the wire.
#[derive(Clone, Debug, Deserialize)]
pub struct TradeRecord {
    pub coin: String,
    pub side: TradeSide,
    pub px: String,
    pub sz: String,
    /// Epoch milliseconds.
    pub time: u64,
    pub hash: String,
    /// `[buyer, seller]`.
    pub users: Vec<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// Side of the position that was force-closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiquidationSide {
    Long,
    Short,
}

/// A liquidation identified on the venue's trade feed by its liquidator
/// counterparty.
#[derive(Clone, Debug)]
pub struct BlockchainLiquidation {
    pub tx_hash: String,
    /// Populated only when the feed reports one.
    pub block_height: Option<u64>,
    pub ts_ms: u64,
    pub coin: String,
    pub side: TradeSide,
    /// Liquidator buying closes a short; liquidator selling closes a long.
    pub liquidation_side: LiquidationSide,
    pub price: f64,
    pub size: f64,
    pub value_usd: f64,
    pub liquidated_user: String,
    pub liquidator: String,
}

impl From<&BlockchainLiquidation> for cascade::LiquidationEvent {
    fn from(liq: &BlockchainLiquidation) -> Self {
        Self {
            exchange: "hyperliquid".to_string(),
            symbol: liq.coin.clone(),
            side: match liq.liquidation_side {
                LiquidationSide::Long => cascade::Side::Long,
                LiquidationSide::Short => cascade::Side::Short,
            },
            quantity: liq.size,
            usd_value: liq.value_usd,
            price: liq.price,
            ts_ms: liq.ts_ms,
        }
    }
}

/// Per-user rollup with first/last observation times.
#[derive(Clone, Debug)]
pub struct UserDetail {
    pub count: u64,
    pub value_usd: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SideTotals {
    pub count: u64,
    pub value_usd: f64,
}

/// Running counters. Monotonic until the next external snapshot/reset.
#[derive(Clone, Debug, Default)]
pub struct LiquidationTotals {
    pub total_count: u64,
    pub total_value_usd: f64,
    pub long_count: u64,
    pub long_value_usd: f64,
    pub short_count: u64,
    pub short_value_usd: f64,
    pub by_coin: HashMap<String, u64>,
    pub by_coin_side: HashMap<(String, LiquidationSide), SideTotals>,
    pub by_user: HashMap<String, UserDetail>,
}

impl LiquidationTotals {
    /// Heaviest liquidated users by notional, descending.
    pub fn top_users(&self, limit: usize) -> Vec<(&str, &UserDetail)> {
        let mut users: Vec<(&str, &UserDetail)> = self
            .by_user
            .iter()
            .map(|(user, detail)| (user.as_str(), detail))
            .collect();
        users.sort_by(|a, b| b.1.value_usd.total_cmp(&a.1.value_usd));
        users.truncate(limit);
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_record_parses_the_wire_shape() {
        let raw = r#"{
            "coin": "BTC",
            "side": "B",
            "px": "50123.5",
            "sz": "0.42",
            "time": 1700000000123,
            "hash": "0xabc",
            "users": ["0xLiq", "0xUser"]
        }"#;
        let record: TradeRecord = serde_json::from_str(raw).unwrap();

        assert_eq!(record.coin, "BTC");
        assert_eq!(record.side, TradeSide::B);
        assert_eq!(record.px, "50123.5");
        assert_eq!(record.users.len(), 2);
        assert_eq!(record.block_height, None);
    }

    #[test]
    fn conversion_feeds_the_detector_shape() {
        let liq = BlockchainLiquidation {
            tx_hash: "0xabc".into(),
            block_height: None,
            ts_ms: 1_700_000_000_000,
            coin: "ETH".into(),
            side: TradeSide::A,
            liquidation_side: LiquidationSide::Long,
            price: 3_000.0,
            size: 2.0,
            value_usd: 6_000.0,
            liquidated_user: "0xuser".into(),
            liquidator: "0xliq".into(),
        };

        let event = cascade::LiquidationEvent::from(&liq);
        assert_eq!(event.exchange, "hyperliquid");
        assert_eq!(event.symbol, "ETH");
        assert_eq!(event.side, cascade::Side::Long);
        assert_eq!(event.usd_value, 6_000.0);
    }

    #[test]
    fn top_users_sorts_by_notional() {
        let mut totals = LiquidationTotals::default();
        let when = Utc::now();
        for (user, value) in [("a", 10.0), ("b", 30.0), ("c", 20.0)] {
            totals.by_user.insert(
                user.to_string(),
                UserDetail {
                    count: 1,
                    value_usd: value,
                    first_seen: when,
                    last_seen: when,
                },
            );
        }

        let top = totals.top_users(2);
        assert_eq!(top[0].0, "b");
        assert_eq!(top[1].0, "c");
    }
}
