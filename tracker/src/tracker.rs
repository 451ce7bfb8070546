//! Liquidation tracking over a venue's trade feed.
//!
//! A trade with exactly two counterparties is a liquidation when one of
//! them is the venue's known liquidator address; the other address is the
//! liquidated user. The liquidator always takes the opposite side of the
//! user's original position, so liquidator-as-buyer closes a short and
//! liquidator-as-seller closes a long.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::TradeFeed;
use crate::types::{
    BlockchainLiquidation, LiquidationSide, LiquidationTotals, TradeRecord, UserDetail,
};

/// Tunables for liquidation tracking.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Liquidator counterparty address, compared case-insensitively.
    pub liquidator: String,
    /// Poll spacing for the realtime monitor.
    pub poll_interval: Duration,
    /// Hashes older than this are dropped from the dedupe set.
    pub dedupe_window_ms: u64,
    /// Per-user detail cap; the stalest user is evicted beyond it.
    pub max_tracked_users: usize,
}

impl TrackerConfig {
    pub fn new(liquidator: impl Into<String>) -> Self {
        Self {
            liquidator: liquidator.into(),
            poll_interval: Duration::from_secs(2),
            dedupe_window_ms: 24 * 60 * 60 * 1_000,
            max_tracked_users: 10_000,
        }
    }
}

/// Time-bounded transaction-hash dedupe set.
struct SeenHashes {
    order: VecDeque<(u64, String)>,
    set: HashSet<String>,
    window_ms: u64,
}

impl SeenHashes {
    fn new(window_ms: u64) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            window_ms,
        }
    }

    /// Returns false when the hash was already seen inside the window.
    fn insert(&mut self, ts_ms: u64, hash: &str) -> bool {
        self.prune(ts_ms);
        if self.set.contains(hash) {
            return false;
        }
        self.set.insert(hash.to_string());
        self.order.push_back((ts_ms, hash.to_string()));
        true
    }

    fn prune(&mut self, now_ms: u64) {
        while let Some((ts, _)) = self.order.front() {
            if now_ms.saturating_sub(*ts) > self.window_ms {
                let (_, hash) = self.order.pop_front().expect("front exists");
                self.set.remove(&hash);
            } else {
                break;
            }
        }
    }

    fn len(&self) -> usize {
        self.set.len()
    }
}

pub struct LiquidationTracker<F: TradeFeed> {
    feed: Arc<F>,
    config: TrackerConfig,
    totals: LiquidationTotals,
    seen: SeenHashes,
}

impl<F: TradeFeed> LiquidationTracker<F> {
    pub fn new(feed: Arc<F>, config: TrackerConfig) -> Self {
        let seen = SeenHashes::new(config.dedupe_window_ms);
        Self {
            feed,
            config,
            totals: LiquidationTotals::default(),
            seen,
        }
    }

    /// Classify one trade record; `None` when it is an ordinary trade.
    pub fn classify_trade(&self, trade: &TradeRecord) -> Option<BlockchainLiquidation> {
        if trade.users.len() != 2 {
            return None;
        }
        let liquidator = &self.config.liquidator;
        let buyer = &trade.users[0];
        let seller = &trade.users[1];

        let (liquidation_side, liquidated_user) = if buyer.eq_ignore_ascii_case(liquidator) {
            (LiquidationSide::Short, seller.clone())
        } else if seller.eq_ignore_ascii_case(liquidator) {
            (LiquidationSide::Long, buyer.clone())
        } else {
            return None;
        };

        let price = trade.px.parse::<f64>().ok()?;
        let size = trade.sz.parse::<f64>().ok()?;

        Some(BlockchainLiquidation {
            tx_hash: trade.hash.clone(),
            block_height: trade.block_height,
            ts_ms: trade.time,
            coin: trade.coin.clone(),
            side: trade.side,
            liquidation_side,
            price,
            size,
            value_usd: price * size,
            liquidated_user,
            liquidator: liquidator.clone(),
        })
    }

    /// One classification pass over the recent trades of each coin. Fetch
    /// failures are logged and skipped; the pass always completes.
    pub async fn scan_recent(&mut self, coins: &[&str]) -> Vec<BlockchainLiquidation> {
        let mut found = Vec::new();

        for coin in coins {
            let trades = match self.feed.recent_trades(coin).await {
                Ok(trades) => trades,
                Err(error) => {
                    warn!(coin, %error, "trade fetch failed");
                    continue;
                }
            };

            for trade in &trades {
                let Some(liquidation) = self.classify_trade(trade) else {
                    continue;
                };
                if !self.seen.insert(liquidation.ts_ms, &liquidation.tx_hash) {
                    continue;
                }
                self.record(&liquidation);
                debug!(
                    coin = %liquidation.coin,
                    side = ?liquidation.liquidation_side,
                    value_usd = liquidation.value_usd,
                    user = %liquidation.liquidated_user,
                    "liquidation detected"
                );
                found.push(liquidation);
            }
        }

        found
    }

    /// Poll loop: classify, dedupe and push each new liquidation into `tx`.
    /// Ends when the receiver is dropped.
    pub async fn monitor_realtime(
        mut self,
        coins: Vec<String>,
        tx: mpsc::Sender<BlockchainLiquidation>,
    ) {
        info!(coins = ?coins, interval_ms = self.config.poll_interval.as_millis() as u64, "liquidation monitor started");
        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            ticker.tick().await;
            let coin_refs: Vec<&str> = coins.iter().map(String::as_str).collect();
            for liquidation in self.scan_recent(&coin_refs).await {
                if tx.send(liquidation).await.is_err() {
                    warn!("liquidation receiver dropped; monitor stopping");
                    return;
                }
            }
        }
    }

    pub fn totals(&self) -> &LiquidationTotals {
        &self.totals
    }

    /// Hand the counters to the caller and start a fresh period. Intended
    /// for periodic external snapshotting in long-running deployments.
    pub fn snapshot_and_reset(&mut self) -> LiquidationTotals {
        std::mem::take(&mut self.totals)
    }

    /// Current size of the dedupe set (time-bounded).
    pub fn seen_hashes(&self) -> usize {
        self.seen.len()
    }

    fn record(&mut self, liquidation: &BlockchainLiquidation) {
        let totals = &mut self.totals;

        totals.total_count += 1;
        totals.total_value_usd += liquidation.value_usd;
        match liquidation.liquidation_side {
            LiquidationSide::Long => {
                totals.long_count += 1;
                totals.long_value_usd += liquidation.value_usd;
            }
            LiquidationSide::Short => {
                totals.short_count += 1;
                totals.short_value_usd += liquidation.value_usd;
            }
        }

        *totals.by_coin.entry(liquidation.coin.clone()).or_default() += 1;
        let coin_side = totals
            .by_coin_side
            .entry((liquidation.coin.clone(), liquidation.liquidation_side))
            .or_default();
        coin_side.count += 1;
        coin_side.value_usd += liquidation.value_usd;

        let when = timestamp(liquidation.ts_ms);
        if !totals.by_user.contains_key(&liquidation.liquidated_user)
            && totals.by_user.len() >= self.config.max_tracked_users
        {
            let stalest = totals
                .by_user
                .iter()
                .min_by_key(|(_, detail)| detail.last_seen)
                .map(|(user, _)| user.clone());
            if let Some(user) = stalest {
                totals.by_user.remove(&user);
            }
        }
        let detail = totals
            .by_user
            .entry(liquidation.liquidated_user.clone())
            .or_insert_with(|| UserDetail {
                count: 0,
                value_usd: 0.0,
                first_seen: when,
                last_seen: when,
            });
        detail.count += 1;
        detail.value_usd += liquidation.value_usd;
        detail.last_seen = when;
    }
}

fn timestamp(ts_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts_ms as i64).unwrap_or_else(Utc::now)
}
