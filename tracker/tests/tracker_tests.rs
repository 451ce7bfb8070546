use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use tracker::{
    LiquidationSide, LiquidationTracker, TradeFeed, TradeRecord, TradeSide, TrackerConfig,
};

const LIQUIDATOR: &str = "0x2E3D94F0562703B25C83308a05046ddaf9a8DD14";

fn trade(
    coin: &str,
    side: TradeSide,
    px: &str,
    sz: &str,
    time: u64,
    hash: &str,
    users: [&str; 2],
) -> TradeRecord {
    TradeRecord {
        coin: coin.to_string(),
        side,
        px: px.to_string(),
        sz: sz.to_string(),
        time,
        hash: hash.to_string(),
        users: users.iter().map(|u| u.to_string()).collect(),
        block_height: None,
    }
}

/// Serves the same canned trades on every poll.
struct StaticFeed {
    trades: Mutex<Vec<TradeRecord>>,
    polls: AtomicU64,
}

impl StaticFeed {
    fn new(trades: Vec<TradeRecord>) -> Self {
        Self {
            trades: Mutex::new(trades),
            polls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl TradeFeed for StaticFeed {
    async fn recent_trades(&self, coin: &str) -> anyhow::Result<Vec<TradeRecord>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let trades = self.trades.lock().await;
        Ok(trades.iter().filter(|t| t.coin == coin).cloned().collect())
    }
}

fn tracker_with(trades: Vec<TradeRecord>) -> LiquidationTracker<StaticFeed> {
    LiquidationTracker::new(
        Arc::new(StaticFeed::new(trades)),
        TrackerConfig::new(LIQUIDATOR),
    )
}

#[test]
fn liquidator_as_buyer_closes_a_short() {
    let tracker = tracker_with(vec![]);
    let record = trade(
        "BTC",
        TradeSide::B,
        "50000",
        "0.5",
        1_700_000_000_000,
        "0xaa",
        [LIQUIDATOR, "0xUserA"],
    );

    let liq = tracker.classify_trade(&record).expect("is a liquidation");
    assert_eq!(liq.liquidation_side, LiquidationSide::Short);
    assert_eq!(liq.liquidated_user, "0xUserA");
    assert_eq!(liq.value_usd, 25_000.0);
}

#[test]
fn liquidator_as_seller_closes_a_long() {
    let tracker = tracker_with(vec![]);
    let record = trade(
        "BTC",
        TradeSide::A,
        "50000",
        "1.0",
        1_700_000_000_000,
        "0xbb",
        ["0xUserB", LIQUIDATOR],
    );

    let liq = tracker.classify_trade(&record).expect("is a liquidation");
    assert_eq!(liq.liquidation_side, LiquidationSide::Long);
    assert_eq!(liq.liquidated_user, "0xUserB");
}

#[test]
fn liquidator_match_is_case_insensitive() {
    let tracker = tracker_with(vec![]);
    let record = trade(
        "BTC",
        TradeSide::B,
        "50000",
        "0.1",
        1_700_000_000_000,
        "0xcc",
        [&LIQUIDATOR.to_lowercase(), "0xUserC"],
    );

    assert!(tracker.classify_trade(&record).is_some());
}

#[test]
fn ordinary_trades_are_not_liquidations() {
    let tracker = tracker_with(vec![]);
    let record = trade(
        "BTC",
        TradeSide::B,
        "50000",
        "0.1",
        1_700_000_000_000,
        "0xdd",
        ["0xUserA", "0xUserB"],
    );

    assert!(tracker.classify_trade(&record).is_none());
}

#[tokio::test]
async fn repeated_polls_do_not_double_count() {
    let mut tracker = tracker_with(vec![
        trade(
            "BTC",
            TradeSide::B,
            "50000",
            "0.5",
            1_700_000_000_000,
            "0x01",
            [LIQUIDATOR, "0xUserA"],
        ),
        trade(
            "BTC",
            TradeSide::A,
            "50000",
            "0.2",
            1_700_000_000_100,
            "0x02",
            ["0xUserB", LIQUIDATOR],
        ),
        // Ordinary flow mixed in.
        trade(
            "BTC",
            TradeSide::B,
            "50000",
            "3.0",
            1_700_000_000_200,
            "0x03",
            ["0xUserC", "0xUserD"],
        ),
    ]);

    let first = tracker.scan_recent(&["BTC"]).await;
    assert_eq!(first.len(), 2);

    let second = tracker.scan_recent(&["BTC"]).await;
    assert!(second.is_empty());

    let totals = tracker.totals();
    assert_eq!(totals.total_count, 2);
    assert_eq!(totals.total_value_usd, 25_000.0 + 10_000.0);
    assert_eq!(totals.short_count, 1);
    assert_eq!(totals.long_count, 1);
    assert_eq!(totals.by_coin.get("BTC"), Some(&2));
    assert_eq!(
        totals
            .by_coin_side
            .get(&("BTC".to_string(), LiquidationSide::Short))
            .map(|t| t.count),
        Some(1)
    );
    assert_eq!(totals.by_user.len(), 2);
}

#[tokio::test]
async fn snapshot_and_reset_starts_a_fresh_period() {
    let mut tracker = tracker_with(vec![trade(
        "ETH",
        TradeSide::B,
        "3000",
        "2.0",
        1_700_000_000_000,
        "0x04",
        [LIQUIDATOR, "0xUserE"],
    )]);

    tracker.scan_recent(&["ETH"]).await;
    let snapshot = tracker.snapshot_and_reset();
    assert_eq!(snapshot.total_count, 1);
    assert_eq!(tracker.totals().total_count, 0);

    // The dedupe set survives the reset, so the same trade is not
    // re-counted into the new period.
    tracker.scan_recent(&["ETH"]).await;
    assert_eq!(tracker.totals().total_count, 0);
}

#[tokio::test]
async fn realtime_monitor_streams_new_liquidations() {
    let feed = Arc::new(StaticFeed::new(vec![trade(
        "BTC",
        TradeSide::B,
        "50000",
        "0.5",
        1_700_000_000_000,
        "0x05",
        [LIQUIDATOR, "0xUserF"],
    )]));
    let mut config = TrackerConfig::new(LIQUIDATOR);
    config.poll_interval = Duration::from_millis(20);
    let tracker = LiquidationTracker::new(Arc::clone(&feed), config);

    let (tx, mut rx) = mpsc::channel(16);
    let handle = tokio::spawn(tracker.monitor_realtime(vec!["BTC".to_string()], tx));

    let liq = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("monitor produced a liquidation in time")
        .expect("channel open");
    assert_eq!(liq.tx_hash, "0x05");
    assert_eq!(liq.liquidated_user, "0xUserF");

    // Only the first poll may emit; later polls are deduped.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
    assert!(feed.polls.load(Ordering::SeqCst) >= 2);

    drop(rx);
    handle.abort();
}

#[tokio::test]
async fn dedupe_set_is_time_bounded() {
    let mut config = TrackerConfig::new(LIQUIDATOR);
    config.dedupe_window_ms = 1_000;
    let feed = Arc::new(StaticFeed::new(vec![]));
    let mut tracker = LiquidationTracker::new(Arc::clone(&feed), config);

    // Two liquidations far apart in feed time: the first hash ages out.
    {
        let mut trades = feed.trades.lock().await;
        trades.push(trade(
            "BTC",
            TradeSide::B,
            "50000",
            "0.1",
            1_700_000_000_000,
            "0x06",
            [LIQUIDATOR, "0xUserG"],
        ));
    }
    tracker.scan_recent(&["BTC"]).await;
    assert_eq!(tracker.seen_hashes(), 1);

    {
        let mut trades = feed.trades.lock().await;
        trades.clear();
        trades.push(trade(
            "BTC",
            TradeSide::B,
            "50000",
            "0.1",
            1_700_000_005_000,
            "0x07",
            [LIQUIDATOR, "0xUserG"],
        ));
    }
    tracker.scan_recent(&["BTC"]).await;
    assert_eq!(tracker.seen_hashes(), 1);
}
