//! Cross-venue market context composition.
//!
//! ## What the aggregator answers
//! > "What do funding, open interest, book depth and the spot/perp premium
//! > jointly say about cascade risk, right now?"
//!
//! One instance serves one symbol, which keeps the single-slot cache sound:
//! a composed context is reused for `cache_ttl_ms` (default 100ms) before
//! the five sub-fetches run again, concurrently, each under its own
//! timeout. A failed sub-fetch downgrades to a zero-valued section marked
//! [`SectionValidity::Missing`]; a partial context is always returned,
//! never a hard failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::{ExchangeApi, OpenInterestRead, OrderBook, VolatilityProvider};
use crate::types::{
    DepthSection, FundingSection, FundingTrend, MarketContext, OpenInterestSection,
    PremiumSection, SectionValidity, VolatilitySection,
};

/// Tunables for the context aggregator.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// How long a composed context stays valid.
    pub cache_ttl_ms: u64,
    /// Budget for each of the five sub-fetches.
    pub fetch_timeout: Duration,
    /// 24h of funding samples.
    pub funding_history_cap: usize,
    pub oi_history_cap: usize,
    pub depth_history_cap: usize,
    /// Book levels requested per side.
    pub book_levels: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 100,
            fetch_timeout: Duration::from_millis(500),
            funding_history_cap: 288,
            oi_history_cap: 720,
            depth_history_cap: 60,
            book_levels: 100,
        }
    }
}

#[derive(Default)]
struct AggregatorState {
    cached: Option<MarketContext>,
    funding_history: VecDeque<f64>,
    oi_history: VecDeque<(u64, f64)>,
    depth_history: VecDeque<(u64, f64)>,
}

/// Composes funding/OI/depth/premium/volatility into one [`MarketContext`].
pub struct ContextAggregator {
    symbol: String,
    config: AggregatorConfig,
    exchanges: Vec<Arc<dyn ExchangeApi>>,
    volatility: Arc<dyn VolatilityProvider>,
    state: Mutex<AggregatorState>,
}

impl ContextAggregator {
    pub fn new(
        symbol: impl Into<String>,
        exchanges: Vec<Arc<dyn ExchangeApi>>,
        volatility: Arc<dyn VolatilityProvider>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            exchanges,
            volatility,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The composed context, served from cache when fresh enough.
    pub async fn get_complete_context(&self) -> MarketContext {
        let now_ms = common::time::now_ms();

        {
            let state = self.state.lock().await;
            if let Some(cached) = &state.cached
                && now_ms.saturating_sub(cached.ts_ms) < self.config.cache_ttl_ms
            {
                debug!(symbol = %self.symbol, age_ms = now_ms - cached.ts_ms, "context served from cache");
                return cached.clone();
            }
        }

        self.refresh(now_ms).await
    }

    async fn refresh(&self, now_ms: u64) -> MarketContext {
        let budget = self.config.fetch_timeout;

        let (funding, open_interest, book, prices, vol) = tokio::join!(
            timeout(budget, self.fetch_funding()),
            timeout(budget, self.fetch_open_interest()),
            timeout(budget, self.fetch_order_book()),
            timeout(budget, self.fetch_prices()),
            timeout(budget, self.volatility.realized_vol_5min()),
        );

        let mut state = self.state.lock().await;

        let funding = match flatten(funding) {
            Ok(rate) => compose_funding(&mut state, self.config.funding_history_cap, rate),
            Err(error) => {
                warn!(symbol = %self.symbol, %error, "funding fetch failed");
                FundingSection::default()
            }
        };

        let open_interest = match flatten(open_interest) {
            Ok(read) => compose_open_interest(
                &mut state,
                self.config.oi_history_cap,
                now_ms,
                read,
            ),
            Err(error) => {
                warn!(symbol = %self.symbol, %error, "open interest fetch failed");
                OpenInterestSection::default()
            }
        };

        let depth = match flatten(book) {
            Ok(book) => compose_depth(&mut state, self.config.depth_history_cap, now_ms, &book),
            Err(error) => {
                warn!(symbol = %self.symbol, %error, "order book fetch failed");
                DepthSection::default()
            }
        };

        let premium = match flatten(prices) {
            Ok((spot_price, perp_price)) => compose_premium(spot_price, perp_price),
            Err(error) => {
                warn!(symbol = %self.symbol, %error, "price fetch failed");
                PremiumSection::default()
            }
        };

        let volatility = match flatten(vol) {
            Ok(realized_5min) => VolatilitySection {
                realized_5min,
                validity: SectionValidity::Valid,
            },
            Err(error) => {
                warn!(symbol = %self.symbol, %error, "volatility read failed");
                VolatilitySection::default()
            }
        };

        let mut context = MarketContext {
            symbol: self.symbol.clone(),
            time: Utc::now(),
            ts_ms: now_ms,
            funding,
            open_interest,
            depth,
            premium,
            volatility,
            risk_score: 0,
        };
        context.risk_score = cascade_risk_score(&context);

        state.cached = Some(context.clone());
        context
    }

    /// Average funding across every configured venue; sources that fail are
    /// skipped as long as one responds.
    async fn fetch_funding(&self) -> anyhow::Result<f64> {
        let calls = self
            .exchanges
            .iter()
            .map(|exchange| exchange.funding_rate(&self.symbol));
        let rates: Vec<f64> = join_all(calls)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(rate) => Some(rate),
                Err(error) => {
                    debug!(symbol = %self.symbol, %error, "funding source failed");
                    None
                }
            })
            .collect();

        if rates.is_empty() {
            anyhow::bail!("no funding source responded");
        }
        Ok(rates.iter().sum::<f64>() / rates.len() as f64)
    }

    /// Single-venue read from the first configured exchange; aggregating OI
    /// across venues belongs to a dedicated provider layer.
    async fn fetch_open_interest(&self) -> anyhow::Result<OpenInterestRead> {
        let first = self
            .exchanges
            .first()
            .ok_or_else(|| anyhow::anyhow!("no exchanges configured"))?;
        first.open_interest(&self.symbol).await
    }

    async fn fetch_order_book(&self) -> anyhow::Result<OrderBook> {
        let first = self
            .exchanges
            .first()
            .ok_or_else(|| anyhow::anyhow!("no exchanges configured"))?;
        first.order_book(&self.symbol, self.config.book_levels).await
    }

    async fn fetch_prices(&self) -> anyhow::Result<(f64, f64)> {
        let first = self
            .exchanges
            .first()
            .ok_or_else(|| anyhow::anyhow!("no exchanges configured"))?;
        let (spot, perp) = tokio::join!(
            first.spot_price(&self.symbol),
            first.perp_price(&self.symbol)
        );
        Ok((spot?, perp?))
    }
}

fn flatten<T>(
    result: Result<anyhow::Result<T>, tokio::time::error::Elapsed>,
) -> anyhow::Result<T> {
    match result {
        Ok(inner) => inner,
        Err(elapsed) => Err(anyhow::Error::new(elapsed)),
    }
}

fn push_capped<T>(history: &mut VecDeque<T>, cap: usize, value: T) {
    if history.len() == cap {
        history.pop_front();
    }
    history.push_back(value);
}

fn compose_funding(state: &mut AggregatorState, cap: usize, rate: f64) -> FundingSection {
    push_capped(&mut state.funding_history, cap, rate);

    FundingSection {
        rate,
        trend: funding_trend(&state.funding_history),
        max_24h: state
            .funding_history
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or(rate),
        validity: SectionValidity::Valid,
    }
}

/// Latest rate vs ten samples back: ±10% bands decide the trend.
fn funding_trend(history: &VecDeque<f64>) -> FundingTrend {
    let n = history.len();
    if n < 11 {
        return FundingTrend::Neutral;
    }
    let latest = history[n - 1];
    let past = history[n - 11];
    if past == 0.0 {
        return FundingTrend::Neutral;
    }
    if latest >= past * 1.10 {
        FundingTrend::Increasing
    } else if latest <= past * 0.90 {
        FundingTrend::Decreasing
    } else {
        FundingTrend::Neutral
    }
}

fn compose_open_interest(
    state: &mut AggregatorState,
    cap: usize,
    now_ms: u64,
    read: OpenInterestRead,
) -> OpenInterestSection {
    push_capped(&mut state.oi_history, cap, (now_ms, read.open_interest));

    OpenInterestSection {
        open_interest: read.open_interest,
        change_1m_pct: pct_change_since(&state.oi_history, now_ms, 60_000, read.open_interest),
        change_5m_pct: pct_change_since(&state.oi_history, now_ms, 300_000, read.open_interest),
        change_1h_pct: pct_change_since(&state.oi_history, now_ms, 3_600_000, read.open_interest),
        validity: SectionValidity::Valid,
    }
}

/// Percent change of `current` vs the youngest sample at least `age_ms`
/// old. Zero until a sample is old enough.
fn pct_change_since(
    history: &VecDeque<(u64, f64)>,
    now_ms: u64,
    age_ms: u64,
    current: f64,
) -> f64 {
    let cutoff = now_ms.saturating_sub(age_ms);
    let past = history
        .iter()
        .rev()
        .find(|(ts, _)| *ts <= cutoff)
        .map(|(_, value)| *value);

    match past {
        Some(value) if value != 0.0 => (current - value) / value * 100.0,
        _ => 0.0,
    }
}

fn compose_depth(
    state: &mut AggregatorState,
    cap: usize,
    now_ms: u64,
    book: &OrderBook,
) -> DepthSection {
    let (Some(&(best_bid, _)), Some(&(best_ask, _))) = (book.bids.first(), book.asks.first())
    else {
        return DepthSection::default();
    };

    let mid = (best_bid + best_ask) / 2.0;
    if mid <= 0.0 {
        return DepthSection::default();
    }

    let bid_floor = mid * 0.98;
    let ask_ceiling = mid * 1.02;
    let bid_depth_usd: f64 = book
        .bids
        .iter()
        .filter(|(price, _)| *price >= bid_floor)
        .map(|(price, size)| price * size)
        .sum();
    let ask_depth_usd: f64 = book
        .asks
        .iter()
        .filter(|(price, _)| *price <= ask_ceiling)
        .map(|(price, size)| price * size)
        .sum();

    let total = bid_depth_usd + ask_depth_usd;
    let imbalance = if total > 0.0 {
        (bid_depth_usd - ask_depth_usd) / total
    } else {
        0.0
    };

    let change_1m_pct = match state.depth_history.front() {
        Some(&(_, oldest)) if oldest > 0.0 => (total - oldest) / oldest * 100.0,
        _ => 0.0,
    };
    push_capped(&mut state.depth_history, cap, (now_ms, total));

    DepthSection {
        bid_depth_usd,
        ask_depth_usd,
        imbalance,
        change_1m_pct,
        validity: SectionValidity::Valid,
    }
}

fn compose_premium(spot_price: f64, perp_price: f64) -> PremiumSection {
    let premium = if spot_price > 0.0 {
        (perp_price - spot_price) / spot_price
    } else {
        0.0
    };

    PremiumSection {
        spot_price,
        perp_price,
        premium,
        validity: SectionValidity::Valid,
    }
}

/// Additive 0–100 cascade-risk score.
///
/// Bands do not stack inside a section, and the open-interest bands are
/// checked fastest-first: a 1-minute drop that qualifies wins even when the
/// slower figures would also match.
pub fn cascade_risk_score(context: &MarketContext) -> u8 {
    let mut score = 0.0f64;

    let funding = context.funding.rate.abs();
    if funding > 0.1 {
        score += 25.0;
    } else if funding > 0.05 {
        score += 15.0;
    } else if funding > 0.02 {
        score += 5.0;
    }

    let oi = &context.open_interest;
    if oi.change_1m_pct < -5.0 {
        score += 30.0;
    } else if oi.change_5m_pct < -10.0 {
        score += 20.0;
    } else if oi.change_1h_pct < -20.0 {
        score += 10.0;
    }

    let depth_change = context.depth.change_1m_pct;
    if depth_change < -20.0 {
        score += 25.0;
    } else if depth_change < -10.0 {
        score += 15.0;
    } else if depth_change < -5.0 {
        score += 5.0;
    }

    let premium = context.premium.premium.abs();
    if premium > 0.005 {
        score += 20.0;
    } else if premium > 0.003 {
        score += 10.0;
    } else if premium > 0.001 {
        score += 5.0;
    }

    score.min(100.0) as u8
}
