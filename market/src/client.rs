//! Read-only exchange endpoints behind an async seam.
//!
//! Aggregation logic never talks HTTP directly; it goes through
//! [`ExchangeApi`] so tests can swap in mocks and deployments can mix
//! venues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::de;
use crate::errors::FetchError;

/// Order-book snapshot, best level first on each side.
#[derive(Clone, Debug, Deserialize)]
pub struct OrderBook {
    #[serde(deserialize_with = "de::de_levels")]
    pub bids: Vec<(f64, f64)>,
    #[serde(deserialize_with = "de::de_levels")]
    pub asks: Vec<(f64, f64)>,
}

/// Open-interest reading, with the mark price when the venue provides one.
#[derive(Clone, Copy, Debug)]
pub struct OpenInterestRead {
    pub open_interest: f64,
    pub price: Option<f64>,
}

/// Read-only market endpoints of one derivatives venue.
#[async_trait]
pub trait ExchangeApi: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Latest funding rate, in percent per funding interval.
    async fn funding_rate(&self, symbol: &str) -> anyhow::Result<f64>;

    async fn open_interest(&self, symbol: &str) -> anyhow::Result<OpenInterestRead>;

    async fn order_book(&self, symbol: &str, levels: u32) -> anyhow::Result<OrderBook>;

    async fn spot_price(&self, symbol: &str) -> anyhow::Result<f64>;

    async fn perp_price(&self, symbol: &str) -> anyhow::Result<f64>;
}

#[derive(Debug, Deserialize)]
struct FundingEntry {
    #[serde(rename = "fundingRate", deserialize_with = "de::de_str_f64")]
    funding_rate: f64,
}

#[derive(Debug, Deserialize)]
struct OpenInterestResponse {
    #[serde(rename = "openInterest", deserialize_with = "de::de_str_f64")]
    open_interest: f64,
    #[serde(default, deserialize_with = "de::de_opt_str_f64")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(deserialize_with = "de::de_str_f64")]
    price: f64,
}

/// Binance USD-M futures reader (spot prices come from the spot API host).
#[derive(Clone)]
pub struct BinanceFuturesApi {
    http: Client,
    futures_url: String,
    spot_url: String,
}

impl BinanceFuturesApi {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_urls("https://fapi.binance.com", "https://api.binance.com")
    }

    /// Point the client at alternative hosts (mirrors, test servers).
    pub fn with_urls(
        futures_url: impl Into<String>,
        spot_url: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(2_500))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            futures_url: futures_url.into(),
            spot_url: spot_url.into(),
        })
    }
}

#[async_trait]
impl ExchangeApi for BinanceFuturesApi {
    fn name(&self) -> &str {
        "binance"
    }

    #[instrument(skip(self), level = "debug")]
    async fn funding_rate(&self, symbol: &str) -> anyhow::Result<f64> {
        let url = format!(
            "{}/fapi/v1/fundingRate?symbol={}&limit=10",
            self.futures_url, symbol
        );
        let entries: Vec<FundingEntry> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?
            .json()
            .await
            .map_err(FetchError::Http)?;

        let latest = entries
            .last()
            .ok_or_else(|| FetchError::EmptyFunding(symbol.to_string()))?;

        // The venue reports a fraction per interval; percent downstream.
        let rate_pct = latest.funding_rate * 100.0;
        debug!(symbol, rate_pct, "funding rate fetched");
        Ok(rate_pct)
    }

    #[instrument(skip(self), level = "debug")]
    async fn open_interest(&self, symbol: &str) -> anyhow::Result<OpenInterestRead> {
        let url = format!(
            "{}/fapi/v1/openInterest?symbol={}",
            self.futures_url, symbol
        );
        let body: OpenInterestResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?
            .json()
            .await
            .map_err(FetchError::Http)?;

        debug!(symbol, open_interest = body.open_interest, "open interest fetched");
        Ok(OpenInterestRead {
            open_interest: body.open_interest,
            price: body.price,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn order_book(&self, symbol: &str, levels: u32) -> anyhow::Result<OrderBook> {
        let url = format!(
            "{}/fapi/v1/depth?symbol={}&limit={}",
            self.futures_url, symbol, levels
        );
        let book: OrderBook = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?
            .json()
            .await
            .map_err(FetchError::Http)?;

        if book.bids.is_empty() || book.asks.is_empty() {
            return Err(FetchError::EmptyBook(symbol.to_string()).into());
        }
        Ok(book)
    }

    #[instrument(skip(self), level = "debug")]
    async fn spot_price(&self, symbol: &str) -> anyhow::Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.spot_url, symbol);
        let ticker: TickerPrice = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?
            .json()
            .await
            .map_err(FetchError::Http)?;
        Ok(ticker.price)
    }

    #[instrument(skip(self), level = "debug")]
    async fn perp_price(&self, symbol: &str) -> anyhow::Result<f64> {
        let url = format!(
            "{}/fapi/v1/ticker/price?symbol={}",
            self.futures_url, symbol
        );
        let ticker: TickerPrice = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Http)?
            .error_for_status()
            .map_err(FetchError::Http)?
            .json()
            .await
            .map_err(FetchError::Http)?;
        Ok(ticker.price)
    }
}

/// Source of the locally computed realized volatility for the context.
#[async_trait]
pub trait VolatilityProvider: Send + Sync + 'static {
    async fn realized_vol_5min(&self) -> anyhow::Result<f64>;
}

/// Reads the shared volatility engine maintained by the ingestion funnel,
/// without advancing its history.
pub struct EngineVolatility {
    engine: Arc<Mutex<volatility::VolatilityEngine>>,
}

impl EngineVolatility {
    pub fn new(engine: Arc<Mutex<volatility::VolatilityEngine>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl VolatilityProvider for EngineVolatility {
    async fn realized_vol_5min(&self) -> anyhow::Result<f64> {
        let engine = self.engine.lock().await;
        Ok(engine.realized_vol_5min(common::time::now_ms()))
    }
}
