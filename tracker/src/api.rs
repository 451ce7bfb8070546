use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::TradeRecord;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Read-only trade-query endpoint of the venue.
#[async_trait]
pub trait TradeFeed: Send + Sync + 'static {
    async fn recent_trades(&self, coin: &str) -> anyhow::Result<Vec<TradeRecord>>;
}

/// Hyperliquid-style info endpoint: one POST URL, typed JSON request body.
#[derive(Clone)]
pub struct HyperliquidFeed {
    http: Client,
    url: String,
}

impl HyperliquidFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(2_500))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TradeFeed for HyperliquidFeed {
    #[instrument(skip(self), level = "debug")]
    async fn recent_trades(&self, coin: &str) -> anyhow::Result<Vec<TradeRecord>> {
        let body = serde_json::json!({ "type": "recentTrades", "coin": coin });
        let trades: Vec<TradeRecord> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(FeedError::Http)?
            .error_for_status()
            .map_err(FeedError::Http)?
            .json()
            .await
            .map_err(FeedError::Http)?;

        debug!(coin, trades = trades.len(), "recent trades fetched");
        Ok(trades)
    }
}
