//! Binance public REST client
//!
//! No API key is needed for market data. The client itself does no pacing;
//! `market::BinanceMarket` wraps it with the rate limiter and fetch semaphore.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::types::{BinanceKline, Ticker24hr};
use crate::timeframe::Timeframe;

const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Maximum klines per request (Binance limit)
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(BinanceClient {
            client,
            base_url: base_url.into(),
        })
    }

    /// Most recent `limit` klines for `symbol`, oldest first. `limit` is
    /// capped at [`MAX_KLINES_PER_REQUEST`].
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<BinanceKline>> {
        let url = format!("{}/klines", self.base_url);
        let limit = limit.min(MAX_KLINES_PER_REQUEST);

        debug!(symbol, interval = %interval, limit, "Fetching klines");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", interval.label().to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance klines")?;

        let klines: Vec<BinanceKline> = raw.iter().filter_map(|row| BinanceKline::from_raw(row)).collect();
        if klines.len() < raw.len() {
            debug!(symbol, dropped = raw.len() - klines.len(), "Dropped unparseable kline rows");
        }

        Ok(klines)
    }

    /// 24h rolling statistics for every listed pair
    pub async fn get_24hr_tickers(&self) -> Result<Vec<Ticker24hr>> {
        let url = format!("{}/ticker/24hr", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Binance 24h tickers")
    }
}
