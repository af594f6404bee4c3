//! Market-data and symbol-universe collaborators
//!
//! The orchestrator only sees the two traits. Adapters:
//! - [`BinanceMarket`]: live public REST, behind a token bucket and a fetch semaphore
//! - [`CsvMarketData`]: `{data_dir}/{SYMBOL}_{tf}.csv` files for offline scans

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::binance::{select_universe, BinanceClient};
use crate::common::{RateLimiter, RateLimiterConfig};
use crate::config::{ExchangeConfig, UniverseConfig};
use crate::data;
use crate::error::{DataError, DataResult};
use crate::timeframe::Timeframe;
use crate::types::{Candle, Symbol};

/// Source of recent OHLCV candles
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Up to `limit` most recent candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> DataResult<Vec<Candle>>;
}

/// Source of the symbols to scan, refreshed once per cycle
#[async_trait]
pub trait SymbolUniverse: Send + Sync {
    async fn list_symbols(&self) -> DataResult<Vec<Symbol>>;
}

pub struct BinanceMarket {
    client: BinanceClient,
    limiter: RateLimiter,
    fetch_slots: Arc<Semaphore>,
    universe: UniverseConfig,
}

impl BinanceMarket {
    pub fn new(exchange: &ExchangeConfig, universe: UniverseConfig) -> anyhow::Result<Self> {
        let client = BinanceClient::new(Duration::from_secs(exchange.timeout_secs))?;
        Ok(Self::with_client(client, exchange, universe))
    }

    pub fn with_client(client: BinanceClient, exchange: &ExchangeConfig, universe: UniverseConfig) -> Self {
        let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(exchange.rate_limit as usize));
        Self {
            client,
            limiter,
            fetch_slots: Arc::new(Semaphore::new(exchange.max_concurrent_fetches.max(1))),
            universe,
        }
    }
}

#[async_trait]
impl MarketData for BinanceMarket {
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> DataResult<Vec<Candle>> {
        let _slot = self
            .fetch_slots
            .acquire()
            .await
            .map_err(|e| DataError::fetch(symbol.as_str(), timeframe, e))?;
        self.limiter.acquire().await;

        let klines = self
            .client
            .get_klines(symbol.as_str(), timeframe, limit)
            .await
            .map_err(|e| DataError::fetch(symbol.as_str(), timeframe, format!("{:#}", e)))?;

        let candles: Vec<Candle> = klines.iter().filter_map(|k| k.to_candle()).collect();
        if candles.is_empty() && !klines.is_empty() {
            return Err(DataError::Malformed(format!(
                "{} {}: no usable klines",
                symbol, timeframe
            )));
        }
        Ok(candles)
    }
}

#[async_trait]
impl SymbolUniverse for BinanceMarket {
    async fn list_symbols(&self) -> DataResult<Vec<Symbol>> {
        self.limiter.acquire().await;
        let tickers = self
            .client
            .get_24hr_tickers()
            .await
            .map_err(|e| DataError::Universe(format!("{:#}", e)))?;

        let symbols = select_universe(&tickers, &self.universe);
        debug!(tickers = tickers.len(), selected = symbols.len(), "Universe refreshed");
        Ok(symbols)
    }
}

/// Offline adapter over a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    data_dir: PathBuf,
}

impl CsvMarketData {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl MarketData for CsvMarketData {
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> DataResult<Vec<Candle>> {
        let path = data::csv_path(&self.data_dir, symbol, timeframe);
        if !path.exists() {
            return Err(DataError::fetch(
                symbol.as_str(),
                timeframe,
                format!("no data file {}", path.display()),
            ));
        }

        tokio::task::spawn_blocking(move || data::load_recent(&path, limit))
            .await
            .map_err(|e| DataError::fetch(symbol.as_str(), timeframe, e))?
            .map_err(|e| DataError::fetch(symbol.as_str(), timeframe, format!("{:#}", e)))
    }
}

#[async_trait]
impl SymbolUniverse for CsvMarketData {
    async fn list_symbols(&self) -> DataResult<Vec<Symbol>> {
        let symbols = data::list_symbols(&self.data_dir).map_err(|e| DataError::Universe(format!("{:#}", e)))?;
        if symbols.is_empty() {
            warn!(dir = %self.data_dir.display(), "No CSV data files found");
        }
        Ok(symbols)
    }
}
