//! Binance REST payloads: klines and 24h ticker statistics

use chrono::DateTime;
use serde::{Deserialize, Deserializer};

use crate::config::UniverseConfig;
use crate::types::{Candle, Symbol};

/// One kline row. The API returns an array:
/// [open_time, open, high, low, close, volume, close_time, quote_volume, trades, ...]
#[derive(Debug, Clone, PartialEq)]
pub struct BinanceKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl BinanceKline {
    /// Parse a raw JSON row; prices arrive as strings.
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }

        Some(BinanceKline {
            open_time: raw[0].as_i64()?,
            open: raw[1].as_str()?.parse().ok()?,
            high: raw[2].as_str()?.parse().ok()?,
            low: raw[3].as_str()?.parse().ok()?,
            close: raw[4].as_str()?.parse().ok()?,
            volume: raw[5].as_str()?.parse().ok()?,
            close_time: raw[6].as_i64()?,
        })
    }

    pub fn to_candle(&self) -> Option<Candle> {
        Some(Candle {
            datetime: DateTime::from_timestamp_millis(self.open_time)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

fn f64_from_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Entry of `GET /api/v3/ticker/24hr`; only the fields the universe filter reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hr {
    pub symbol: String,
    #[serde(deserialize_with = "f64_from_str")]
    pub quote_volume: f64,
}

const LEVERAGED_SUFFIXES: [&str; 4] = ["UP", "DOWN", "BULL", "BEAR"];

fn is_leveraged_token(symbol: &str, quote: &str) -> bool {
    symbol
        .strip_suffix(quote)
        .map(|base| LEVERAGED_SUFFIXES.iter().any(|s| base.ends_with(s)))
        .unwrap_or(false)
}

/// Liquid quote-asset pairs, highest quote volume first.
///
/// Pairs are sorted and capped at `max_symbols` before the volume floor is
/// applied, so the floor can only shrink the capped list.
pub fn select_universe(tickers: &[Ticker24hr], config: &UniverseConfig) -> Vec<Symbol> {
    let quote = config.quote_asset.as_str();

    let mut pairs: Vec<&Ticker24hr> = tickers
        .iter()
        .filter(|t| t.symbol.ends_with(quote) && t.symbol.len() > quote.len())
        .filter(|t| !is_leveraged_token(&t.symbol, quote))
        .collect();

    pairs.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));
    pairs.truncate(config.max_symbols);

    pairs
        .into_iter()
        .filter(|t| t.quote_volume / 1e6 >= config.min_quote_volume_million)
        .map(|t| Symbol::new(&t.symbol))
        .collect()
}
