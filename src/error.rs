//! Error taxonomy for the scanner
//!
//! Data and notification failures are never fatal: the orchestrator turns
//! them into skips and log lines. Configuration errors abort at startup.

use thiserror::Error;

use crate::timeframe::Timeframe;

/// A (symbol, timeframe) unit could not be evaluated this cycle.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("fetch failed for {symbol} {timeframe}: {reason}")]
    Fetch {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("symbol universe unavailable: {0}")]
    Universe(String),
}

impl DataError {
    pub fn fetch(symbol: impl Into<String>, timeframe: Timeframe, reason: impl ToString) -> Self {
        DataError::Fetch {
            symbol: symbol.into(),
            timeframe,
            reason: reason.to_string(),
        }
    }
}

/// Delivery of an alert failed. Logged and dropped by the caller.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rejected by notification API ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Invalid configuration detected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown timeframe label: {0}")]
    UnknownTimeframe(String),

    #[error("at least one higher timeframe must be configured")]
    NoTimeframes,

    #[error("invalid RSI thresholds: oversold={oversold}, overbought=[{low}, {high}]")]
    RsiThresholds { oversold: f64, low: f64, high: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("trend lookback ({lookback}) is below the {floor}-candle floor")]
    LookbackTooShort { lookback: usize, floor: usize },
}

pub type DataResult<T> = Result<T, DataError>;
