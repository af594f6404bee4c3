//! Core data types shared by the evaluators and the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::timeframe::Timeframe;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        };
        candle.validate()?;
        Ok(candle)
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// Closing prices of a candle series, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every spawned evaluation task and every alert key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal direction. Oversold momentum only ever produces `Long`,
/// overbought momentum only ever produces `Short`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}

/// Cooldown identity: one slot per (symbol, higher timeframe), shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
}

impl AlertKey {
    pub fn new(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self { symbol, timeframe }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbol, self.timeframe)
    }
}

/// Close beyond the prior swing high/low on the entry timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StructureBreak {
    /// Close above the swing high (the value)
    Bullish(f64),
    /// Close below the swing low (the value)
    Bearish(f64),
}

impl StructureBreak {
    pub fn level(&self) -> f64 {
        match self {
            StructureBreak::Bullish(v) | StructureBreak::Bearish(v) => *v,
        }
    }

    /// Whether the break points the same way as the signal.
    pub fn agrees_with(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (StructureBreak::Bullish(_), Direction::Long)
                | (StructureBreak::Bearish(_), Direction::Short)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            StructureBreak::Bullish(_) => "Bullish",
            StructureBreak::Bearish(_) => "Bearish",
        }
    }
}

/// Why a (symbol, timeframe) unit produced no alert. These are skips, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    InsufficientData { needed: usize, got: usize },
    FetchFailed(String),
    MomentumNeutral { rsi: f64 },
    /// Flat window: average gain and loss are both zero
    RsiUndefined,
    FarFromChannel { price: f64, lower: f64, upper: f64 },
    ChannelBroken { direction: Direction, price: f64 },
    EntryNotConfirmed { close: f64, ema: f64 },
    CoolingDown,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientData { needed, got } => {
                write!(f, "insufficient data ({}/{} candles)", got, needed)
            }
            Rejection::FetchFailed(reason) => write!(f, "fetch failed: {}", reason),
            Rejection::MomentumNeutral { rsi } => write!(f, "RSI {:.2} not extreme", rsi),
            Rejection::RsiUndefined => write!(f, "RSI undefined on a flat series"),
            Rejection::FarFromChannel {
                price,
                lower,
                upper,
            } => write!(
                f,
                "price {} away from channel [{:.6}, {:.6}]",
                price, lower, upper
            ),
            Rejection::ChannelBroken { direction, price } => {
                write!(f, "channel already broken against {} at {}", direction, price)
            }
            Rejection::EntryNotConfirmed { close, ema } => {
                write!(f, "entry close {} vs EMA {:.6} not confirming", close, ema)
            }
            Rejection::CoolingDown => write!(f, "alert key cooling down"),
        }
    }
}

/// Confirmed, annotated alert ready to be gated and delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub price: f64,
    pub rsi: f64,
    pub channel_lower: f64,
    pub channel_upper: f64,
    pub fib_levels: Vec<f64>,
    pub structure: Option<StructureBreak>,
    pub entry_timeframe: Timeframe,
    pub entry_ema_span: usize,
}
