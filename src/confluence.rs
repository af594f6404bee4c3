//! Channel & confluence evaluation on the higher timeframe
//!
//! The trend filter combines three direction-exclusive checks on the latest
//! closed state of a candle series:
//!
//! 1. Momentum: RSI oversold selects the long branch, RSI inside the
//!    overbought band selects the short branch.
//! 2. Proximity: price inside the EMA channel or within tolerance of a bound.
//! 3. Breakout guard: a long needs price at or above the lower bound, a short
//!    needs price at or below the upper bound.
//!
//! Retracement confluence is computed separately and only annotates alerts.

use serde::{Deserialize, Serialize};

use crate::config::{IndicatorConfig, ScannerConfig};
use crate::indicators::{high_low_range, latest_ema, latest_rsi, tail};
use crate::types::{closes, Candle, Direction, Rejection};

/// Momentum extremity on the higher timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumClass {
    Oversold,
    Overbought,
}

impl MomentumClass {
    pub fn direction(&self) -> Direction {
        match self {
            MomentumClass::Oversold => Direction::Long,
            MomentumClass::Overbought => Direction::Short,
        }
    }
}

/// Classify an RSI reading. Both overbought bounds are inclusive.
pub fn classify_momentum(rsi: f64, config: &IndicatorConfig) -> Option<MomentumClass> {
    if rsi <= config.rsi_oversold {
        Some(MomentumClass::Oversold)
    } else if rsi >= config.rsi_overbought_low && rsi <= config.rsi_overbought_high {
        Some(MomentumClass::Overbought)
    } else {
        None
    }
}

/// Band between the two channel EMAs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendChannel {
    pub lower: f64,
    pub upper: f64,
}

impl TrendChannel {
    pub fn from_emas(a: f64, b: f64) -> Self {
        TrendChannel {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.lower <= price && price <= self.upper
    }

    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    /// Inside the band, or within `tolerance` (relative to price) of either bound.
    pub fn is_near(&self, price: f64, tolerance: f64) -> bool {
        if price <= 0.0 {
            return false;
        }
        let dist_upper = (price - self.upper).abs() / price;
        let dist_lower = (price - self.lower).abs() / price;
        self.contains(price) || dist_upper <= tolerance || dist_lower <= tolerance
    }

    /// Price has not already broken out against the trade direction.
    pub fn allows(&self, direction: Direction, price: f64) -> bool {
        match direction {
            Direction::Long => price >= self.lower,
            Direction::Short => price <= self.upper,
        }
    }
}

/// Latest indicator readings for one (symbol, higher timeframe)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSnapshot {
    pub rsi: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub price: f64,
}

impl TrendSnapshot {
    pub fn channel(&self) -> TrendChannel {
        TrendChannel::from_emas(self.ema_fast, self.ema_slow)
    }
}

/// A higher-timeframe setup awaiting entry confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub direction: Direction,
    pub rsi: f64,
    pub channel: TrendChannel,
    pub fib_levels: Vec<f64>,
    pub price: f64,
}

/// Ratios whose retracement level sits within `tolerance` of `reference`.
///
/// Levels are measured up from the window's lowest low. A flat window
/// (zero range) matches nothing.
pub fn fib_confluence(
    candles: &[Candle],
    reference: f64,
    ratios: &[f64],
    tolerance: f64,
) -> Vec<f64> {
    let Some((low, high)) = high_low_range(candles) else {
        return vec![];
    };
    let range = high - low;
    if range <= 0.0 {
        return vec![];
    }

    ratios
        .iter()
        .copied()
        .filter(|ratio| {
            let level = low + range * ratio;
            level > 0.0 && (reference - level).abs() / level <= tolerance
        })
        .collect()
}

/// Higher-timeframe trend filter
#[derive(Debug, Clone)]
pub struct ChannelEvaluator {
    config: IndicatorConfig,
    lookback: usize,
    min_candles: usize,
}

impl ChannelEvaluator {
    pub fn new(config: IndicatorConfig, lookback: usize, min_candles: usize) -> Self {
        Self {
            config,
            lookback,
            min_candles,
        }
    }

    pub fn from_config(indicators: &IndicatorConfig, scanner: &ScannerConfig) -> Self {
        Self::new(
            indicators.clone(),
            scanner.trend_lookback,
            scanner.min_trend_candles,
        )
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Indicator readings over the lookback window.
    pub fn snapshot(&self, candles: &[Candle]) -> Result<TrendSnapshot, Rejection> {
        let window = tail(candles, self.lookback);
        if window.len() < self.min_candles {
            return Err(Rejection::InsufficientData {
                needed: self.min_candles,
                got: window.len(),
            });
        }

        let close = closes(window);
        let insufficient = || Rejection::InsufficientData {
            needed: self.config.ema_slow.max(self.config.ema_fast) + 1,
            got: close.len(),
        };

        let ema_fast = latest_ema(&close, self.config.ema_fast).ok_or_else(insufficient)?;
        let ema_slow = latest_ema(&close, self.config.ema_slow).ok_or_else(insufficient)?;
        let price = *close.last().ok_or_else(insufficient)?;

        if close.len() <= self.config.rsi_length {
            return Err(Rejection::InsufficientData {
                needed: self.config.rsi_length + 1,
                got: close.len(),
            });
        }
        // Past warm-up, a missing value means no movement at all over the window
        let rsi = latest_rsi(&close, self.config.rsi_length).ok_or(Rejection::RsiUndefined)?;

        Ok(TrendSnapshot {
            rsi,
            ema_fast,
            ema_slow,
            price,
        })
    }

    /// Momentum, proximity and breakout checks on a snapshot.
    pub fn classify(&self, snapshot: &TrendSnapshot) -> Result<(Direction, TrendChannel), Rejection> {
        let momentum = classify_momentum(snapshot.rsi, &self.config)
            .ok_or(Rejection::MomentumNeutral { rsi: snapshot.rsi })?;

        let channel = snapshot.channel();
        if !channel.is_near(snapshot.price, self.config.channel_tolerance) {
            return Err(Rejection::FarFromChannel {
                price: snapshot.price,
                lower: channel.lower,
                upper: channel.upper,
            });
        }

        let direction = momentum.direction();
        if !channel.allows(direction, snapshot.price) {
            return Err(Rejection::ChannelBroken {
                direction,
                price: snapshot.price,
            });
        }

        Ok((direction, channel))
    }

    /// Full higher-timeframe evaluation: snapshot, classification and the
    /// Fibonacci levels matching the channel midpoint.
    pub fn evaluate(&self, candles: &[Candle]) -> Result<Candidate, Rejection> {
        let snapshot = self.snapshot(candles)?;
        let (direction, channel) = self.classify(&snapshot)?;
        let fib_levels = self.fib_levels(candles, &channel);

        Ok(Candidate {
            direction,
            rsi: snapshot.rsi,
            channel,
            fib_levels,
            price: snapshot.price,
        })
    }

    /// Retracement ratios matching the channel midpoint over the lookback
    /// window. Nothing matches until a full window is available.
    pub fn fib_levels(&self, candles: &[Candle], channel: &TrendChannel) -> Vec<f64> {
        if candles.len() < self.lookback {
            return vec![];
        }
        fib_confluence(
            tail(candles, self.lookback),
            channel.midpoint(),
            &self.config.fib_levels,
            self.config.fib_tolerance,
        )
    }
}
