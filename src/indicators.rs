//! Technical indicators
//!
//! Stateless numeric functions over closing prices and candle windows:
//! - EMA via the `ta` crate (seeded by the first value, no bias adjustment)
//! - Wilder-style RSI on a bias-adjusted exponentially weighted mean
//! - Rolling highest high / lowest low extraction

use ta::indicators::ExponentialMovingAverage;
use ta::Next;

use crate::Candle;

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Exponential Moving Average with α = 2 / (span + 1).
///
/// Produces one value per input; the first output equals the first input.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    if values.is_empty() || span == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(span) {
        Ok(i) => i,
        Err(_) => return vec![],
    };

    values.iter().map(|&v| indicator.next(v)).collect()
}

/// Latest EMA value, or `None` when fewer than `span + 1` points are available.
pub fn latest_ema(values: &[f64], span: usize) -> Option<f64> {
    if span == 0 || values.len() < span + 1 {
        return None;
    }
    ema(values, span).last().copied()
}

// =============================================================================
// Momentum
// =============================================================================

/// Calculate RSI (Relative Strength Index), Wilder smoothing.
///
/// Gains and losses are smoothed with an adjusted exponentially weighted mean
/// (α = 1/period, i.e. center of mass `period - 1`). The first `period`
/// outputs are `None`. A zero average loss saturates the index at 100; when
/// the average gain is zero as well the value is undefined (`None`).
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let decay = 1.0 - 1.0 / period as f64;
    let mut gain_acc = 0.0;
    let mut loss_acc = 0.0;
    let mut weight_acc = 0.0;

    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let change = if i == 0 { 0.0 } else { values[i] - values[i - 1] };
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        gain_acc = gain + decay * gain_acc;
        loss_acc = loss + decay * loss_acc;
        weight_acc = 1.0 + decay * weight_acc;

        if i < period {
            result.push(None);
            continue;
        }

        let avg_gain = gain_acc / weight_acc;
        let avg_loss = loss_acc / weight_acc;

        if avg_gain == 0.0 && avg_loss == 0.0 {
            result.push(None);
        } else if avg_loss == 0.0 {
            result.push(Some(100.0));
        } else {
            let rs = avg_gain / avg_loss;
            result.push(Some(100.0 - 100.0 / (1.0 + rs)));
        }
    }

    result
}

/// Latest RSI value, or `None` when fewer than `period + 1` closes are
/// available or the series has not moved.
pub fn latest_rsi(values: &[f64], period: usize) -> Option<f64> {
    rsi(values, period).last().copied().flatten()
}

// =============================================================================
// Rolling extremes
// =============================================================================

/// Highest high over the slice
pub fn highest_high(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.high).reduce(f64::max)
}

/// Lowest low over the slice
pub fn lowest_low(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.low).reduce(f64::min)
}

/// (lowest low, highest high) over the slice
pub fn high_low_range(candles: &[Candle]) -> Option<(f64, f64)> {
    Some((lowest_low(candles)?, highest_high(candles)?))
}

/// The trailing `len` candles (or all of them when shorter).
pub fn tail(candles: &[Candle], len: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(len)..]
}

// =============================================================================
// Tests
// =============================================================================
