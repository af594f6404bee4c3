//! Structure-break (change of character) detection on the entry timeframe
//!
//! Advisory only: the result decorates an alert, it never gates one.

use crate::indicators::{highest_high, lowest_low};
use crate::types::{Candle, StructureBreak};

/// Classify the latest close against the swing high/low of the preceding
/// `lookback - 1` candles (the trailing `lookback` window minus the latest).
///
/// Needs at least `lookback + 2` candles, otherwise reports no break.
pub fn detect_structure_break(candles: &[Candle], lookback: usize) -> Option<StructureBreak> {
    if lookback < 2 || candles.len() < lookback + 2 {
        return None;
    }

    let (current, history) = candles.split_last()?;
    let window = &history[history.len() + 1 - lookback..];

    let swing_high = highest_high(window)?;
    let swing_low = lowest_low(window)?;

    if current.close > swing_high {
        Some(StructureBreak::Bullish(swing_high))
    } else if current.close < swing_low {
        Some(StructureBreak::Bearish(swing_low))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candles_with_last_close(count: usize, last_close: f64) -> Vec<Candle> {
        let start = Utc::now() - Duration::minutes(5 * count as i64);
        let mut out: Vec<Candle> = (0..count)
            .map(|i| Candle {
                datetime: start + Duration::minutes(5 * i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect();
        if let Some(last) = out.last_mut() {
            last.close = last_close;
            last.high = last.high.max(last_close);
            last.low = last.low.min(last_close);
        }
        out
    }

    #[test]
    fn test_bullish_break() {
        let candles = candles_with_last_close(60, 102.0);
        assert_eq!(
            detect_structure_break(&candles, 50),
            Some(StructureBreak::Bullish(101.0))
        );
    }

    #[test]
    fn test_bearish_break() {
        let candles = candles_with_last_close(60, 97.5);
        assert_eq!(
            detect_structure_break(&candles, 50),
            Some(StructureBreak::Bearish(99.0))
        );
    }

    #[test]
    fn test_inside_range_is_no_break() {
        let candles = candles_with_last_close(60, 100.5);
        assert_eq!(detect_structure_break(&candles, 50), None);
        // Touching the swing high is not a break
        let candles = candles_with_last_close(60, 101.0);
        assert_eq!(detect_structure_break(&candles, 50), None);
    }

    #[test]
    fn test_requires_lookback_plus_two() {
        let candles = candles_with_last_close(51, 150.0);
        assert_eq!(detect_structure_break(&candles, 50), None);
        let candles = candles_with_last_close(52, 150.0);
        assert!(detect_structure_break(&candles, 50).is_some());
    }

    #[test]
    fn test_window_ignores_older_extremes() {
        let mut candles = candles_with_last_close(60, 102.0);
        // Older than the 49-candle window: must not raise the swing high
        candles[5].high = 500.0;
        assert_eq!(
            detect_structure_break(&candles, 50),
            Some(StructureBreak::Bullish(101.0))
        );
        // Inside the window: now it does
        candles[55].high = 500.0;
        assert_eq!(detect_structure_break(&candles, 50), None);
    }
}
