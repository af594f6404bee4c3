//! Lower-timeframe entry confirmation
//!
//! A long is confirmed when the entry timeframe's latest close is strictly
//! above its EMA; a short when strictly below.

use crate::confluence::Candidate;
use crate::indicators::latest_ema;
use crate::types::{closes, Candle, Direction, Rejection};

/// Entry-timeframe readings that confirmed a candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryReading {
    pub close: f64,
    pub ema: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryConfirmation {
    ema_span: usize,
}

impl EntryConfirmation {
    pub fn new(ema_span: usize) -> Self {
        Self { ema_span }
    }

    pub fn ema_span(&self) -> usize {
        self.ema_span
    }

    pub fn confirm(
        &self,
        candidate: &Candidate,
        entry_candles: &[Candle],
    ) -> Result<EntryReading, Rejection> {
        let close = closes(entry_candles);
        let (Some(ema), Some(&last)) = (latest_ema(&close, self.ema_span), close.last()) else {
            return Err(Rejection::InsufficientData {
                needed: self.ema_span + 1,
                got: close.len(),
            });
        };

        let confirmed = match candidate.direction {
            Direction::Long => last > ema,
            Direction::Short => last < ema,
        };

        if confirmed {
            Ok(EntryReading { close: last, ema })
        } else {
            Err(Rejection::EntryNotConfirmed { close: last, ema })
        }
    }
}
