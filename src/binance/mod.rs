//! Binance REST access for candles and the tradable universe

mod client;
mod types;

pub use client::{BinanceClient, MAX_KLINES_PER_REQUEST};
pub use types::*;
