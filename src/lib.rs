//! Confluence Scanner
//!
//! Scans a universe of symbols across several higher timeframes for an
//! RSI-extreme pullback into the EMA 144/169 channel, confirms it on a
//! lower entry timeframe, and emits alerts deduplicated per
//! (symbol, timeframe) cooldown window.

pub mod binance;
pub mod common;
pub mod config;
pub mod confluence;
pub mod cooldown;
pub mod data;
pub mod entry;
pub mod error;
pub mod indicators;
pub mod market;
pub mod notify;
pub mod scanner;
pub mod structure;
pub mod timeframe;
pub mod types;

pub use config::Config;
pub use scanner::{CycleReport, Scanner};
pub use timeframe::Timeframe;
pub use types::*;
