//! CSV candle storage for offline scans
//!
//! Files are named `{SYMBOL}_{timeframe}.csv` with a header row
//! `datetime,open,high,low,close,volume`, oldest candle first.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::timeframe::Timeframe;
use crate::{Candle, Symbol};

pub fn csv_path(data_dir: impl AsRef<Path>, symbol: &Symbol, timeframe: Timeframe) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol.as_str(), timeframe.label()))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Naive timestamps are taken as UTC
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

/// Load every candle of a CSV file. Rows failing OHLC validation are errors.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {} on row {}", name, row_idx + 1))
        };

        let datetime = parse_datetime(record.get(0).context("Missing datetime column")?.trim())?;
        let candle = Candle::new(
            datetime,
            field(1, "open")?,
            field(2, "high")?,
            field(3, "low")?,
            field(4, "close")?,
            field(5, "volume")?,
        )
        .with_context(|| format!("Invalid candle on row {}", row_idx + 1))?;

        candles.push(candle);
    }

    Ok(candles)
}

/// The most recent `limit` candles of a CSV file.
pub fn load_recent(path: impl AsRef<Path>, limit: usize) -> Result<Vec<Candle>> {
    let mut candles = load_csv(path)?;
    let skip = candles.len().saturating_sub(limit);
    candles.drain(..skip);
    Ok(candles)
}

pub fn save_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;

    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;
    for c in candles {
        writer.write_record(&[
            c.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Symbols with at least one `{SYMBOL}_{timeframe}.csv` file, sorted.
pub fn list_symbols(data_dir: impl AsRef<Path>) -> Result<Vec<Symbol>> {
    let data_dir = data_dir.as_ref();
    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data directory {}", data_dir.display()))?;

    let mut symbols = BTreeSet::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((symbol, tf)) = stem.rsplit_once('_') {
            if !symbol.is_empty() && tf.parse::<Timeframe>().is_ok() {
                symbols.insert(Symbol::new(symbol));
            }
        }
    }

    Ok(symbols.into_iter().collect())
}
