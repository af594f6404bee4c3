//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for notification credentials. Every section has defaults
//! so a partial (or empty) file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::timeframe::{CooldownTable, Timeframe};
use crate::Symbol;

/// Hard floor on higher-timeframe history; shorter series are skipped.
pub const MIN_TREND_CANDLES: usize = 200;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub indicators: IndicatorConfig,
    pub universe: UniverseConfig,
    pub exchange: ExchangeConfig,
    pub schedule: ScheduleConfig,
    /// Timeframe label → cooldown seconds, overriding the built-in table
    pub cooldowns: HashMap<String, u64>,
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Config::default();
        config.apply_env();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Load notification credentials from environment if set
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            if !token.is_empty() {
                self.notifier.telegram_token = Some(token);
            }
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat_id.is_empty() {
                self.notifier.telegram_chat_id = Some(chat_id);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.timeframes.is_empty() {
            return Err(ConfigError::NoTimeframes);
        }

        let ind = &self.indicators;
        if !(ind.rsi_oversold < ind.rsi_overbought_low
            && ind.rsi_overbought_low <= ind.rsi_overbought_high)
        {
            return Err(ConfigError::RsiThresholds {
                oversold: ind.rsi_oversold,
                low: ind.rsi_overbought_low,
                high: ind.rsi_overbought_high,
            });
        }

        for (name, value) in [
            ("channel_tolerance", ind.channel_tolerance),
            ("fib_tolerance", ind.fib_tolerance),
            ("rsi_length", ind.rsi_length as f64),
            ("ema_fast", ind.ema_fast as f64),
            ("ema_slow", ind.ema_slow as f64),
            ("entry_ema", ind.entry_ema as f64),
            ("exchange.rate_limit", self.exchange.rate_limit as f64),
            (
                "exchange.max_concurrent_fetches",
                self.exchange.max_concurrent_fetches as f64,
            ),
            (
                "scanner.max_concurrent_symbols",
                self.scanner.max_concurrent_symbols as f64,
            ),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.scanner.trend_lookback < self.scanner.min_trend_candles
            || self.scanner.min_trend_candles < MIN_TREND_CANDLES
        {
            return Err(ConfigError::LookbackTooShort {
                lookback: self.scanner.trend_lookback,
                floor: self.scanner.min_trend_candles.max(MIN_TREND_CANDLES),
            });
        }

        self.cooldown_table()?;
        Ok(())
    }

    pub fn cooldown_table(&self) -> Result<CooldownTable, ConfigError> {
        CooldownTable::from_overrides(&self.cooldowns)
    }
}

/// Which timeframes to scan and how much history to pull
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Higher timeframes, evaluated in this order for every symbol
    pub timeframes: Vec<Timeframe>,
    pub entry_timeframe: Timeframe,
    /// Candles fetched per higher timeframe (channel EMAs and Fibonacci window)
    pub trend_lookback: usize,
    /// Candles fetched on the entry timeframe
    pub entry_lookback: usize,
    pub min_trend_candles: usize,
    /// Symbols evaluated concurrently within a cycle
    pub max_concurrent_symbols: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            timeframes: vec![Timeframe::M30, Timeframe::H1, Timeframe::H2, Timeframe::H4],
            entry_timeframe: Timeframe::M5,
            trend_lookback: 300,
            entry_lookback: 100,
            min_trend_candles: MIN_TREND_CANDLES,
            max_concurrent_symbols: 4,
        }
    }
}

/// Indicator parameters and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_length: usize,
    /// RSI at or below this is oversold (long branch)
    pub rsi_oversold: f64,
    /// Overbought band is [low, high]; above `high` is treated as a data anomaly
    pub rsi_overbought_low: f64,
    pub rsi_overbought_high: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    /// Relative distance from price to a channel bound still counted as "near"
    pub channel_tolerance: f64,
    pub fib_levels: Vec<f64>,
    pub fib_tolerance: f64,
    pub entry_ema: usize,
    pub structure_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            rsi_length: 14,
            rsi_oversold: 35.0,
            rsi_overbought_low: 65.0,
            rsi_overbought_high: 95.0,
            ema_fast: 144,
            ema_slow: 169,
            channel_tolerance: 0.015,
            fib_levels: vec![0.382, 0.5, 0.618, 0.786, 1.0, 1.13, 1.272, 1.414],
            fib_tolerance: 0.015,
            entry_ema: 12,
            structure_lookback: 50,
        }
    }
}

/// Symbol universe selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    pub quote_asset: String,
    /// 24h quote volume floor, in millions of the quote asset
    pub min_quote_volume_million: f64,
    pub max_symbols: usize,
    /// Scanned when the universe provider fails
    pub fallback_symbols: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        UniverseConfig {
            quote_asset: "USDT".to_string(),
            min_quote_volume_million: 0.5,
            max_symbols: 2000,
            fallback_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        }
    }
}

impl UniverseConfig {
    pub fn fallback(&self) -> Vec<Symbol> {
        self.fallback_symbols.iter().map(Symbol::new).collect()
    }
}

/// Exchange access limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Requests per second admitted by the rate limiter
    pub rate_limit: u32,
    /// Upper bound on in-flight candle fetches
    pub max_concurrent_fetches: usize,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            rate_limit: 10,
            max_concurrent_fetches: 4,
            timeout_secs: 10,
        }
    }
}

/// Cycle pacing and lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub target_cycle_secs: u64,
    pub min_sleep_secs: u64,
    pub error_backoff_secs: u64,
    /// Abort the remaining symbols of a cycle after this long
    pub cycle_timeout_secs: Option<u64>,
    /// Exit voluntarily after this long so an external scheduler can restart us
    pub max_runtime_secs: Option<u64>,
    /// Pause taken by each worker after finishing a symbol
    pub symbol_spacing_ms: u64,
    /// Evict cooldown entries older than the largest cooldown after each cycle
    pub cooldown_sweep: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            target_cycle_secs: 300,
            min_sleep_secs: 60,
            error_backoff_secs: 60,
            cycle_timeout_secs: None,
            max_runtime_secs: Some(19_800), // 5.5h
            symbol_spacing_ms: 100,
            cooldown_sweep: false,
        }
    }
}

impl ScheduleConfig {
    /// Sleep after a cycle that took `elapsed`: `max(floor, target - elapsed)`.
    pub fn sleep_after(&self, elapsed: Duration) -> Duration {
        let target = Duration::from_secs(self.target_cycle_secs);
        let floor = Duration::from_secs(self.min_sleep_secs);
        target.saturating_sub(elapsed).max(floor)
    }
}

/// Telegram credentials; both must be present to deliver to Telegram
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
}
