//! Candle resolutions and the cooldown lookup table

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Cooldown applied to timeframes missing from the table.
pub const DEFAULT_COOLDOWN_SECS: u64 = 3600;

/// Candle resolution, named by its exchange interval label ("5m", "4h", ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 15] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::D3,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1M",
        }
    }

    /// Built-in cooldown in seconds. Only the resolutions the scanner is
    /// normally run on have an entry; the rest fall back to one hour.
    pub fn builtin_cooldown_secs(&self) -> Option<u64> {
        match self {
            Timeframe::M1 => Some(60),
            Timeframe::M5 => Some(300),
            Timeframe::M15 => Some(900),
            Timeframe::M30 => Some(1800),
            Timeframe::H1 => Some(3600),
            Timeframe::H2 => Some(7200),
            Timeframe::H4 => Some(14_400),
            Timeframe::H6 => Some(21_600),
            Timeframe::H12 => Some(43_200),
            Timeframe::D1 => Some(86_400),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| ConfigError::UnknownTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label().to_string()
    }
}

/// Timeframe → cooldown lookup with per-label overrides from config
#[derive(Debug, Clone, Default)]
pub struct CooldownTable {
    overrides: HashMap<Timeframe, u64>,
}

impl CooldownTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the config map of label → seconds.
    pub fn from_overrides(overrides: &HashMap<String, u64>) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for (label, secs) in overrides {
            table.overrides.insert(label.parse()?, *secs);
        }
        Ok(table)
    }

    pub fn with_override(mut self, timeframe: Timeframe, secs: u64) -> Self {
        self.overrides.insert(timeframe, secs);
        self
    }

    pub fn cooldown(&self, timeframe: Timeframe) -> Duration {
        let secs = self
            .overrides
            .get(&timeframe)
            .copied()
            .or_else(|| timeframe.builtin_cooldown_secs())
            .unwrap_or(DEFAULT_COOLDOWN_SECS);
        Duration::from_secs(secs)
    }

    /// Largest cooldown among the given timeframes, used as the sweep horizon.
    pub fn max_cooldown(&self, timeframes: &[Timeframe]) -> Duration {
        timeframes
            .iter()
            .map(|tf| self.cooldown(*tf))
            .max()
            .unwrap_or(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}
