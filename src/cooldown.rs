//! Alert deduplication store
//!
//! One slot per [`AlertKey`] holding the wall-clock time of its last alert.
//! A key is Cooling while `now - last < cooldown(timeframe)` and Idle
//! otherwise; the transition is evaluated lazily on lookup. Check and record
//! happen under one lock, so concurrent workers cannot both fire a key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::timeframe::CooldownTable;
use crate::types::AlertKey;

/// Source of "now" for cooldown decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Logical state of a key at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Idle,
    Cooling { remaining: Duration },
}

#[derive(Debug, Default)]
pub struct CooldownStore {
    table: CooldownTable,
    last_fired: Mutex<HashMap<AlertKey, DateTime<Utc>>>,
}

impl CooldownStore {
    pub fn new(table: CooldownTable) -> Self {
        Self {
            table,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &CooldownTable {
        &self.table
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<AlertKey, DateTime<Utc>>> {
        self.last_fired.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state_of(&self, key: &AlertKey, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CooldownState {
        let Some(last) = last else {
            return CooldownState::Idle;
        };
        let cooldown = self.table.cooldown(key.timeframe);
        // A clock that went backwards counts as zero elapsed.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= cooldown {
            CooldownState::Idle
        } else {
            CooldownState::Cooling {
                remaining: cooldown - elapsed,
            }
        }
    }

    pub fn state(&self, key: &AlertKey, now: DateTime<Utc>) -> CooldownState {
        let last = self.entries().get(key).copied();
        self.state_of(key, last, now)
    }

    /// Gate and record in one step. Returns `true` when the key was Idle and
    /// is now Cooling from `now`; `false` when the alert must be dropped.
    pub fn try_fire(&self, key: &AlertKey, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        match self.state_of(key, entries.get(key).copied(), now) {
            CooldownState::Idle => {
                entries.insert(key.clone(), now);
                true
            }
            CooldownState::Cooling { remaining } => {
                debug!(key = %key, remaining_secs = remaining.as_secs(), "Alert suppressed by cooldown");
                false
            }
        }
    }

    pub fn last_fired(&self, key: &AlertKey) -> Option<DateTime<Utc>> {
        self.entries().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Evict entries whose last alert is at least `horizon` old. Returns the
    /// number removed.
    pub fn sweep(&self, now: DateTime<Utc>, horizon: Duration) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, last| (now - *last).to_std().map_or(true, |age| age < horizon));
        before - entries.len()
    }
}
