//! Scan orchestrator
//!
//! One cycle = one pass over the symbol universe. Symbols are evaluated by a
//! bounded pool of tasks; within a symbol the configured higher timeframes
//! are evaluated in order, and every timeframe is evaluated even after one
//! of them has alerted. Per unit the chain is:
//!
//! trend fetch → channel filter and Fibonacci match → entry fetch →
//! entry confirmation → cooldown gate → structure annotation → notify.
//!
//! Delivery of an alert that passed the gate runs on a detached task.
//!
//! A cycle can be cut short by `schedule.cycle_timeout_secs` or by the
//! shutdown signal; the remaining symbol tasks are aborted.

use anyhow::{bail, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::confluence::{Candidate, ChannelEvaluator};
use crate::cooldown::{Clock, CooldownStore, SystemClock};
use crate::entry::{EntryConfirmation, EntryReading};
use crate::error::ConfigError;
use crate::market::{MarketData, SymbolUniverse};
use crate::notify::{format_alert, format_startup, Notifier};
use crate::structure::detect_structure_break;
use crate::timeframe::Timeframe;
use crate::types::{AlertKey, Candle, Rejection, Signal, Symbol};
use crate::Config;

/// Counters for one pass over the universe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub symbols_total: usize,
    pub symbols_scanned: usize,
    pub alerts: usize,
    /// (symbol, timeframe) units that produced no candidate
    pub skipped: usize,
    /// Confirmed signals dropped by the cooldown gate
    pub suppressed: usize,
    pub notify_failures: usize,
    /// The cycle was cut short by its timeout or by shutdown
    pub cancelled: bool,
    pub duration: Duration,
}

impl CycleReport {
    fn absorb(&mut self, outcome: SymbolOutcome) {
        self.symbols_scanned += 1;
        self.alerts += outcome.alerts.len();
        self.skipped += outcome.skipped;
        self.suppressed += outcome.suppressed;
        self.notify_failures += outcome.notify_failures;
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} symbols in {:.1}s: {} alerts, {} suppressed, {} skipped",
            self.symbols_scanned,
            self.symbols_total,
            self.duration.as_secs_f64(),
            self.alerts,
            self.suppressed,
            self.skipped
        )?;
        if self.notify_failures > 0 {
            write!(f, ", {} notify failures", self.notify_failures)?;
        }
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// What one symbol produced across all its timeframes
#[derive(Debug, Clone, Default)]
pub struct SymbolOutcome {
    pub alerts: Vec<Signal>,
    pub skipped: usize,
    pub suppressed: usize,
    pub notify_failures: usize,
}

/// A higher-timeframe candidate confirmed on the entry timeframe, before
/// the cooldown gate
#[derive(Debug, Clone)]
pub struct Qualified {
    pub candidate: Candidate,
    pub entry: EntryReading,
    entry_candles: Vec<Candle>,
}

/// Resolves once the shutdown flag turns true. Never resolves if the sender
/// is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|&stop| stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

#[derive(Clone)]
pub struct Scanner {
    config: Arc<Config>,
    market: Arc<dyn MarketData>,
    universe: Arc<dyn SymbolUniverse>,
    notifier: Arc<dyn Notifier>,
    cooldowns: Arc<CooldownStore>,
    clock: Arc<dyn Clock>,
    trend: ChannelEvaluator,
    entry: EntryConfirmation,
}

impl Scanner {
    pub fn new(
        config: Config,
        market: Arc<dyn MarketData>,
        universe: Arc<dyn SymbolUniverse>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        let cooldowns = CooldownStore::new(config.cooldown_table()?);
        let trend = ChannelEvaluator::from_config(&config.indicators, &config.scanner);
        let entry = EntryConfirmation::new(config.indicators.entry_ema);

        Ok(Self {
            config: Arc::new(config),
            market,
            universe,
            notifier,
            cooldowns: Arc::new(cooldowns),
            clock: Arc::new(SystemClock),
            trend,
            entry,
        })
    }

    /// Replace the wall clock used by the cooldown gate.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    pub fn trend_evaluator(&self) -> &ChannelEvaluator {
        &self.trend
    }

    /// Universe for this cycle; provider failure falls back to the fixed set.
    pub async fn resolve_universe(&self) -> Vec<Symbol> {
        match self.universe.list_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                let fallback = self.config.universe.fallback();
                warn!(error = %e, fallback = fallback.len(), "Universe fetch failed, using fallback symbols");
                fallback
            }
        }
    }

    async fn fetch(&self, symbol: &Symbol, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>, Rejection> {
        self.market
            .fetch_candles(symbol, timeframe, limit)
            .await
            .map_err(|e| {
                warn!(%symbol, %timeframe, error = %e, "Candle fetch failed");
                Rejection::FetchFailed(e.to_string())
            })
    }

    /// Trend filter and entry confirmation for one (symbol, higher timeframe).
    /// Touches neither the cooldown store nor the notifier.
    pub async fn qualify(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<Qualified, Rejection> {
        let scanner = &self.config.scanner;

        let trend_candles = self.fetch(symbol, timeframe, scanner.trend_lookback).await?;
        let candidate = self.trend.evaluate(&trend_candles)?;
        debug!(%symbol, %timeframe, direction = %candidate.direction, rsi = candidate.rsi, "Trend candidate");

        let entry_candles = self
            .fetch(symbol, scanner.entry_timeframe, scanner.entry_lookback)
            .await?;
        let entry = self.entry.confirm(&candidate, &entry_candles)?;

        Ok(Qualified {
            candidate,
            entry,
            entry_candles,
        })
    }

    /// Attach the structure-break annotation.
    pub fn annotate(&self, symbol: &Symbol, timeframe: Timeframe, qualified: Qualified) -> Signal {
        let Qualified {
            candidate,
            entry_candles,
            ..
        } = qualified;

        let structure = detect_structure_break(&entry_candles, self.config.indicators.structure_lookback);

        Signal {
            symbol: symbol.clone(),
            timeframe,
            direction: candidate.direction,
            price: candidate.price,
            rsi: candidate.rsi,
            channel_lower: candidate.channel.lower,
            channel_upper: candidate.channel.upper,
            fib_levels: candidate.fib_levels,
            structure,
            entry_timeframe: self.config.scanner.entry_timeframe,
            entry_ema_span: self.entry.ema_span(),
        }
    }

    /// Full chain for one unit, including the cooldown gate. A returned
    /// signal has already been recorded in the cooldown store.
    pub async fn evaluate_timeframe(&self, symbol: &Symbol, timeframe: Timeframe) -> Result<Signal, Rejection> {
        let qualified = self.qualify(symbol, timeframe).await?;

        let key = AlertKey::new(symbol.clone(), timeframe);
        if !self.cooldowns.try_fire(&key, self.clock.now()) {
            return Err(Rejection::CoolingDown);
        }

        Ok(self.annotate(symbol, timeframe, qualified))
    }

    /// Evaluate every configured higher timeframe for one symbol and deliver
    /// the alerts that pass the gate.
    pub async fn scan_symbol(&self, symbol: &Symbol) -> SymbolOutcome {
        let mut outcome = SymbolOutcome::default();

        for &timeframe in &self.config.scanner.timeframes {
            match self.evaluate_timeframe(symbol, timeframe).await {
                Ok(signal) => {
                    info!(
                        %symbol,
                        %timeframe,
                        direction = %signal.direction,
                        price = signal.price,
                        rsi = signal.rsi,
                        "Signal triggered"
                    );
                    match self.deliver(&signal).await {
                        Ok(true) => {}
                        Ok(false) => outcome.notify_failures += 1,
                        Err(e) => {
                            error!(%symbol, %timeframe, error = %e, "Alert delivery task failed");
                            outcome.notify_failures += 1;
                        }
                    }
                    outcome.alerts.push(signal);
                }
                Err(Rejection::CoolingDown) => {
                    debug!(%symbol, %timeframe, "Suppressed by cooldown");
                    outcome.suppressed += 1;
                }
                Err(reason) => {
                    debug!(%symbol, %timeframe, %reason, "No signal");
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }

    /// Send a gated alert on its own task. The cooldown is already recorded,
    /// so the send must survive cancellation of the symbol task; a failed
    /// delivery is logged and not retried.
    fn deliver(&self, signal: &Signal) -> JoinHandle<bool> {
        let notifier = Arc::clone(&self.notifier);
        let text = format_alert(signal);
        let (symbol, timeframe) = (signal.symbol.clone(), signal.timeframe);

        tokio::spawn(async move {
            match notifier.send(&text).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(%symbol, %timeframe, error = %e, "Alert delivery failed");
                    false
                }
            }
        })
    }

    async fn scan_all(&self, symbols: &[Symbol], report: &mut CycleReport, panics: &mut usize) {
        let permits = Arc::new(Semaphore::new(self.config.scanner.max_concurrent_symbols.max(1)));
        let spacing = Duration::from_millis(self.config.schedule.symbol_spacing_ms);
        let mut workers = JoinSet::new();

        let mut record = |result: Result<SymbolOutcome, JoinError>, report: &mut CycleReport| match result {
            Ok(outcome) => report.absorb(outcome),
            Err(e) => {
                error!(error = %e, "Symbol task failed");
                *panics += 1;
            }
        };

        for (i, symbol) in symbols.iter().enumerate() {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            while let Some(result) = workers.try_join_next() {
                record(result, report);
            }

            debug!("[{}/{}] Scanning {}", i + 1, symbols.len(), symbol);
            let scanner = self.clone();
            let symbol = symbol.clone();
            workers.spawn(async move {
                let _permit = permit;
                let outcome = scanner.scan_symbol(&symbol).await;
                if !spacing.is_zero() {
                    sleep(spacing).await;
                }
                outcome
            });
        }

        while let Some(result) = workers.join_next().await {
            record(result, report);
        }
    }

    /// One pass over the universe. Fails only when a symbol task panicked.
    pub async fn run_cycle(&self, mut shutdown: watch::Receiver<bool>) -> Result<CycleReport> {
        let started = Instant::now();
        let symbols = self.resolve_universe().await;

        let mut report = CycleReport {
            symbols_total: symbols.len(),
            ..CycleReport::default()
        };
        let mut panics = 0;

        let deadline = async {
            match self.config.schedule.cycle_timeout_secs {
                Some(secs) => sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };

        let cancelled = tokio::select! {
            _ = self.scan_all(&symbols, &mut report, &mut panics) => false,
            _ = deadline => {
                warn!("Cycle timed out, abandoning remaining symbols");
                true
            }
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested, abandoning cycle");
                true
            }
        };

        report.cancelled = cancelled;
        report.duration = started.elapsed();

        if panics > 0 {
            bail!("{} symbol tasks failed during the cycle ({})", panics, report);
        }
        Ok(report)
    }

    async fn announce(&self) {
        let symbols = self.resolve_universe().await;
        let scanner = &self.config.scanner;
        let text = format_startup(
            symbols.len(),
            &scanner.timeframes,
            scanner.entry_timeframe,
            self.entry.ema_span(),
        );
        info!("{}", text);
        if let Err(e) = self.notifier.send(&text).await {
            warn!(error = %e, "Startup announcement failed");
        }
    }

    /// Scan until shutdown or until the maximum runtime has elapsed.
    /// Returns the number of cycles run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let started = Instant::now();
        let schedule = &self.config.schedule;
        let max_runtime = schedule.max_runtime_secs.map(Duration::from_secs);
        let mut cycles = 0;

        self.announce().await;

        loop {
            if shutdown_requested(&shutdown) {
                break;
            }
            if let Some(limit) = max_runtime {
                if started.elapsed() >= limit {
                    info!(runtime_secs = started.elapsed().as_secs(), "Maximum runtime reached, exiting");
                    break;
                }
            }

            cycles += 1;
            let pause = match self.run_cycle(shutdown.clone()).await {
                Ok(report) => {
                    info!("Cycle {}: {}", cycles, report);
                    if schedule.cooldown_sweep {
                        let horizon = self.cooldowns.table().max_cooldown(&self.config.scanner.timeframes);
                        let removed = self.cooldowns.sweep(self.clock.now(), horizon);
                        if removed > 0 {
                            debug!(removed, remaining = self.cooldowns.len(), "Cooldown sweep");
                        }
                    }
                    schedule.sleep_after(report.duration)
                }
                Err(e) => {
                    error!("Cycle {} failed: {:#}", cycles, e);
                    Duration::from_secs(schedule.error_backoff_secs)
                }
            };

            if shutdown_requested(&shutdown) {
                break;
            }
            debug!(secs = pause.as_secs(), "Sleeping until next cycle");
            tokio::select! {
                _ = sleep(pause) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!(cycles, "Scanner stopped");
        cycles
    }
}
