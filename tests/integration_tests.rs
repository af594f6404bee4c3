//! Integration tests for the confluence scanner
//!
//! The orchestrator is driven end-to-end with in-memory market data, a
//! scripted symbol universe and a recording notifier.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use confluence_scanner::cooldown::ManualClock;
use confluence_scanner::data;
use confluence_scanner::error::{DataError, DataResult, NotifyError};
use confluence_scanner::market::{CsvMarketData, MarketData, SymbolUniverse};
use confluence_scanner::notify::Notifier;
use confluence_scanner::{
    AlertKey, Candle, Config, Direction, Rejection, Scanner, StructureBreak, Symbol, Timeframe,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Candles whose closes follow `closes`, each opening at the previous close.
fn candles_from_closes(closes: &[f64], step: Duration) -> Vec<Candle> {
    let start = base_time() - step * closes.len() as i32;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                datetime: start + step * i as i32,
                open,
                high: open.max(close) + 0.1,
                low: open.min(close) - 0.1,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// 300 closes: flat at 100, a slow climb to ~105.35, then a three-candle
/// pullback to `target`.
///
/// With target 103.0 the latest RSI(14) is ~20.4 and the EMA 144/169 channel
/// is ~[102.38, 102.63], so price sits just above the channel.
fn pullback_closes(target: f64) -> Vec<f64> {
    let mut closes = vec![100.0; 190];
    closes.extend((1..=107).map(|i| 100.0 + 0.05 * i as f64));
    let top = closes[closes.len() - 1];
    closes.extend((1..=2).map(|i| top - (top - target) * i as f64 / 3.0));
    closes.push(target);
    closes
}

fn long_trend() -> Vec<Candle> {
    candles_from_closes(&pullback_closes(103.0), Duration::minutes(30))
}

/// Mirror image of the long setup: RSI ~79.6, price just below the channel.
fn short_trend() -> Vec<Candle> {
    let closes: Vec<f64> = pullback_closes(103.0).iter().map(|c| 200.0 - c).collect();
    candles_from_closes(&closes, Duration::minutes(30))
}

/// Steady climb with rare small dips: RSI(14) ~97.8.
fn euphoric_trend() -> Vec<Candle> {
    let mut closes = vec![100.0; 200];
    let mut x = 100.0;
    for i in 0..100 {
        x += if i % 10 == 5 { -0.01 } else { 0.05 };
        closes.push(x);
    }
    candles_from_closes(&closes, Duration::minutes(30))
}

/// 100 flat 5m candles, the last closing at `last` (outside the prior range).
fn entry_candles(last: f64) -> Vec<Candle> {
    let start = base_time() - Duration::minutes(500);
    (0..100)
        .map(|i| {
            let close = if i == 99 { last } else { 100.0 };
            Candle {
                datetime: start + Duration::minutes(5 * i),
                open: 100.0,
                high: close.max(100.0) + 0.5,
                low: close.min(100.0) - 0.5,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

#[derive(Default)]
struct FakeMarket {
    series: HashMap<(Symbol, Timeframe), Vec<Candle>>,
    delay: Option<std::time::Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeMarket {
    fn with(mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.series.insert((Symbol::new(symbol), timeframe), candles);
        self
    }

    /// Long trend on `timeframes` plus a confirming 5m entry series.
    fn with_long_setup(self, symbol: &str, timeframes: &[Timeframe]) -> Self {
        let mut market = self.with(symbol, Timeframe::M5, entry_candles(101.0));
        for &tf in timeframes {
            market = market.with(symbol, tf, long_trend());
        }
        market
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> DataResult<Vec<Candle>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let candles = self
            .series
            .get(&(symbol.clone(), timeframe))
            .ok_or_else(|| DataError::fetch(symbol.as_str(), timeframe, "no such series"))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }
}

struct FakeUniverse(Option<Vec<Symbol>>);

impl FakeUniverse {
    fn of(symbols: &[&str]) -> Self {
        FakeUniverse(Some(symbols.iter().map(Symbol::new).collect()))
    }

    fn failing() -> Self {
        FakeUniverse(None)
    }
}

#[async_trait]
impl SymbolUniverse for FakeUniverse {
    async fn list_symbols(&self) -> DataResult<Vec<Symbol>> {
        self.0
            .clone()
            .ok_or_else(|| DataError::Universe("exchange unreachable".to_string()))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
    delay: Option<std::time::Duration>,
}

impl RecordingNotifier {
    fn slow(delay: std::time::Duration) -> Self {
        RecordingNotifier {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}

fn test_config(timeframes: &[Timeframe]) -> Config {
    let mut config = Config::default();
    config.scanner.timeframes = timeframes.to_vec();
    config.schedule.symbol_spacing_ms = 0;
    config
}

struct Harness {
    scanner: Scanner,
    market: Arc<FakeMarket>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
}

fn harness(
    config: Config,
    market: FakeMarket,
    universe: FakeUniverse,
    notifier: RecordingNotifier,
) -> Harness {
    let market = Arc::new(market);
    let notifier = Arc::new(notifier);
    let clock = Arc::new(ManualClock::new(base_time()));
    let scanner = Scanner::new(config, market.clone(), Arc::new(universe), notifier.clone())
        .unwrap()
        .with_clock(clock.clone());
    Harness {
        scanner,
        market,
        notifier,
        clock,
    }
}

fn no_shutdown() -> watch::Receiver<bool> {
    // A closed channel never signals shutdown
    let (_tx, rx) = watch::channel(false);
    rx
}

// =============================================================================
// Evaluator chain
// =============================================================================

#[tokio::test]
async fn test_fixture_readings() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default(),
        FakeUniverse::of(&[]),
        RecordingNotifier::default(),
    );
    let evaluator = h.scanner.trend_evaluator();

    let long = evaluator.snapshot(&long_trend()).unwrap();
    assert!(long.rsi < 25.0, "rsi {}", long.rsi);
    let channel = long.channel();
    assert!(long.price >= channel.lower);
    assert!(channel.is_near(long.price, 0.015));

    let short = evaluator.snapshot(&short_trend()).unwrap();
    assert!(short.rsi > 75.0 && short.rsi < 85.0, "rsi {}", short.rsi);
    assert!(short.price <= short.channel().upper);

    let euphoric = evaluator.snapshot(&euphoric_trend()).unwrap();
    assert!(euphoric.rsi > 95.0 && euphoric.rsi < 100.0, "rsi {}", euphoric.rsi);
}

#[tokio::test]
async fn test_rsi_above_ceiling_rejected() {
    let market = FakeMarket::default()
        .with("BTCUSDT", Timeframe::M30, euphoric_trend())
        .with("BTCUSDT", Timeframe::M5, entry_candles(99.0));
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let result = h.scanner.qualify(&Symbol::new("BTCUSDT"), Timeframe::M30).await;
    match result {
        Err(Rejection::MomentumNeutral { rsi }) => assert!(rsi > 95.0),
        other => panic!("expected momentum rejection, got {:?}", other.map(|q| q.candidate)),
    }

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.alerts, 0);
    assert_eq!(report.skipped, 1);
    assert!(h.notifier.messages().is_empty());
    assert!(h.scanner.cooldowns().is_empty());
}

#[tokio::test]
async fn test_price_below_channel_is_not_a_long() {
    let broken = candles_from_closes(&pullback_closes(102.2), Duration::minutes(30));
    let market = FakeMarket::default()
        .with("BTCUSDT", Timeframe::M30, broken)
        .with("BTCUSDT", Timeframe::M5, entry_candles(101.0));
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let result = h.scanner.qualify(&Symbol::new("BTCUSDT"), Timeframe::M30).await;
    assert!(matches!(
        result,
        Err(Rejection::ChannelBroken {
            direction: Direction::Long,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unconfirmed_entry_skips() {
    let market = FakeMarket::default()
        .with("BTCUSDT", Timeframe::M30, long_trend())
        .with("BTCUSDT", Timeframe::M5, entry_candles(99.0));
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.alerts, 0);
    assert_eq!(report.skipped, 1);
    assert!(h.scanner.cooldowns().is_empty());
}

#[tokio::test]
async fn test_missing_entry_data_skips() {
    let market = FakeMarket::default().with("BTCUSDT", Timeframe::M30, long_trend());
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let result = h.scanner.qualify(&Symbol::new("BTCUSDT"), Timeframe::M30).await;
    assert!(matches!(result, Err(Rejection::FetchFailed(_))));
}

#[tokio::test]
async fn test_short_history_skips() {
    let short_history = long_trend()[150..].to_vec();
    let market = FakeMarket::default()
        .with("BTCUSDT", Timeframe::M30, short_history)
        .with("BTCUSDT", Timeframe::M5, entry_candles(101.0));
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let result = h.scanner.qualify(&Symbol::new("BTCUSDT"), Timeframe::M30).await;
    assert_eq!(
        result.map(|q| q.candidate).unwrap_err(),
        Rejection::InsufficientData {
            needed: 200,
            got: 150
        }
    );
}

// =============================================================================
// Alerts and cooldown
// =============================================================================

#[tokio::test]
async fn test_long_signal_emitted_and_recorded() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.symbols_total, 1);
    assert_eq!(report.symbols_scanned, 1);
    assert_eq!(report.alerts, 1);
    assert!(!report.cancelled);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Long"));
    assert!(messages[0].contains("BTCUSDT"));
    assert!(messages[0].contains("<b>30m</b>"));
    // The 5m close at 101 clears the prior 100.5 swing high
    assert!(messages[0].contains("🔥 Bullish break @ 100.5"));

    let key = AlertKey::new(Symbol::new("BTCUSDT"), Timeframe::M30);
    assert_eq!(h.scanner.cooldowns().last_fired(&key), Some(base_time()));
}

#[tokio::test]
async fn test_signal_annotation() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let signal = h
        .scanner
        .evaluate_timeframe(&Symbol::new("BTCUSDT"), Timeframe::M30)
        .await
        .unwrap();
    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.price, 103.0);
    assert!(signal.rsi <= 35.0);
    assert!(signal.channel_lower <= signal.channel_upper);
    assert_eq!(signal.structure, Some(StructureBreak::Bullish(100.5)));
    assert_eq!(signal.entry_timeframe, Timeframe::M5);
    assert_eq!(signal.entry_ema_span, 12);

    // The orchestrator and the standalone evaluator agree on the candidate
    let candidate = h.scanner.trend_evaluator().evaluate(&long_trend()).unwrap();
    assert_eq!(signal.fib_levels, candidate.fib_levels);
    assert_eq!(signal.rsi, candidate.rsi);
    assert_eq!(signal.channel_lower, candidate.channel.lower);
}

#[tokio::test]
async fn test_repeat_within_cooldown_suppressed() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let first = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(first.alerts, 1);

    h.clock.advance(std::time::Duration::from_secs(10));
    let second = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(second.alerts, 0);
    assert_eq!(second.suppressed, 1);
    assert_eq!(h.notifier.messages().len(), 1);

    // The suppressed candidate does not refresh the window
    let key = AlertKey::new(Symbol::new("BTCUSDT"), Timeframe::M30);
    assert_eq!(h.scanner.cooldowns().last_fired(&key), Some(base_time()));
}

#[tokio::test]
async fn test_repeat_after_cooldown_emitted() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    assert_eq!(h.scanner.run_cycle(no_shutdown()).await.unwrap().alerts, 1);
    h.clock.advance(std::time::Duration::from_secs(1800));
    assert_eq!(h.scanner.run_cycle(no_shutdown()).await.unwrap().alerts, 1);
    assert_eq!(h.notifier.messages().len(), 2);
}

#[tokio::test]
async fn test_cooldown_override_from_config() {
    let mut config = test_config(&[Timeframe::M30]);
    config.cooldowns.insert("30m".to_string(), 60);
    let h = harness(
        config,
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    assert_eq!(h.scanner.run_cycle(no_shutdown()).await.unwrap().alerts, 1);
    h.clock.advance(std::time::Duration::from_secs(60));
    assert_eq!(h.scanner.run_cycle(no_shutdown()).await.unwrap().alerts, 1);
}

#[tokio::test]
async fn test_short_signal() {
    let market = FakeMarket::default()
        .with("ETHUSDT", Timeframe::H1, short_trend())
        .with("ETHUSDT", Timeframe::M5, entry_candles(99.0));
    let h = harness(
        test_config(&[Timeframe::H1]),
        market,
        FakeUniverse::of(&["ETHUSDT"]),
        RecordingNotifier::default(),
    );

    let signal = h
        .scanner
        .evaluate_timeframe(&Symbol::new("ETHUSDT"), Timeframe::H1)
        .await
        .unwrap();
    assert_eq!(signal.direction, Direction::Short);
    assert_eq!(signal.structure, Some(StructureBreak::Bearish(99.5)));
}

#[tokio::test]
async fn test_one_direction_per_evaluation() {
    // Each setup confirms only its own direction on the entry timeframe
    for (trend, entry_last, expected) in [
        (long_trend(), 101.0, Direction::Long),
        (short_trend(), 99.0, Direction::Short),
    ] {
        let market = FakeMarket::default()
            .with("BTCUSDT", Timeframe::M30, trend)
            .with("BTCUSDT", Timeframe::M5, entry_candles(entry_last));
        let h = harness(
            test_config(&[Timeframe::M30]),
            market,
            FakeUniverse::of(&["BTCUSDT"]),
            RecordingNotifier::default(),
        );
        let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
        assert_eq!(report.alerts, 1);
        let messages = h.notifier.messages();
        let expected_text = expected.to_string();
        assert!(messages[0].contains(&expected_text));
        let other = match expected {
            Direction::Long => "Short",
            Direction::Short => "Long",
        };
        assert!(!messages[0].contains(other));
    }
}

#[tokio::test]
async fn test_all_timeframes_evaluated_after_alert() {
    let h = harness(
        test_config(&[Timeframe::M30, Timeframe::H1, Timeframe::H4]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30, Timeframe::H1]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.alerts, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.scanner.cooldowns().len(), 2);
}

#[tokio::test]
async fn test_notifier_failure_still_records_cooldown() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::failing(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.alerts, 1);
    assert_eq!(report.notify_failures, 1);

    let key = AlertKey::new(Symbol::new("BTCUSDT"), Timeframe::M30);
    assert!(h.scanner.cooldowns().last_fired(&key).is_some());

    // Not retried on the next cycle
    h.clock.advance(std::time::Duration::from_secs(10));
    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.suppressed, 1);
    assert_eq!(h.notifier.messages().len(), 1);
}

// =============================================================================
// Universe, concurrency and cancellation
// =============================================================================

#[tokio::test]
async fn test_universe_failure_uses_fallback() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::failing(),
        RecordingNotifier::default(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.symbols_total, 2);
    assert_eq!(report.symbols_scanned, 2);
    assert_eq!(report.alerts, 1);
    // ETHUSDT has no data
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_concurrent_symbols_are_bounded() {
    let names: Vec<String> = (0..8).map(|i| format!("COIN{}USDT", i)).collect();
    let mut market = FakeMarket {
        delay: Some(std::time::Duration::from_millis(20)),
        ..FakeMarket::default()
    };
    for name in &names {
        market = market.with_long_setup(name, &[Timeframe::M30]);
    }
    let mut config = test_config(&[Timeframe::M30]);
    config.scanner.max_concurrent_symbols = 3;

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let h = harness(config, market, FakeUniverse::of(&refs), RecordingNotifier::default());

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.symbols_scanned, 8);
    assert_eq!(report.alerts, 8);
    assert_eq!(h.scanner.cooldowns().len(), 8);
    assert_eq!(h.market.fetches.load(Ordering::SeqCst), 16);
    let peak = h.market.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak in-flight {}", peak);
}

#[tokio::test]
async fn test_same_key_fires_once_under_parallel_cycles() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket {
            delay: Some(std::time::Duration::from_millis(5)),
            ..FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30])
        },
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let (a, b) = tokio::join!(
        h.scanner.run_cycle(no_shutdown()),
        h.scanner.run_cycle(no_shutdown())
    );
    assert_eq!(a.unwrap().alerts + b.unwrap().alerts, 1);
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_cycle_timeout_cancels() {
    let mut config = test_config(&[Timeframe::M30]);
    config.schedule.cycle_timeout_secs = Some(1);
    config.scanner.max_concurrent_symbols = 1;
    let market = FakeMarket {
        delay: Some(std::time::Duration::from_secs(5)),
        ..FakeMarket::default()
    };
    let h = harness(
        config,
        market,
        FakeUniverse::of(&["AUSDT", "BUSDT", "CUSDT"]),
        RecordingNotifier::default(),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.symbols_scanned, 0);
    assert!(report.duration < std::time::Duration::from_secs(4));
}

#[tokio::test]
async fn test_cycle_timeout_keeps_gated_delivery() {
    let mut config = test_config(&[Timeframe::M30]);
    config.schedule.cycle_timeout_secs = Some(1);
    let h = harness(
        config,
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::slow(std::time::Duration::from_millis(1500)),
    );

    let report = h.scanner.run_cycle(no_shutdown()).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.symbols_scanned, 0);
    let key = AlertKey::new(Symbol::new("BTCUSDT"), Timeframe::M30);
    assert!(h.scanner.cooldowns().last_fired(&key).is_some());

    // The send outlives the abandoned symbol task
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("BTCUSDT"));
}

#[tokio::test]
async fn test_shutdown_cancels_cycle() {
    let market = FakeMarket {
        delay: Some(std::time::Duration::from_secs(5)),
        ..FakeMarket::default()
    };
    let h = harness(
        test_config(&[Timeframe::M30]),
        market,
        FakeUniverse::of(&["AUSDT"]),
        RecordingNotifier::default(),
    );

    let (tx, rx) = watch::channel(false);
    let scanner = h.scanner.clone();
    let cycle = tokio::spawn(async move { scanner.run_cycle(rx).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let report = tokio::time::timeout(std::time::Duration::from_secs(2), cycle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(report.cancelled);
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test]
async fn test_run_stops_at_max_runtime() {
    let mut config = test_config(&[Timeframe::M30]);
    config.schedule.max_runtime_secs = Some(0);
    let h = harness(
        config,
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let cycles = h.scanner.run(no_shutdown()).await;
    assert_eq!(cycles, 0);
    // Only the startup announcement
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("1 symbols"));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness(
        test_config(&[Timeframe::M30]),
        FakeMarket::default().with_long_setup("BTCUSDT", &[Timeframe::M30]),
        FakeUniverse::of(&["BTCUSDT"]),
        RecordingNotifier::default(),
    );

    let (tx, rx) = watch::channel(false);
    let scanner = h.scanner.clone();
    let run = tokio::spawn(async move { scanner.run(rx).await });

    // Startup announcement + one alert, then the loop sleeps for the 60s floor
    for _ in 0..100 {
        if h.notifier.messages().len() >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();

    let cycles = tokio::time::timeout(std::time::Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(h.notifier.messages().len(), 2);
}

#[tokio::test]
async fn test_run_sweeps_expired_cooldowns() {
    let mut config = test_config(&[Timeframe::M30]);
    config.schedule.cooldown_sweep = true;
    config.schedule.max_runtime_secs = None;
    let h = harness(
        config,
        FakeMarket::default(),
        FakeUniverse::of(&[]),
        RecordingNotifier::default(),
    );

    let stale = AlertKey::new(Symbol::new("OLDUSDT"), Timeframe::M30);
    assert!(h.scanner.cooldowns().try_fire(&stale, base_time()));
    h.clock.advance(std::time::Duration::from_secs(7200));

    let (tx, rx) = watch::channel(false);
    let scanner = h.scanner.clone();
    let run = tokio::spawn(async move { scanner.run(rx).await });
    for _ in 0..100 {
        if h.scanner.cooldowns().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();

    assert!(h.scanner.cooldowns().is_empty());
}

// =============================================================================
// CSV data source
// =============================================================================

#[tokio::test]
async fn test_csv_scan_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let symbol = Symbol::new("BTCUSDT");
    data::save_csv(data::csv_path(dir.path(), &symbol, Timeframe::M30), &long_trend()).unwrap();
    data::save_csv(data::csv_path(dir.path(), &symbol, Timeframe::M5), &entry_candles(101.0)).unwrap();

    let csv = Arc::new(CsvMarketData::new(dir.path()));
    let notifier = Arc::new(RecordingNotifier::default());
    let scanner = Scanner::new(test_config(&[Timeframe::M30]), csv.clone(), csv, notifier.clone()).unwrap();

    let report = scanner.run_cycle(no_shutdown()).await.unwrap();
    assert_eq!(report.symbols_total, 1);
    assert_eq!(report.alerts, 1);
    assert!(notifier.messages()[0].contains("BTCUSDT"));
}
