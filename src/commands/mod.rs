//! CLI subcommand handlers and the wiring they share

pub mod evaluate;
pub mod once;
pub mod scan;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use confluence_scanner::market::{BinanceMarket, CsvMarketData, MarketData, SymbolUniverse};
use confluence_scanner::notify::{self, Notifier};
use confluence_scanner::{Config, Scanner};

fn load_config(config_path: &str) -> Result<Config> {
    dotenv::dotenv().ok();
    Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

/// Binance collaborators, or the CSV adapter when `data_dir` is given.
fn build_scanner(config: Config, data_dir: Option<PathBuf>) -> Result<Scanner> {
    let notifier: Arc<dyn Notifier> =
        Arc::from(notify::from_config(&config.notifier).context("Failed to create notifier")?);

    let (market, universe) = match data_dir {
        Some(dir) => {
            info!("Reading candles from {}", dir.display());
            let csv = Arc::new(CsvMarketData::new(dir));
            let market: Arc<dyn MarketData> = csv.clone();
            let universe: Arc<dyn SymbolUniverse> = csv;
            (market, universe)
        }
        None => {
            let binance = Arc::new(
                BinanceMarket::new(&config.exchange, config.universe.clone())
                    .context("Failed to create Binance client")?,
            );
            let market: Arc<dyn MarketData> = binance.clone();
            let universe: Arc<dyn SymbolUniverse> = binance;
            (market, universe)
        }
    };

    Scanner::new(config, market, universe, notifier).context("Invalid configuration")
}

/// Shutdown flag flipped by ctrl-c. Must be called inside the runtime.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = tx.send(true);
                tx.closed().await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    rx
}
