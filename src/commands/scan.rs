//! Continuous scan: cycles until ctrl-c or the configured maximum runtime

use anyhow::Result;
use itertools::Itertools;
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: String, data_dir: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(&config_path)?;

    info!("Confluence scanner starting");
    info!("  Timeframes: {}", config.scanner.timeframes.iter().join(", "));
    info!(
        "  Entry:      {} EMA{}",
        config.scanner.entry_timeframe, config.indicators.entry_ema
    );
    info!(
        "  Universe:   {} (min {}M quote volume, max {})",
        if data_dir.is_some() { "CSV files" } else { "Binance" },
        config.universe.min_quote_volume_million,
        config.universe.max_symbols
    );
    info!(
        "  Cycle:      target {}s, floor {}s, max runtime {}",
        config.schedule.target_cycle_secs,
        config.schedule.min_sleep_secs,
        config
            .schedule
            .max_runtime_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "unbounded".to_string())
    );

    let runtime = super::runtime()?;
    runtime.block_on(async move {
        let scanner = super::build_scanner(config, data_dir)?;
        let shutdown = super::shutdown_on_ctrl_c();
        let cycles = scanner.run(shutdown).await;
        info!("Scan session ended after {} cycles", cycles);
        Ok::<(), anyhow::Error>(())
    })
}
