//! Single scan cycle

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

pub fn run(config_path: String, data_dir: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(&config_path)?;
    let runtime = super::runtime()?;

    runtime.block_on(async move {
        let scanner = super::build_scanner(config, data_dir)?;
        let shutdown = super::shutdown_on_ctrl_c();
        let report = scanner.run_cycle(shutdown).await?;

        info!("Cycle complete: {}", report);

        println!("\n{}", "=".repeat(60));
        println!("SCAN CYCLE REPORT");
        println!("{}", "=".repeat(60));
        println!("  Symbols:     {}/{}", report.symbols_scanned, report.symbols_total);
        println!("  Alerts:      {}", report.alerts);
        println!("  Suppressed:  {}", report.suppressed);
        println!("  Skipped:     {}", report.skipped);
        if report.notify_failures > 0 {
            println!("  Undelivered: {}", report.notify_failures);
        }
        println!("  Duration:    {:.1}s", report.duration.as_secs_f64());
        if report.cancelled {
            println!("  (cycle was cancelled before completion)");
        }
        println!("{}", "=".repeat(60));
        Ok::<(), anyhow::Error>(())
    })
}
