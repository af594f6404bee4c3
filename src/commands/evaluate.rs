//! Evaluate one symbol and print every stage of the chain
//!
//! Read-only: the cooldown store is not consulted and nothing is sent.

use anyhow::{Context, Result};
use std::path::PathBuf;

use confluence_scanner::notify::format_alert;
use confluence_scanner::{Symbol, Timeframe};

pub fn run(
    config_path: String,
    symbol: String,
    timeframe: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let config = super::load_config(&config_path)?;
    let timeframes: Vec<Timeframe> = match timeframe {
        Some(label) => vec![label.parse().context("Invalid --timeframe")?],
        None => config.scanner.timeframes.clone(),
    };
    let symbol = Symbol::new(symbol.trim().to_uppercase());
    let trend_lookback = config.scanner.trend_lookback;

    let runtime = super::runtime()?;
    runtime.block_on(async move {
        let scanner = super::build_scanner(config, data_dir)?;

        for timeframe in timeframes {
            println!("\n{} {}", symbol, timeframe);
            println!("{}", "-".repeat(40));

            match scanner.market().fetch_candles(&symbol, timeframe, trend_lookback).await {
                Ok(candles) => match scanner.trend_evaluator().snapshot(&candles) {
                    Ok(s) => println!(
                        "  trend:   RSI {:.2}  EMA fast {:.6}  EMA slow {:.6}  price {}",
                        s.rsi, s.ema_fast, s.ema_slow, s.price
                    ),
                    Err(reason) => println!("  trend:   {}", reason),
                },
                Err(e) => println!("  trend:   {}", e),
            }

            match scanner.qualify(&symbol, timeframe).await {
                Ok(qualified) => {
                    println!(
                        "  verdict: {} candidate, entry close {} vs EMA {:.6}",
                        qualified.candidate.direction, qualified.entry.close, qualified.entry.ema
                    );
                    let signal = scanner.annotate(&symbol, timeframe, qualified);
                    println!("\n{}", format_alert(&signal));
                }
                Err(reason) => println!("  verdict: rejected, {}", reason),
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
