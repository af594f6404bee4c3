//! Confluence scanner - main entry point
//!
//! Subcommands:
//! - scan: continuous scanning until ctrl-c or the maximum runtime
//! - once: a single scan cycle
//! - evaluate: run the evaluator chain for one symbol and print each stage

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "confluence-scanner")]
#[command(about = "Multi-timeframe RSI / EMA channel confluence scanner with deduplicated alerts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan continuously until ctrl-c or the maximum runtime
    Scan {
        /// Path to configuration file (defaults are used if missing)
        #[arg(short, long, default_value = "configs/scanner.json")]
        config: String,

        /// Read candles from CSV files in this directory instead of Binance
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Run a single scan cycle and print the report
    Once {
        #[arg(short, long, default_value = "configs/scanner.json")]
        config: String,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Evaluate one symbol without touching cooldowns or notifying
    Evaluate {
        /// Symbol to evaluate, e.g. BTCUSDT
        #[arg(short, long)]
        symbol: String,

        /// Single higher timeframe (defaults to every configured one)
        #[arg(short, long)]
        timeframe: Option<String>,

        #[arg(short, long, default_value = "configs/scanner.json")]
        config: String,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging to: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Scan { .. } => "scan",
        Commands::Once { .. } => "once",
        Commands::Evaluate { .. } => "evaluate",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Scan { config, data_dir } => commands::scan::run(config, data_dir),
        Commands::Once { config, data_dir } => commands::once::run(config, data_dir),
        Commands::Evaluate {
            symbol,
            timeframe,
            config,
            data_dir,
        } => commands::evaluate::run(config, symbol, timeframe, data_dir),
    }
}
