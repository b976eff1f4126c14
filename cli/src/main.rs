//! Downloads trade history from the configured exchanges.
//!
//! ```bash
//! coin-trade-history list-currencies
//! coin-trade-history --config accounts.yml download trades.csv
//! ```

mod config;
mod service;
mod writer;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use service::TradeHistoryService;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use writer::{CsvTradeWriter, TradeWriter};

#[derive(Parser)]
#[command(name = "coin-trade-history")]
#[command(about = "Download cryptocurrency trade history into a single report", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file listing services and credentials
    #[arg(short, long, env = "COIN_TRADE_HISTORY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available currency pairs
    ListCurrencies,

    /// Download the trade history
    Download {
        /// Destination report file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_file(&cli.config)?;
    let service = TradeHistoryService::from_config(&config)?;

    match cli.command {
        Commands::ListCurrencies => {
            for (name, pairs) in service.list_currency_pairs().await? {
                println!("[{}]", name);
                for pair in pairs {
                    println!("- {}", pair);
                }
            }
        }
        Commands::Download { file } => {
            let trades = service.collect_trades(Utc::now()).await?;

            let mut report = CsvTradeWriter::create(&file)?;
            for trade in &trades {
                report.write(trade)?;
            }
            let total = report.total();
            report.close()?;

            info!(
                "Wrote {} trades to {} (total profit {})",
                trades.len(),
                file.display(),
                total
            );
        }
    }

    Ok(())
}
