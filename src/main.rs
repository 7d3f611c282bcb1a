use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use confluence_scanner::backtest::{report, Backtester, TradeOrdering};
use confluence_scanner::data::{build_provider, DataSourcePolicy};
use confluence_scanner::scanner::print_scan_report;
use confluence_scanner::{Scanner, ScannerConfig, Timeframe};

#[derive(Parser, Debug)]
#[command(name = "confluence-scanner")]
#[command(about = "Multi-timeframe confluence scanner and opportunity backtester")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file; missing keys keep their defaults
    #[arg(short, long, global = true, env = "CONFLUENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score symbols and list opportunities
    Scan {
        /// Comma-separated symbols
        #[arg(short, long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,

        /// Candle source: synthetic, live or fallback
        #[arg(long, default_value = "synthetic", env = "CONFLUENCE_SOURCE")]
        source: DataSourcePolicy,

        /// Write the full scan report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Symbols per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Pause between batches in milliseconds
        #[arg(long)]
        batch_delay_ms: Option<u64>,

        /// Minimum score for an opportunity
        #[arg(long)]
        min_score: Option<u32>,
    },

    /// Replay stored opportunities against historical candles
    Backtest {
        /// JSON file with an opportunity list or a scan report
        #[arg(long)]
        opportunities: PathBuf,

        /// Candle source: synthetic, live or fallback
        #[arg(long, default_value = "synthetic", env = "CONFLUENCE_SOURCE")]
        source: DataSourcePolicy,

        /// Candle timeframe to replay
        #[arg(long)]
        timeframe: Option<Timeframe>,

        /// Candles fetched per symbol
        #[arg(long)]
        limit: Option<usize>,

        /// Apply trades to equity in entry-time order instead of input order
        #[arg(long)]
        by_entry_time: bool,

        /// Write the full run as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write one CSV row per trade
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_directive = if args.verbose {
        "confluence_scanner=debug"
    } else {
        "confluence_scanner=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => ScannerConfig::load(path)?,
        None => ScannerConfig::default(),
    };

    match args.command {
        Commands::Scan {
            symbols,
            source,
            output,
            batch_size,
            batch_delay_ms,
            min_score,
        } => {
            if let Some(size) = batch_size {
                config.batch.batch_size = size;
            }
            if let Some(delay) = batch_delay_ms {
                config.batch.batch_delay_ms = delay;
            }
            if let Some(score) = min_score {
                config.opportunity.min_score = score;
                config.opportunity.watchlist_min_score =
                    config.opportunity.watchlist_min_score.min(score);
            }
            run_scan(config, symbols, source, output).await?;
        }
        Commands::Backtest {
            opportunities,
            source,
            timeframe,
            limit,
            by_entry_time,
            output,
            trades_csv,
        } => {
            if let Some(tf) = timeframe {
                config.backtest.timeframe = tf;
            }
            if let Some(limit) = limit {
                config.backtest.candle_limit = limit;
            }
            if by_entry_time {
                config.backtest.ordering = TradeOrdering::EntryTime;
            }
            run_backtest(config, &opportunities, source, output, trades_csv).await?;
        }
    }

    Ok(())
}

async fn run_scan(
    config: ScannerConfig,
    symbols: Vec<String>,
    source: DataSourcePolicy,
    output: Option<PathBuf>,
) -> Result<()> {
    config.validate()?;
    let symbols: Vec<String> = symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        bail!("No symbols given");
    }

    let provider = build_provider(source, &config.provider)?;
    info!("Data source: {}", source);

    let scanner = Scanner::new(config, provider);
    let scan = scanner.run_scan(&symbols).await;
    print_scan_report(&scan);

    if let Some(path) = output {
        report::save_json(&path, &scan)?;
        info!("Scan report written to {}", path.display());
    }

    Ok(())
}

async fn run_backtest(
    config: ScannerConfig,
    opportunities_path: &Path,
    source: DataSourcePolicy,
    output: Option<PathBuf>,
    trades_csv: Option<PathBuf>,
) -> Result<()> {
    config.backtest.validate()?;
    let loaded = report::load_opportunities(opportunities_path)?;
    info!(
        "Loaded {} opportunities from {} ({} unreadable)",
        loaded.opportunities.len(),
        opportunities_path.display(),
        loaded.unreadable
    );

    let provider = build_provider(source, &config.provider)?;
    let backtester = Backtester::new(config.backtest);
    let mut run = backtester
        .run_with_provider(&loaded.opportunities, provider.as_ref())
        .await;
    run.skipped += loaded.unreadable;
    report::print_results(&run);

    if let Some(path) = output {
        report::save_json(&path, &run)?;
        info!("Backtest run written to {}", path.display());
    }
    if let Some(path) = trades_csv {
        report::save_trades_csv(&path, &run.trades)?;
        info!("{} trades written to {}", run.trades.len(), path.display());
    }

    Ok(())
}
