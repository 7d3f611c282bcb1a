//! Backtest output: console table, trade CSV and run JSON

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

use super::metrics::print_metrics;
use super::simulator::{BacktestRun, SimulatedTrade};
use crate::analysis::Opportunity;

/// Opportunities read from a file; records that failed to parse are only counted
#[derive(Debug, Default)]
pub struct LoadedOpportunities {
    pub opportunities: Vec<Opportunity>,
    pub unreadable: usize,
}

/// Parse a bare opportunity array or a saved scan report.
///
/// Each record is decoded on its own so one malformed entry does not
/// abort the batch.
pub fn parse_opportunities(raw: &str) -> Result<LoadedOpportunities> {
    let value: Value = serde_json::from_str(raw).context("Opportunity file is not valid JSON")?;

    let records = match value {
        Value::Array(records) => records,
        Value::Object(mut map) => match map.remove("opportunities") {
            Some(Value::Array(records)) => records,
            Some(_) => bail!("\"opportunities\" is not a list"),
            None => bail!("No \"opportunities\" field"),
        },
        _ => bail!("Not an opportunity list"),
    };

    let mut loaded = LoadedOpportunities::default();
    for (i, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Opportunity>(record) {
            Ok(opp) => loaded.opportunities.push(opp),
            Err(e) => {
                warn!("Skipping opportunity record {}: {}", i, e);
                loaded.unreadable += 1;
            }
        }
    }
    Ok(loaded)
}

pub fn load_opportunities(path: &Path) -> Result<LoadedOpportunities> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_opportunities(&raw).with_context(|| format!("Failed to load {}", path.display()))
}

/// Flat CSV row; targets are joined with `;`
#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    opportunity_id: String,
    symbol: &'a str,
    direction: String,
    entry_price: f64,
    stop_loss: f64,
    targets: String,
    entry_time: String,
    exit_time: String,
    exit_price: f64,
    exit_reason: String,
    pnl_pct: f64,
    pnl: f64,
    duration_hours: f64,
}

impl<'a> From<&'a SimulatedTrade> for TradeRow<'a> {
    fn from(t: &'a SimulatedTrade) -> Self {
        Self {
            opportunity_id: t.opportunity_id.to_string(),
            symbol: &t.symbol,
            direction: t.direction.to_string(),
            entry_price: t.entry_price,
            stop_loss: t.stop_loss,
            targets: t
                .targets
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            entry_time: t.entry_time.to_rfc3339(),
            exit_time: t.exit_time.to_rfc3339(),
            exit_price: t.exit_price,
            exit_reason: t.exit_reason.to_string(),
            pnl_pct: t.pnl_pct,
            pnl: t.pnl,
            duration_hours: t.duration_hours,
        }
    }
}

/// Write one CSV row per trade to any writer
pub fn write_trades_csv<W: std::io::Write>(writer: W, trades: &[SimulatedTrade]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for trade in trades {
        csv_writer
            .serialize(TradeRow::from(trade))
            .context("Failed to write trade row")?;
    }
    csv_writer.flush().context("Failed to flush trades CSV")?;
    Ok(())
}

pub fn save_trades_csv(path: &Path, trades: &[SimulatedTrade]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_trades_csv(file, trades)
}

/// Pretty JSON of any report
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn print_results(run: &BacktestRun) {
    println!();
    println!("═══════════════════════════════════════════════════════════");
    println!("              OPPORTUNITY BACKTEST RESULTS                 ");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config: capital {:.0}, size {:.0}%, costs {:.2}% round trip, order {:?}",
        run.config.initial_capital,
        run.config.position_size * 100.0,
        run.config.round_trip_cost_pct(),
        run.config.ordering
    );
    println!(
        "Opportunities: {} simulated, {} unfilled, {} skipped, {} without data",
        run.trades.len(),
        run.unfilled,
        run.skipped,
        run.missing_data
    );
    println!();
    print_metrics(&run.metrics);

    if !run.trades.is_empty() {
        println!();
        println!("Trades:");
        for t in &run.trades {
            println!(
                "  {:<10} {:<5} {:>12.4} -> {:>12.4}  {:<9} {:>+7.2}%  {:>6.1}h",
                t.symbol,
                t.direction.to_string(),
                t.entry_price,
                t.exit_price,
                t.exit_reason.to_string(),
                t.pnl_pct,
                t.duration_hours
            );
        }
    }
    println!("═══════════════════════════════════════════════════════════");
}
