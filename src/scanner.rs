//! Symbol scanner
//!
//! Fetches every configured timeframe for each symbol, runs the analysis
//! pipeline and publishes typed events on a broadcast channel. Symbols are
//! processed sequentially in batches with a pause between batches. Mutable
//! state (fetch cache, counters) lives in a `ScanContext` created per scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::analysis::confluence::{self, ConfluenceInputs};
use crate::analysis::mtf::{self, MtfConfig, TimeframeReport};
use crate::analysis::opportunity::{self, Candidate};
use crate::analysis::{
    analyze_structure, analyze_volume, detect_patterns, ConfluenceScore, IndicatorSnapshot,
    MarketStructure, MtfResult, Opportunity, SmcPatterns, VolumeSignal, WatchlistEntry,
};
use crate::config::ScannerConfig;
use crate::data::CandleProvider;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{self, Candle, Timeframe};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 64;

/// Everything derived for one symbol in one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub mtf: MtfResult,
    pub structure: Option<MarketStructure>,
    pub volume: Option<VolumeSignal>,
    pub patterns: Option<SmcPatterns>,
    pub indicators: IndicatorSnapshot,
    pub confluence: ConfluenceScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolAnalysis {
    /// All-neutral, zero-score result for a symbol that could not be analysed
    pub fn failed(symbol: &str, config: &MtfConfig, error: &AnalysisError) -> Self {
        let reports = config
            .timeframes
            .iter()
            .map(|tf| TimeframeReport::failed(*tf, error))
            .collect();
        Self {
            symbol: symbol.to_string(),
            mtf: mtf::aggregate(reports, config),
            structure: None,
            volume: None,
            patterns: None,
            indicators: IndicatorSnapshot::default(),
            confluence: ConfluenceScore::zero(),
            error: Some(error.to_string()),
        }
    }
}

/// Run the full pipeline over already-fetched series.
///
/// `series` holds one entry per MTF timeframe; `primary` is the series the
/// single-timeframe detectors run on. Detectors that lack history are left
/// out of the score instead of failing the symbol.
pub fn analyze_symbol(
    symbol: &str,
    series: &[(Timeframe, AnalysisResult<Vec<Candle>>)],
    primary: &AnalysisResult<Vec<Candle>>,
    config: &ScannerConfig,
) -> SymbolAnalysis {
    let candles = match primary {
        Ok(c) if c.len() >= config.mtf.min_candles => c,
        Ok(c) => {
            let err = AnalysisError::insufficient(config.mtf.min_candles, c.len());
            return SymbolAnalysis::failed(symbol, &config.mtf, &err);
        }
        Err(e) => return SymbolAnalysis::failed(symbol, &config.mtf, e),
    };

    let mtf = mtf::analyze_series(series, &config.mtf);
    let structure = analyze_structure(
        &types::highs(candles),
        &types::lows(candles),
        &config.structure,
    )
    .map_err(|e| debug!("{} structure skipped: {}", symbol, e))
    .ok();
    let volume = analyze_volume(candles, &config.volume)
        .map_err(|e| debug!("{} volume skipped: {}", symbol, e))
        .ok();
    let patterns = detect_patterns(candles, &config.patterns);

    let mut indicators = IndicatorSnapshot::from_candles(candles);
    indicators.volume_ratio = volume.map(|v| v.volume_ratio);

    let inputs = ConfluenceInputs {
        mtf: Some(&mtf),
        structure: structure.as_ref(),
        volume: volume.as_ref(),
        patterns: Some(&patterns),
        rsi: indicators.rsi14,
    };
    let confluence = confluence::score(&inputs, &config.confluence);

    SymbolAnalysis {
        symbol: symbol.to_string(),
        mtf,
        structure,
        volume,
        patterns: Some(patterns),
        indicators,
        confluence,
        error: None,
    }
}

/// Summary carried by the completion event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub opportunities: usize,
    pub watchlist: usize,
    pub failed: usize,
    pub fetch_errors: usize,
    pub duration_ms: i64,
}

/// Events published to subscribers, in this order, once per scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ScanEvent {
    Opportunities(Vec<Opportunity>),
    Watchlist(Vec<WatchlistEntry>),
    ScanComplete(ScanSummary),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Ranked by confluence score, highest first
    pub analyses: Vec<SymbolAnalysis>,
    pub opportunities: Vec<Opportunity>,
    pub watchlist: Vec<WatchlistEntry>,
    pub summary: ScanSummary,
}

/// Mutable state for one scan invocation
pub struct ScanContext {
    pub started_at: DateTime<Utc>,
    cache: HashMap<(String, Timeframe), AnalysisResult<Vec<Candle>>>,
    pub symbols_scanned: usize,
    pub symbols_failed: usize,
    pub fetch_errors: usize,
}

impl ScanContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            cache: HashMap::new(),
            symbols_scanned: 0,
            symbols_failed: 0,
            fetch_errors: 0,
        }
    }

    /// Fetch once per (symbol, timeframe) within this scan
    pub async fn fetch(
        &mut self,
        provider: &dyn CandleProvider,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>> {
        let key = (symbol.to_string(), timeframe);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let result = provider.get_candles(symbol, timeframe, limit).await;
        if let Err(e) = &result {
            warn!("{}", e);
            self.fetch_errors += 1;
        }
        self.cache.insert(key, result.clone());
        result
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Scanner {
    config: ScannerConfig,
    provider: Arc<dyn CandleProvider>,
    tx: broadcast::Sender<ScanEvent>,
}

impl Scanner {
    pub fn new(config: ScannerConfig, provider: Arc<dyn CandleProvider>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            provider,
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: ScanEvent) {
        // No subscribers is fine; the report is also returned
        let _ = self.tx.send(event);
    }

    /// Fetch and analyse one symbol
    pub async fn scan_symbol(&self, ctx: &mut ScanContext, symbol: &str) -> SymbolAnalysis {
        let limit = self.config.batch.candle_limit;
        let provider = self.provider.as_ref();

        let mut series = Vec::with_capacity(self.config.mtf.timeframes.len());
        for &tf in &self.config.mtf.timeframes {
            series.push((tf, ctx.fetch(provider, symbol, tf, limit).await));
        }
        let primary = ctx
            .fetch(provider, symbol, self.config.primary_timeframe, limit)
            .await;

        let analysis = analyze_symbol(symbol, &series, &primary, &self.config);
        ctx.symbols_scanned += 1;
        if analysis.error.is_some() {
            ctx.symbols_failed += 1;
        }
        analysis
    }

    /// Scan all symbols, publish the three events and return the report
    pub async fn run_scan(&self, symbols: &[String]) -> ScanReport {
        let mut ctx = ScanContext::new();
        let batch = &self.config.batch;
        info!(
            "Scanning {} symbols via {} (batch size {})",
            symbols.len(),
            self.provider.name(),
            batch.batch_size
        );

        let mut analyses = Vec::with_capacity(symbols.len());
        let mut opportunities = Vec::new();
        let mut watchlist = Vec::new();

        for (i, chunk) in symbols.chunks(batch.batch_size.max(1)).enumerate() {
            if i > 0 && batch.batch_delay_ms > 0 {
                debug!("Batch {} done, sleeping {}ms", i, batch.batch_delay_ms);
                tokio::time::sleep(Duration::from_millis(batch.batch_delay_ms)).await;
            }

            for symbol in chunk {
                let analysis = self.scan_symbol(&mut ctx, symbol).await;
                match &analysis.error {
                    Some(e) => warn!("{} failed: {}", symbol, e),
                    None => info!(
                        "{}: {} score {} ({})",
                        symbol,
                        analysis.mtf.overall_trend,
                        analysis.confluence.total,
                        analysis.confluence.grade
                    ),
                }

                if analysis.error.is_none() {
                    match opportunity::evaluate(
                        symbol,
                        &analysis.mtf,
                        &analysis.confluence,
                        &analysis.indicators,
                        &self.config.opportunity,
                        Utc::now(),
                    ) {
                        Candidate::Opportunity(opp) => opportunities.push(opp),
                        Candidate::Watchlist(entry) => watchlist.push(entry),
                        Candidate::Rejected => {}
                    }
                }
                analyses.push(analysis);
            }
        }

        analyses.sort_by(|a, b| b.confluence.total.cmp(&a.confluence.total));
        opportunities.sort_by(|a, b| b.confluence.total.cmp(&a.confluence.total));
        watchlist.sort_by(|a, b| b.score.cmp(&a.score));

        let finished_at = Utc::now();
        let summary = ScanSummary {
            scanned: ctx.symbols_scanned,
            opportunities: opportunities.len(),
            watchlist: watchlist.len(),
            failed: ctx.symbols_failed,
            fetch_errors: ctx.fetch_errors,
            duration_ms: (finished_at - ctx.started_at).num_milliseconds(),
        };
        info!(
            "Scan complete: {} opportunities, {} watchlist, {} failed",
            summary.opportunities, summary.watchlist, summary.failed
        );

        self.publish(ScanEvent::Opportunities(opportunities.clone()));
        self.publish(ScanEvent::Watchlist(watchlist.clone()));
        self.publish(ScanEvent::ScanComplete(summary.clone()));

        ScanReport {
            started_at: ctx.started_at,
            finished_at,
            analyses,
            opportunities,
            watchlist,
            summary,
        }
    }
}

/// Print the ranked scan table
pub fn print_scan_report(report: &ScanReport) {
    println!("\n═══════════════════════════════════════════════════════════════════════");
    println!("                        CONFLUENCE SCAN RESULTS");
    println!("═══════════════════════════════════════════════════════════════════════");
    println!(
        "{:<12} {:>6} {:>5} {:>10} {:>8} {:>12}  {}",
        "Symbol", "Score", "Grade", "Trend", "Align%", "Confidence", "Recommendation"
    );
    println!("───────────────────────────────────────────────────────────────────────");

    for a in &report.analyses {
        if let Some(err) = &a.error {
            println!("{:<12} {:>6} {:>5} {:>10}  error: {}", a.symbol, 0, "-", "-", err);
            continue;
        }
        println!(
            "{:<12} {:>6} {:>5} {:>10} {:>7.0}% {:>12}  {}",
            a.symbol,
            a.confluence.total,
            a.confluence.grade.to_string(),
            a.mtf.overall_trend.to_string(),
            a.mtf.alignment_pct,
            a.confluence.confidence.to_string(),
            a.mtf.recommendation
        );
    }

    if !report.opportunities.is_empty() {
        println!("\nOPPORTUNITIES:");
        for o in &report.opportunities {
            let targets: Vec<String> = o.targets.iter().map(|t| format!("{:.4}", t)).collect();
            println!(
                "  {:<10} {:<5} entry {:.4}  stop {:.4}  targets [{}]",
                o.symbol,
                o.direction.to_string(),
                o.entry_price,
                o.stop_loss,
                targets.join(", ")
            );
        }
    }

    if !report.watchlist.is_empty() {
        println!("\nWATCHLIST:");
        for w in &report.watchlist {
            println!("  {:<10} {:<8} score {}", w.symbol, w.trend.to_string(), w.score);
        }
    }

    println!(
        "\nScanned {} symbols in {}ms ({} failed, {} fetch errors)",
        report.summary.scanned,
        report.summary.duration_ms,
        report.summary.failed,
        report.summary.fetch_errors
    );
}
