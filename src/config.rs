//! Scanner configuration
//!
//! One immutable struct per component, composed into `ScannerConfig`. Every
//! struct is `#[serde(default)]`, so a JSON file only needs the keys it
//! changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{
    ConfluenceConfig, MtfConfig, OpportunityConfig, PatternConfig, StructureConfig, VolumeConfig,
};
use crate::backtest::BacktestConfig;
use crate::data::ProviderConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::Timeframe;

/// How symbols are paced through a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Symbols analysed per batch
    pub batch_size: usize,
    /// Pause between batches (milliseconds)
    pub batch_delay_ms: u64,
    /// Candles requested per symbol and timeframe
    pub candle_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 1000,
            candle_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Timeframe for structure, volume, pattern and indicator analysis
    pub primary_timeframe: Timeframe,
    pub mtf: MtfConfig,
    pub structure: StructureConfig,
    pub volume: VolumeConfig,
    pub patterns: PatternConfig,
    pub confluence: ConfluenceConfig,
    pub opportunity: OpportunityConfig,
    pub batch: BatchConfig,
    pub provider: ProviderConfig,
    pub backtest: BacktestConfig,
}

impl ScannerConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the analysis cannot run with
    pub fn validate(&self) -> AnalysisResult<()> {
        let fail = |msg: &str| Err(AnalysisError::Config(msg.to_string()));

        if self.mtf.timeframes.is_empty() {
            return fail("mtf.timeframes must not be empty");
        }
        let mut seen = std::collections::HashSet::new();
        if !self.mtf.timeframes.iter().all(|tf| seen.insert(*tf)) {
            return fail("mtf.timeframes must not repeat a timeframe");
        }
        if self.mtf.min_confirming == 0 || self.mtf.min_confirming > self.mtf.timeframes.len() {
            return fail("mtf.min_confirming must be between 1 and the number of timeframes");
        }
        if self.mtf.ema_fast == 0 || self.mtf.ema_slow == 0 || self.mtf.rsi_period == 0 {
            return fail("indicator periods must be positive");
        }
        if self.volume.lookback == 0 {
            return fail("volume.lookback must be positive");
        }
        if self.batch.batch_size == 0 {
            return fail("batch.batch_size must be positive");
        }
        if self.batch.candle_limit < self.mtf.min_candles {
            return fail("batch.candle_limit must cover mtf.min_candles");
        }
        if self.opportunity.watchlist_min_score > self.opportunity.min_score {
            return fail("opportunity.watchlist_min_score must not exceed min_score");
        }
        if self.opportunity.target_r_multiples.is_empty() {
            return fail("opportunity.target_r_multiples must not be empty");
        }
        if !(self.provider.synthetic_volatility.is_finite()
            && self.provider.synthetic_volatility >= 0.0)
        {
            return fail("provider.synthetic_volatility must be non-negative");
        }
        self.backtest.validate()
    }
}
