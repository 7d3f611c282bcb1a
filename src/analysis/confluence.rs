//! Confluence Scoring
//!
//! Weighted composite of five independently capped factors. The caps sum
//! to 100, so the total never exceeds 100. A factor whose input is missing
//! is left out of the breakdown and contributes nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::market_structure::MarketStructure;
use super::mtf::MtfResult;
use super::smc::SmcPatterns;
use super::volume::VolumeSignal;
use crate::types::Trend;

const MTF_CAP: f64 = 30.0;
const STRUCTURE_CAP: f64 = 20.0;
const VOLUME_CAP: f64 = 15.0;
const PATTERN_CAP: f64 = 20.0;
const RSI_CAP: f64 = 15.0;

/// Configuration for the RSI position factor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_neutral_low: f64,
    pub rsi_neutral_high: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_neutral_low: 40.0,
            rsi_neutral_high: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfluenceFactor {
    MtfAlignment,
    MarketStructure,
    Volume,
    Patterns,
    RsiPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(total: u32) -> Self {
        match total {
            90.. => Grade::APlus,
            80..=89 => Grade::A,
            70..=79 => Grade::BPlus,
            60..=69 => Grade::B,
            50..=59 => Grade::C,
            _ => Grade::D,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Confidence {
    pub fn from_score(total: u32) -> Self {
        match total {
            80.. => Confidence::VeryHigh,
            65..=79 => Confidence::High,
            50..=64 => Confidence::Medium,
            35..=49 => Confidence::Low,
            _ => Confidence::VeryLow,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::VeryLow => "VERY_LOW",
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
            Confidence::VeryHigh => "VERY_HIGH",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceScore {
    /// 0-100, rounded sum of the breakdown
    pub total: u32,
    pub breakdown: BTreeMap<ConfluenceFactor, f64>,
    pub grade: Grade,
    pub confidence: Confidence,
}

impl ConfluenceScore {
    /// Score for a symbol that could not be analysed
    pub fn zero() -> Self {
        Self::from_breakdown(BTreeMap::new())
    }

    pub fn from_breakdown(breakdown: BTreeMap<ConfluenceFactor, f64>) -> Self {
        let total = breakdown.values().sum::<f64>().round().clamp(0.0, 100.0) as u32;
        Self {
            total,
            breakdown,
            grade: Grade::from_score(total),
            confidence: Confidence::from_score(total),
        }
    }
}

/// Inputs to the scorer. `None` means the factor could not be computed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfluenceInputs<'a> {
    pub mtf: Option<&'a MtfResult>,
    pub structure: Option<&'a MarketStructure>,
    pub volume: Option<&'a VolumeSignal>,
    pub patterns: Option<&'a SmcPatterns>,
    pub rsi: Option<f64>,
}

pub fn mtf_points(mtf: &MtfResult) -> f64 {
    (mtf.alignment_pct * 0.3).clamp(0.0, MTF_CAP)
}

pub fn structure_points(structure: &MarketStructure) -> f64 {
    if structure.trend.is_trending() {
        STRUCTURE_CAP
    } else {
        5.0
    }
}

pub fn volume_points(volume: &VolumeSignal) -> f64 {
    if volume.is_spike {
        VOLUME_CAP
    } else if volume.volume_ratio > 1.0 {
        10.0
    } else {
        5.0
    }
}

pub fn pattern_points(patterns: &SmcPatterns) -> f64 {
    let blocks = (patterns.order_blocks.len() as f64 * 3.0).min(10.0);
    let gaps = (patterns.fair_value_gaps.len() as f64 * 2.0).min(6.0);
    let zones = (patterns.liquidity_zones.len() as f64).min(4.0);
    (blocks + gaps + zones).min(PATTERN_CAP)
}

/// RSI position relative to the directional bias
pub fn rsi_points(rsi: f64, bias: Trend, config: &ConfluenceConfig) -> f64 {
    let oversold_long = rsi < config.rsi_oversold && bias == Trend::Bullish;
    let overbought_short = rsi > config.rsi_overbought && bias == Trend::Bearish;

    if oversold_long || overbought_short {
        RSI_CAP
    } else if (config.rsi_neutral_low..=config.rsi_neutral_high).contains(&rsi) {
        10.0
    } else {
        5.0
    }
}

/// Compute the composite score from whatever inputs are present
pub fn score(inputs: &ConfluenceInputs<'_>, config: &ConfluenceConfig) -> ConfluenceScore {
    let mut breakdown = BTreeMap::new();
    let bias = inputs.mtf.map(|m| m.overall_trend).unwrap_or(Trend::Neutral);

    if let Some(mtf) = inputs.mtf {
        breakdown.insert(ConfluenceFactor::MtfAlignment, mtf_points(mtf));
    }
    if let Some(structure) = inputs.structure {
        breakdown.insert(ConfluenceFactor::MarketStructure, structure_points(structure));
    }
    if let Some(volume) = inputs.volume {
        breakdown.insert(ConfluenceFactor::Volume, volume_points(volume));
    }
    if let Some(patterns) = inputs.patterns {
        breakdown.insert(ConfluenceFactor::Patterns, pattern_points(patterns));
    }
    if let Some(rsi) = inputs.rsi {
        breakdown.insert(ConfluenceFactor::RsiPosition, rsi_points(rsi, bias, config));
    }

    ConfluenceScore::from_breakdown(breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::market_structure::StructureTrend;
    use crate::analysis::mtf::{aggregate, MtfConfig};
    use crate::analysis::smc::{FairValueGap, LiquiditySide, LiquidityZone, OrderBlock};
    use crate::analysis::volume::VolumeSignalKind;
    use crate::types::test_support::t0;

    fn mtf(alignment_pct: f64, overall_trend: Trend) -> MtfResult {
        MtfResult {
            alignment_pct,
            overall_trend,
            ..aggregate(Vec::new(), &MtfConfig::default())
        }
    }

    fn structure(trend: StructureTrend) -> MarketStructure {
        MarketStructure {
            trend,
            higher_highs: 0,
            higher_lows: 0,
            lower_highs: 0,
            lower_lows: 0,
            swing_points: Vec::new(),
        }
    }

    fn volume(ratio: f64, is_spike: bool) -> VolumeSignal {
        VolumeSignal {
            current_volume: ratio * 100.0,
            avg_volume: 100.0,
            volume_ratio: ratio,
            price_change_pct: 1.0,
            signal: VolumeSignalKind::Neutral,
            strength: 0.0,
            is_spike,
        }
    }

    fn patterns(blocks: usize, gaps: usize, zones: usize) -> SmcPatterns {
        let block = OrderBlock {
            index: 0,
            timestamp: t0(),
            direction: Trend::Bullish,
            high: 1.0,
            low: 0.0,
            strength: 1.5,
        };
        let gap = FairValueGap {
            index: 0,
            timestamp: t0(),
            direction: Trend::Bullish,
            top: 1.0,
            bottom: 0.0,
            size: 1.0,
        };
        let zone = LiquidityZone {
            price: 1.0,
            count: 3,
            side: LiquiditySide::BuySide,
        };
        SmcPatterns {
            order_blocks: vec![block; blocks],
            fair_value_gaps: vec![gap; gaps],
            liquidity_zones: vec![zone; zones],
        }
    }

    #[test]
    fn test_maximum_score() {
        let m = mtf(100.0, Trend::Bullish);
        let s = structure(StructureTrend::Uptrend);
        let v = volume(3.0, true);
        let p = patterns(5, 5, 5);
        let inputs = ConfluenceInputs {
            mtf: Some(&m),
            structure: Some(&s),
            volume: Some(&v),
            patterns: Some(&p),
            rsi: Some(25.0),
        };
        let result = score(&inputs, &ConfluenceConfig::default());
        assert_eq!(result.total, 100);
        assert_eq!(result.grade, Grade::APlus);
        assert_eq!(result.confidence, Confidence::VeryHigh);
    }

    #[test]
    fn test_absent_factors_contribute_nothing() {
        let m = mtf(60.0, Trend::Bearish);
        let inputs = ConfluenceInputs {
            mtf: Some(&m),
            ..Default::default()
        };
        let result = score(&inputs, &ConfluenceConfig::default());
        assert_eq!(result.breakdown.len(), 1);
        assert_eq!(result.total, 18);
        assert_eq!(result.grade, Grade::D);
        assert_eq!(result.confidence, Confidence::VeryLow);
    }

    #[test]
    fn test_total_is_rounded_breakdown_sum() {
        let m = mtf(100.0 / 3.0, Trend::Neutral);
        let s = structure(StructureTrend::Ranging);
        let v = volume(1.2, false);
        let p = patterns(1, 1, 1);
        let inputs = ConfluenceInputs {
            mtf: Some(&m),
            structure: Some(&s),
            volume: Some(&v),
            patterns: Some(&p),
            rsi: Some(50.0),
        };
        let result = score(&inputs, &ConfluenceConfig::default());
        let sum: f64 = result.breakdown.values().sum();
        assert_eq!(result.total, sum.round() as u32);
        // 10 + 5 + 10 + (3 + 2 + 1) + 10
        assert_eq!(result.total, 41);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_pattern_sub_caps() {
        assert_eq!(pattern_points(&patterns(4, 0, 0)), 10.0);
        assert_eq!(pattern_points(&patterns(0, 4, 0)), 6.0);
        assert_eq!(pattern_points(&patterns(0, 0, 9)), 4.0);
        assert_eq!(pattern_points(&patterns(1, 1, 1)), 6.0);
    }

    #[test]
    fn test_rsi_position_points() {
        let config = ConfluenceConfig::default();
        assert_eq!(rsi_points(25.0, Trend::Bullish, &config), 15.0);
        assert_eq!(rsi_points(75.0, Trend::Bearish, &config), 15.0);
        assert_eq!(rsi_points(25.0, Trend::Bearish, &config), 5.0);
        assert_eq!(rsi_points(40.0, Trend::Neutral, &config), 10.0);
        assert_eq!(rsi_points(60.0, Trend::Bullish, &config), 10.0);
        assert_eq!(rsi_points(65.0, Trend::Bullish, &config), 5.0);
    }

    #[test]
    fn test_volume_points() {
        assert_eq!(volume_points(&volume(2.0, true)), 15.0);
        assert_eq!(volume_points(&volume(1.1, false)), 10.0);
        assert_eq!(volume_points(&volume(0.8, false)), 5.0);
    }

    #[test]
    fn test_grade_and_confidence_thresholds() {
        assert_eq!(Grade::from_score(90), Grade::APlus);
        assert_eq!(Grade::from_score(89), Grade::A);
        assert_eq!(Grade::from_score(70), Grade::BPlus);
        assert_eq!(Grade::from_score(60), Grade::B);
        assert_eq!(Grade::from_score(50), Grade::C);
        assert_eq!(Grade::from_score(49), Grade::D);
        assert_eq!(Confidence::from_score(80), Confidence::VeryHigh);
        assert_eq!(Confidence::from_score(65), Confidence::High);
        assert_eq!(Confidence::from_score(64), Confidence::Medium);
        assert_eq!(Confidence::from_score(35), Confidence::Low);
        assert_eq!(Confidence::from_score(34), Confidence::VeryLow);
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn test_zero_score() {
        let zero = ConfluenceScore::zero();
        assert_eq!(zero.total, 0);
        assert!(zero.breakdown.is_empty());
        assert_eq!(zero.grade, Grade::D);
    }
}
