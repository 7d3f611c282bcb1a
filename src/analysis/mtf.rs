//! Multi-Timeframe Trend Aggregation
//!
//! Classifies each timeframe from EMA20/EMA50/RSI14 and reduces the
//! per-timeframe reports into an alignment score and a recommendation.
//! A timeframe that failed to load or is too short degrades to a neutral
//! report with an error marker; it still counts toward the total.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::indicators::{ema, rsi};
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{self, Candle, Timeframe, Trend};

/// Configuration for multi-timeframe aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtfConfig {
    pub timeframes: Vec<Timeframe>,
    /// Agreeing timeframes required for an overall trend
    pub min_confirming: usize,
    /// Candles required per timeframe
    pub min_candles: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
}

impl Default for MtfConfig {
    fn default() -> Self {
        Self {
            timeframes: Timeframe::default_set(),
            min_confirming: 3,
            min_candles: 50,
            ema_fast: 20,
            ema_slow: 50,
            rsi_period: 14,
        }
    }
}

/// Signals derived from the latest indicator values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSignal {
    EmaBullish,
    EmaBearish,
    PriceAboveEmas,
    PriceBelowEmas,
    RsiBullish,
    RsiBearish,
}

impl TrendSignal {
    pub fn bias(&self) -> Trend {
        match self {
            TrendSignal::EmaBullish | TrendSignal::PriceAboveEmas | TrendSignal::RsiBullish => {
                Trend::Bullish
            }
            TrendSignal::EmaBearish | TrendSignal::PriceBelowEmas | TrendSignal::RsiBearish => {
                Trend::Bearish
            }
        }
    }
}

/// Per-timeframe classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReport {
    pub timeframe: Timeframe,
    pub trend: Trend,
    pub signals: Vec<TrendSignal>,
    pub bullish_signals: usize,
    pub bearish_signals: usize,
    pub last_close: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TimeframeReport {
    /// Neutral report for a timeframe that could not be analysed
    pub fn failed(timeframe: Timeframe, error: &AnalysisError) -> Self {
        Self {
            timeframe,
            trend: Trend::Neutral,
            signals: Vec::new(),
            bullish_signals: 0,
            bearish_signals: 0,
            last_close: None,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Wait,
    Sell,
    StrongSell,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::StrongBuy => write!(f, "STRONG_BUY"),
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Wait => write!(f, "WAIT"),
            Recommendation::Sell => write!(f, "SELL"),
            Recommendation::StrongSell => write!(f, "STRONG_SELL"),
        }
    }
}

/// Aggregated multi-timeframe result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfResult {
    pub per_timeframe: BTreeMap<Timeframe, TimeframeReport>,
    pub overall_trend: Trend,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub total_timeframes: usize,
    /// max(bullish, bearish) / total * 100
    pub alignment_pct: f64,
    /// confirming / total * 100
    pub strength_pct: f64,
    pub recommendation: Recommendation,
}

impl MtfResult {
    pub fn error_count(&self) -> usize {
        self.per_timeframe.values().filter(|r| r.is_error()).count()
    }
}

/// Classify one timeframe from its candle series
pub fn classify_timeframe(
    timeframe: Timeframe,
    candles: &[Candle],
    config: &MtfConfig,
) -> AnalysisResult<TimeframeReport> {
    if candles.len() < config.min_candles {
        return Err(AnalysisError::insufficient(config.min_candles, candles.len()));
    }

    let closes = types::closes(candles);
    let fast_line = ema(&closes, config.ema_fast);
    let slow_line = ema(&closes, config.ema_slow);
    let (Some(&close), Some(&fast), Some(&slow)) =
        (closes.last(), fast_line.last(), slow_line.last())
    else {
        return Err(AnalysisError::insufficient(config.min_candles, candles.len()));
    };
    let rsi_value = rsi(&closes, config.rsi_period).last().copied();

    let mut signals = Vec::with_capacity(3);
    if fast > slow {
        signals.push(TrendSignal::EmaBullish);
    } else if fast < slow {
        signals.push(TrendSignal::EmaBearish);
    }

    if close > fast && close > slow {
        signals.push(TrendSignal::PriceAboveEmas);
    } else if close < fast && close < slow {
        signals.push(TrendSignal::PriceBelowEmas);
    }

    match rsi_value {
        Some(v) if v > 50.0 => signals.push(TrendSignal::RsiBullish),
        Some(v) if v < 50.0 => signals.push(TrendSignal::RsiBearish),
        _ => {}
    }

    let bullish_signals = signals.iter().filter(|s| s.bias() == Trend::Bullish).count();
    let bearish_signals = signals.len() - bullish_signals;
    let trend = if bullish_signals > bearish_signals {
        Trend::Bullish
    } else if bearish_signals > bullish_signals {
        Trend::Bearish
    } else {
        Trend::Neutral
    };

    Ok(TimeframeReport {
        timeframe,
        trend,
        signals,
        bullish_signals,
        bearish_signals,
        last_close: Some(close),
        ema_fast: Some(fast),
        ema_slow: Some(slow),
        rsi: rsi_value,
        error: None,
    })
}

/// Map alignment and direction to a recommendation
pub fn recommend(overall: Trend, alignment_pct: f64) -> Recommendation {
    match (overall, alignment_pct) {
        (Trend::Bullish, a) if a >= 80.0 => Recommendation::StrongBuy,
        (Trend::Bullish, a) if a >= 60.0 => Recommendation::Buy,
        (Trend::Bearish, a) if a >= 80.0 => Recommendation::StrongSell,
        (Trend::Bearish, a) if a >= 60.0 => Recommendation::Sell,
        _ => Recommendation::Wait,
    }
}

/// Reduce per-timeframe reports into an overall result
pub fn aggregate(reports: Vec<TimeframeReport>, config: &MtfConfig) -> MtfResult {
    let total_timeframes = reports.len();
    let bullish_count = reports.iter().filter(|r| r.trend == Trend::Bullish).count();
    let bearish_count = reports.iter().filter(|r| r.trend == Trend::Bearish).count();
    let neutral_count = total_timeframes - bullish_count - bearish_count;

    let pct = |count: usize| {
        if total_timeframes == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total_timeframes as f64
        }
    };

    let alignment_pct = pct(bullish_count.max(bearish_count));

    let overall_trend = if bullish_count >= config.min_confirming && bullish_count > bearish_count {
        Trend::Bullish
    } else if bearish_count >= config.min_confirming && bearish_count > bullish_count {
        Trend::Bearish
    } else {
        Trend::Neutral
    };

    let confirming = match overall_trend {
        Trend::Bullish => bullish_count,
        Trend::Bearish => bearish_count,
        Trend::Neutral => 0,
    };

    MtfResult {
        per_timeframe: reports.into_iter().map(|r| (r.timeframe, r)).collect(),
        overall_trend,
        bullish_count,
        bearish_count,
        neutral_count,
        total_timeframes,
        alignment_pct,
        strength_pct: pct(confirming),
        recommendation: recommend(overall_trend, alignment_pct),
    }
}

/// Classify every fetched series and aggregate. Fetch or length failures
/// become neutral error reports.
pub fn analyze_series(
    series: &[(Timeframe, AnalysisResult<Vec<Candle>>)],
    config: &MtfConfig,
) -> MtfResult {
    let reports = series
        .iter()
        .map(|(timeframe, fetched)| {
            fetched
                .as_ref()
                .map_err(Clone::clone)
                .and_then(|candles| classify_timeframe(*timeframe, candles, config))
                .unwrap_or_else(|e| TimeframeReport::failed(*timeframe, &e))
        })
        .collect();

    aggregate(reports, config)
}
