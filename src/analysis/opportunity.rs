//! Opportunity records
//!
//! An opportunity is an immutable snapshot taken at analysis time. The
//! backtester consumes it read-only; nothing in this crate mutates one
//! after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::confluence::ConfluenceScore;
use super::indicators::IndicatorSnapshot;
use super::mtf::{MtfResult, Recommendation};
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{Direction, Trend};

/// Thresholds and risk sizing for opportunity construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityConfig {
    /// Minimum confluence score for an opportunity
    pub min_score: u32,
    /// Minimum score for the watchlist (below `min_score`)
    pub watchlist_min_score: u32,
    /// Stop distance in ATR multiples
    pub atr_stop_multiplier: f64,
    /// Target distances in multiples of the stop distance
    pub target_r_multiples: Vec<f64>,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            min_score: 60,
            watchlist_min_score: 40,
            atr_stop_multiplier: 1.5,
            target_r_multiples: vec![1.0, 2.0, 3.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub symbol: String,
    pub trend: Trend,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
    pub confluence: ConfluenceScore,
    pub indicators: IndicatorSnapshot,
    pub recommendation: Recommendation,
    pub created_at: DateTime<Utc>,
}

impl Opportunity {
    /// Distance between entry and stop
    pub fn risk(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Reject records the backtester cannot simulate
    pub fn validate(&self) -> AnalysisResult<()> {
        let invalid = |reason: &str| AnalysisError::InvalidOpportunity {
            id: self.id.to_string(),
            reason: reason.to_string(),
        };

        let mut prices = [self.entry_price, self.stop_loss]
            .into_iter()
            .chain(self.targets.iter().copied());
        if prices.any(|p| !p.is_finite() || p <= 0.0) {
            return Err(invalid("prices must be finite and positive"));
        }
        if self.targets.is_empty() {
            return Err(invalid("no targets"));
        }

        let stop_ok = match self.direction {
            Direction::Long => self.stop_loss < self.entry_price,
            Direction::Short => self.stop_loss > self.entry_price,
        };
        if !stop_ok {
            return Err(invalid("stop loss on the wrong side of entry"));
        }

        Ok(())
    }
}

/// A directional setup that scored below the opportunity threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub trend: Trend,
    pub score: u32,
    pub recommendation: Recommendation,
    pub last_close: f64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of evaluating one analysed symbol
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Opportunity(Opportunity),
    Watchlist(WatchlistEntry),
    Rejected,
}

/// Turn an analysed symbol into an opportunity, a watchlist entry or nothing
pub fn evaluate(
    symbol: &str,
    mtf: &MtfResult,
    score: &ConfluenceScore,
    indicators: &IndicatorSnapshot,
    config: &OpportunityConfig,
    created_at: DateTime<Utc>,
) -> Candidate {
    let Some(direction) = mtf.overall_trend.direction() else {
        return Candidate::Rejected;
    };

    if score.total >= config.min_score {
        let Some(atr) = indicators.atr14.filter(|a| *a > 0.0) else {
            return Candidate::Rejected;
        };
        let entry = indicators.last_close;
        let risk = atr * config.atr_stop_multiplier;
        let sign = match direction {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        };

        return Candidate::Opportunity(Opportunity {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            trend: mtf.overall_trend,
            direction,
            entry_price: entry,
            stop_loss: entry - sign * risk,
            targets: config
                .target_r_multiples
                .iter()
                .map(|r| entry + sign * risk * r)
                .collect(),
            confluence: score.clone(),
            indicators: *indicators,
            recommendation: mtf.recommendation,
            created_at,
        });
    }

    if score.total >= config.watchlist_min_score {
        return Candidate::Watchlist(WatchlistEntry {
            symbol: symbol.to_string(),
            trend: mtf.overall_trend,
            score: score.total,
            recommendation: mtf.recommendation,
            last_close: indicators.last_close,
            created_at,
        });
    }

    Candidate::Rejected
}
