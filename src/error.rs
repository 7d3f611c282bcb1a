//! Error taxonomy for analysis and backtesting
//!
//! Every variant is recoverable at the unit that raised it (one timeframe,
//! one symbol, one trade). Callers turn them into neutral/error records
//! instead of aborting a scan or a backtest.

use thiserror::Error;

use crate::types::Timeframe;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// Fewer candles than the computation needs
    #[error("insufficient data: need {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Market data collaborator failed or timed out
    #[error("failed to fetch {symbol} {timeframe}: {reason}")]
    DataFetch {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },

    /// Backtest input missing or inconsistent prices
    #[error("invalid opportunity {id}: {reason}")]
    InvalidOpportunity { id: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn insufficient(required: usize, actual: usize) -> Self {
        Self::InsufficientData { required, actual }
    }

    pub fn fetch(symbol: &str, timeframe: Timeframe, reason: impl Into<String>) -> Self {
        Self::DataFetch {
            symbol: symbol.to_string(),
            timeframe,
            reason: reason.into(),
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
