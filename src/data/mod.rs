//! Market data providers
//!
//! The analysis core only sees the `CandleProvider` trait. Whether candles
//! come from the exchange, from the synthetic generator or from the exchange
//! with a synthetic fallback is decided once, in `build_provider`.

pub mod binance;
pub mod synthetic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::error::AnalysisResult;
use crate::types::{Candle, Timeframe};

pub use binance::BinanceProvider;
pub use synthetic::SyntheticProvider;

/// Source of historical candles for one symbol and timeframe
#[async_trait]
pub trait CandleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Oldest-first candles, at most `limit`. Returning fewer is not an error;
    /// callers check length themselves.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>>;
}

/// Where candles come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourcePolicy {
    Live,
    #[default]
    Synthetic,
    /// Live data, synthetic when the exchange request fails
    LiveWithFallback,
}

impl std::fmt::Display for DataSourcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSourcePolicy::Live => write!(f, "live"),
            DataSourcePolicy::Synthetic => write!(f, "synthetic"),
            DataSourcePolicy::LiveWithFallback => write!(f, "fallback"),
        }
    }
}

impl FromStr for DataSourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(DataSourcePolicy::Live),
            "synthetic" => Ok(DataSourcePolicy::Synthetic),
            "fallback" | "live_with_fallback" => Ok(DataSourcePolicy::LiveWithFallback),
            other => Err(format!(
                "unknown data source '{}' (expected live, synthetic or fallback)",
                other
            )),
        }
    }
}

/// Provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the spot REST API
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Per-candle standard deviation of synthetic returns
    pub synthetic_volatility: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: binance::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
            synthetic_volatility: 0.01,
        }
    }
}

/// Serves live data and falls back to a secondary provider on any failure
pub struct FallbackProvider {
    primary: Arc<dyn CandleProvider>,
    fallback: Arc<dyn CandleProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn CandleProvider>, fallback: Arc<dyn CandleProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl CandleProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>> {
        match self.primary.get_candles(symbol, timeframe, limit).await {
            Ok(candles) => Ok(candles),
            Err(e) => {
                warn!(
                    "{} failed for {} {}: {}; using {}",
                    self.primary.name(),
                    symbol,
                    timeframe,
                    e,
                    self.fallback.name()
                );
                self.fallback.get_candles(symbol, timeframe, limit).await
            }
        }
    }
}

/// The single place a data source is chosen
pub fn build_provider(
    policy: DataSourcePolicy,
    config: &ProviderConfig,
) -> AnalysisResult<Arc<dyn CandleProvider>> {
    let synthetic = || Arc::new(SyntheticProvider::new(config.synthetic_volatility));

    let provider: Arc<dyn CandleProvider> = match policy {
        DataSourcePolicy::Synthetic => synthetic(),
        DataSourcePolicy::Live => Arc::new(BinanceProvider::new(
            &config.base_url,
            config.request_timeout_secs,
        )?),
        DataSourcePolicy::LiveWithFallback => Arc::new(FallbackProvider::new(
            Arc::new(BinanceProvider::new(
                &config.base_url,
                config.request_timeout_secs,
            )?),
            synthetic(),
        )),
    };

    Ok(provider)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::AnalysisError;

    /// Provider that fails every request
    pub struct FailingProvider;

    #[async_trait]
    impl CandleProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn get_candles(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            _limit: usize,
        ) -> AnalysisResult<Vec<Candle>> {
            Err(AnalysisError::fetch(symbol, timeframe, "connection refused"))
        }
    }

    /// Provider serving fixed series per (symbol, timeframe); unknown keys fail
    pub struct FixedProvider {
        pub series: std::collections::HashMap<(String, Timeframe), Vec<Candle>>,
    }

    #[async_trait]
    impl CandleProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_candles(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            limit: usize,
        ) -> AnalysisResult<Vec<Candle>> {
            let series = self
                .series
                .get(&(symbol.to_string(), timeframe))
                .ok_or_else(|| AnalysisError::fetch(symbol, timeframe, "no data"))?;
            let start = series.len().saturating_sub(limit);
            Ok(series[start..].to_vec())
        }
    }
}
