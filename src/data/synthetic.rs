//! Seeded random-walk candles
//!
//! Used offline and as the fallback when the exchange is unreachable. The
//! walk is seeded from the symbol and timeframe, so the same request always
//! yields the same series.

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::CandleProvider;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{Candle, Timeframe};

pub struct SyntheticProvider {
    volatility: f64,
    /// Open time of the newest candle; `None` means the current period
    anchor: Option<DateTime<Utc>>,
}

impl SyntheticProvider {
    pub fn new(volatility: f64) -> Self {
        Self {
            volatility,
            anchor: None,
        }
    }

    /// Pin the newest candle to a fixed time
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    fn last_open(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.anchor.unwrap_or_else(|| {
            let now = Utc::now();
            now.duration_trunc(timeframe.duration()).unwrap_or(now)
        })
    }

    /// Generate `limit` candles ending at the anchor
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>> {
        if !(self.volatility.is_finite() && self.volatility >= 0.0) {
            return Err(AnalysisError::Config(format!(
                "synthetic volatility must be a non-negative number, got {}",
                self.volatility
            )));
        }
        let seed = seed_for(symbol, timeframe);
        let mut rng = StdRng::seed_from_u64(seed);
        let invalid = |e: rand_distr::NormalError| {
            AnalysisError::Config(format!("synthetic volatility {}: {}", self.volatility, e))
        };

        // Per-series drift gives some symbols a trend and leaves others ranging
        let drift = Normal::new(0.0, self.volatility * 0.3)
            .map_err(invalid)?
            .sample(&mut rng);
        let returns = Normal::new(drift, self.volatility).map_err(invalid)?;
        let wicks = Normal::new(0.0, self.volatility * 0.5).map_err(invalid)?;
        let volume_noise = Normal::new(0.0f64, 0.3).map_err(invalid)?;

        let mut price = 10.0 + (seed % 50_000) as f64;
        let base_volume = 1_000.0 + (seed % 9_000) as f64;
        let step = timeframe.duration();
        let first_open = self.last_open(timeframe) - step * limit.saturating_sub(1) as i32;

        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let open = price;
            let close = (open * (1.0 + returns.sample(&mut rng))).max(0.01);
            let high = open.max(close) * (1.0 + wicks.sample(&mut rng).abs());
            let low = open.min(close) * (1.0 - wicks.sample(&mut rng).abs().min(0.5));
            let spike = if rng.gen::<f64>() < 0.05 { 3.0 } else { 1.0 };
            let volume = base_volume * volume_noise.sample(&mut rng).exp() * spike;

            candles.push(Candle {
                timestamp: first_open + step * i as i32,
                open,
                high,
                low,
                close,
                volume,
            });
            price = close;
        }

        Ok(candles)
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(0.01)
    }
}

/// FNV-1a over the symbol and interval string
fn seed_for(symbol: &str, timeframe: Timeframe) -> u64 {
    symbol
        .to_uppercase()
        .bytes()
        .chain(std::iter::once(b'/'))
        .chain(timeframe.as_str().bytes())
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
        })
}

#[async_trait]
impl CandleProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>> {
        self.generate(symbol, timeframe, limit)
    }
}
