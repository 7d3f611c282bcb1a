//! Binance spot klines over REST

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::CandleProvider;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{Candle, Timeframe};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Exchange cap on candles per klines request
pub const MAX_LIMIT: usize = 1000;

pub struct BinanceProvider {
    client: Client,
    base_url: String,
}

impl BinanceProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> AnalysisResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CandleProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> AnalysisResult<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        debug!("GET klines {} {} limit={}", symbol, timeframe, limit);

        let fail = |reason: String| AnalysisError::fetch(symbol, timeframe, reason);

        let response = self
            .client
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&[
                ("symbol", symbol.to_uppercase()),
                ("interval", timeframe.as_str().to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!("status {}: {}", status, body)));
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid klines payload: {}", e)))?;

        parse_klines(&rows).map_err(fail)
    }
}

/// Parse the klines array-of-arrays payload.
///
/// Row layout: `[open_time_ms, "open", "high", "low", "close", "volume", ...]`.
pub fn parse_klines(rows: &[Value]) -> Result<Vec<Candle>, String> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_row(row).ok_or_else(|| format!("malformed kline at row {}", i)))
        .collect()
}

fn parse_row(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    if fields.len() < 6 {
        return None;
    }
    let number = |v: &Value| -> Option<f64> {
        match v {
            Value::String(s) => s.parse().ok(),
            other => other.as_f64(),
        }
    };

    Some(Candle {
        timestamp: Utc.timestamp_millis_opt(fields[0].as_i64()?).single()?,
        open: number(&fields[1])?,
        high: number(&fields[2])?,
        low: number(&fields[3])?,
        close: number(&fields[4])?,
        volume: number(&fields[5])?,
    })
}
