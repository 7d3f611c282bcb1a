//! Shared market data types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One OHLCV candle. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// True if `price` lies inside this candle's [low, high] range
    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Column views over a candle slice, in the shape the indicator functions take
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

pub fn highs(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.high).collect()
}

pub fn lows(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.low).collect()
}

/// Apply a streaming candle update to a series.
///
/// An update with the same timestamp as the last candle replaces it (the
/// candle is still forming), a newer timestamp appends. Older updates are
/// dropped so the series stays strictly increasing. Returns whether the
/// series changed.
pub fn apply_candle_update(series: &mut Vec<Candle>, update: Candle) -> bool {
    match series.last_mut() {
        Some(last) if last.timestamp == update.timestamp => {
            *last = update;
            true
        }
        Some(last) if last.timestamp > update.timestamp => false,
        _ => {
            series.push(update);
            true
        }
    }
}

/// Candle granularity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    #[default]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    /// Interval string used by exchange kline endpoints
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }

    /// The five timeframes aggregated by default
    pub fn default_set() -> Vec<Timeframe> {
        vec![
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
            Timeframe::W1,
        ]
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            "1w" => Ok(Timeframe::W1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// Directional bias of a timeframe, a symbol or a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Trade direction implied by this bias
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Trend::Bullish => Some(Direction::Long),
            Trend::Bearish => Some(Direction::Short),
            Trend::Neutral => None,
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_timeframe_parse_roundtrip() {
        for tf in Timeframe::default_set() {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_candle_update_replaces_forming_candle() {
        let mut series = from_closes(&[100.0, 101.0, 102.0]);
        let mut update = *series.last().unwrap();
        update.close = 105.0;
        update.high = 105.5;

        assert!(apply_candle_update(&mut series, update));
        assert_eq!(series.len(), 3);
        assert_eq!(series[2].close, 105.0);
    }

    #[test]
    fn test_candle_update_appends_and_ignores_stale() {
        let mut series = from_closes(&[100.0, 101.0]);
        let mut newer = series[1];
        newer.timestamp = newer.timestamp + Duration::hours(1);
        assert!(apply_candle_update(&mut series, newer));
        assert_eq!(series.len(), 3);

        let stale = series[0];
        assert!(!apply_candle_update(&mut series, stale));
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_trend_direction() {
        assert_eq!(Trend::Bullish.direction(), Some(Direction::Long));
        assert_eq!(Trend::Bearish.direction(), Some(Direction::Short));
        assert_eq!(Trend::Neutral.direction(), None);
    }
}
