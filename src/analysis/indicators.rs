//! Technical indicators over plain price series
//!
//! Pure functions: no I/O, no state, same input gives the same output.

use serde::{Deserialize, Serialize};

use crate::types::{self, Candle};

/// Default RSI / ATR period
pub const DEFAULT_PERIOD: usize = 14;

/// Exponential Moving Average.
///
/// Multiplier `2 / (period + 1)`, seeded with the first value, so the output
/// has the same length as the input and is defined from index 0.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };

    let multiplier = 2.0 / (period.max(1) as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    let mut prev = seed;
    result.push(prev);

    for &price in &values[1..] {
        prev = (price - prev) * multiplier + prev;
        result.push(prev);
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Relative Strength Index with Wilder smoothing.
///
/// Averages are seeded with the mean gain/loss of the first `period`
/// differences; one value is emitted per smoothing step after that, giving
/// `len - period - 1` values. A zero average loss yields exactly 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period + 2 {
        return Vec::new();
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let mut avg_gain = changes[..period].iter().map(|&c| c.max(0.0)).sum::<f64>() / period_f;
    let mut avg_loss = changes[..period].iter().map(|&c| (-c).max(0.0)).sum::<f64>() / period_f;

    let mut result = Vec::with_capacity(changes.len() - period);
    for &change in &changes[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + change.max(0.0)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + (-change).max(0.0)) / period_f;
        result.push(rsi_from_averages(avg_gain, avg_loss).clamp(0.0, 100.0));
    }

    result
}

/// Average True Range with Wilder smoothing.
///
/// True range starts at the second candle (it needs a previous close). The
/// first output is the mean of the first `period` true ranges.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let len = highs.len().min(lows.len()).min(closes.len());
    if period == 0 || len < period + 1 {
        return Vec::new();
    }

    let true_ranges: Vec<f64> = (1..len)
        .map(|i| {
            let prev_close = closes[i - 1];
            (highs[i] - lows[i])
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect();

    let period_f = period as f64;
    let mut current = true_ranges[..period].iter().sum::<f64>() / period_f;
    let mut result = Vec::with_capacity(true_ranges.len() - period + 1);
    result.push(current);

    for &tr in &true_ranges[period..] {
        current = (current * (period_f - 1.0) + tr) / period_f;
        result.push(current);
    }

    result
}

/// Latest indicator readings for one series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub last_close: f64,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl IndicatorSnapshot {
    /// Compute the snapshot from a candle series. Fields that need more
    /// history than is available are left empty.
    pub fn from_candles(candles: &[Candle]) -> Self {
        let closes = types::closes(candles);
        let Some(&last_close) = closes.last() else {
            return Self::default();
        };

        let ema20 = if closes.len() >= 20 { ema(&closes, 20).last().copied() } else { None };
        let ema50 = if closes.len() >= 50 { ema(&closes, 50).last().copied() } else { None };

        Self {
            last_close,
            ema20,
            ema50,
            rsi14: rsi(&closes, DEFAULT_PERIOD).last().copied(),
            atr14: atr(
                &types::highs(candles),
                &types::lows(candles),
                &closes,
                DEFAULT_PERIOD,
            )
            .last()
            .copied(),
            volume_ratio: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ema_length_and_seed() {
        let values = [10.0, 11.0, 12.0, 13.0, 14.0];
        let result = ema(&values, 3);
        assert_eq!(result.len(), values.len());
        assert_eq!(result[0], 10.0);
        // (11 - 10) * 0.5 + 10
        assert!((result[1] - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_ema_constant_series() {
        let values = vec![42.0; 30];
        assert!(ema(&values, 10).iter().all(|&v| (v - 42.0).abs() < 1e-12));
    }

    #[test]
    fn test_ema_empty() {
        assert!(ema(&[], 20).is_empty());
    }

    #[test]
    fn test_rsi_output_length() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + (i % 3) as f64).collect();
        assert_eq!(rsi(&values, 14).len(), 30 - 14 - 1);
        assert!(rsi(&values[..15], 14).is_empty());
    }

    #[test]
    fn test_rsi_monotonic_increase_is_100() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&values, 14);
        assert!(!result.is_empty());
        assert!(result.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_rsi_decline_after_stable_period() {
        let mut values = vec![100.0; 20];
        values.extend((1..=20).map(|i| 100.0 - i as f64));
        let result = rsi(&values, 14);

        let tail = &result[result.len() - 20..];
        assert!(tail.windows(2).all(|w| w[1] <= w[0]));
        assert!(*tail.last().unwrap() < 1.0);
        assert!(result.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_atr_known_values() {
        // Every candle spans 2.0 with no gaps
        let highs = vec![11.0; 20];
        let lows = vec![9.0; 20];
        let closes = vec![10.0; 20];
        let result = atr(&highs, &lows, &closes, 14);
        assert_eq!(result.len(), 19 - 14 + 1);
        assert!(result.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_atr_uses_gap_from_previous_close() {
        let highs = [10.0, 15.0, 15.0];
        let lows = [9.0, 14.0, 14.0];
        let closes = [9.5, 14.5, 14.5];
        // TR1 = max(1, |15 - 9.5|, |14 - 9.5|) = 5.5, TR2 = 1
        let result = atr(&highs, &lows, &closes, 2);
        assert_eq!(result, vec![3.25]);
    }

    #[test]
    fn test_snapshot_short_series() {
        let candles = crate::types::test_support::from_closes(&[100.0, 101.0, 102.0]);
        let snap = IndicatorSnapshot::from_candles(&candles);
        assert_eq!(snap.last_close, 102.0);
        assert!(snap.ema20.is_none());
        assert!(snap.rsi14.is_none());
    }

    proptest! {
        #[test]
        fn prop_rsi_in_range(values in proptest::collection::vec(1.0f64..10_000.0, 16..200)) {
            for v in rsi(&values, 14) {
                prop_assert!((0.0..=100.0).contains(&v));
            }
        }

        #[test]
        fn prop_ema_same_length(values in proptest::collection::vec(-1e6f64..1e6, 0..200), period in 1usize..60) {
            prop_assert_eq!(ema(&values, period).len(), values.len());
        }

        #[test]
        fn prop_atr_non_negative(
            bars in proptest::collection::vec((1.0f64..1000.0, 0.0f64..50.0, 0.0f64..1.0), 15..120)
        ) {
            let lows: Vec<f64> = bars.iter().map(|b| b.0).collect();
            let highs: Vec<f64> = bars.iter().map(|b| b.0 + b.1).collect();
            let closes: Vec<f64> = bars.iter().map(|b| b.0 + b.1 * b.2).collect();
            for v in atr(&highs, &lows, &closes, 14) {
                prop_assert!(v >= 0.0);
            }
        }
    }
}
