//! Volume spike / interest classification

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::Candle;

/// Configuration for volume analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Trailing candles averaged for the baseline (current candle excluded)
    pub lookback: usize,
    /// volume / average above this is a spike
    pub spike_threshold: f64,
    /// volume / average below this is "no interest"
    pub low_volume_ratio: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            spike_threshold: 1.5,
            low_volume_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSignalKind {
    BullishSpike,
    BearishSpike,
    LowVolume,
    Neutral,
}

impl std::fmt::Display for VolumeSignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeSignalKind::BullishSpike => write!(f, "bullish spike"),
            VolumeSignalKind::BearishSpike => write!(f, "bearish spike"),
            VolumeSignalKind::LowVolume => write!(f, "low volume"),
            VolumeSignalKind::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeSignal {
    pub current_volume: f64,
    pub avg_volume: f64,
    pub volume_ratio: f64,
    pub price_change_pct: f64,
    pub signal: VolumeSignalKind,
    /// 0-100
    pub strength: f64,
    pub is_spike: bool,
}

/// Strength assigned to a low-volume reading
const LOW_VOLUME_STRENGTH: f64 = 20.0;

/// Classify the latest candle's volume against its trailing average
pub fn analyze_volume(candles: &[Candle], config: &VolumeConfig) -> AnalysisResult<VolumeSignal> {
    let required = config.lookback + 1;
    if config.lookback == 0 || candles.len() < required {
        return Err(AnalysisError::insufficient(required, candles.len()));
    }

    let n = candles.len();
    let current = &candles[n - 1];
    let previous = &candles[n - 2];
    let window = &candles[n - 1 - config.lookback..n - 1];

    let avg_volume = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    let volume_ratio = if avg_volume > 0.0 {
        current.volume / avg_volume
    } else {
        0.0
    };
    let price_change_pct = if previous.close != 0.0 {
        (current.close - previous.close) / previous.close * 100.0
    } else {
        0.0
    };

    let is_spike = volume_ratio > config.spike_threshold;
    let spike_strength = (volume_ratio * 20.0).min(100.0);

    let (signal, strength) = if is_spike && price_change_pct > 0.0 {
        (VolumeSignalKind::BullishSpike, spike_strength)
    } else if is_spike && price_change_pct < 0.0 {
        (VolumeSignalKind::BearishSpike, spike_strength)
    } else if volume_ratio < config.low_volume_ratio {
        (VolumeSignalKind::LowVolume, LOW_VOLUME_STRENGTH)
    } else {
        (VolumeSignalKind::Neutral, spike_strength)
    };

    Ok(VolumeSignal {
        current_volume: current.volume,
        avg_volume,
        volume_ratio,
        price_change_pct,
        signal,
        strength,
        is_spike,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::from_closes;

    fn series(last_volume: f64, last_close: f64) -> Vec<Candle> {
        let mut closes = vec![100.0; 21];
        closes.push(last_close);
        let mut candles = from_closes(&closes);
        // Excluded from the 20-candle average
        candles[0].volume = 10_000.0;
        candles.last_mut().unwrap().volume = last_volume;
        candles
    }

    #[test]
    fn test_bullish_spike() {
        let signal = analyze_volume(&series(300.0, 102.0), &VolumeConfig::default()).unwrap();
        assert_eq!(signal.avg_volume, 100.0);
        assert_eq!(signal.volume_ratio, 3.0);
        assert_eq!(signal.signal, VolumeSignalKind::BullishSpike);
        assert_eq!(signal.strength, 60.0);
        assert!(signal.is_spike);
        assert!((signal.price_change_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearish_spike_strength_capped() {
        let signal = analyze_volume(&series(800.0, 98.0), &VolumeConfig::default()).unwrap();
        assert_eq!(signal.signal, VolumeSignalKind::BearishSpike);
        assert_eq!(signal.strength, 100.0);
    }

    #[test]
    fn test_low_volume() {
        let signal = analyze_volume(&series(40.0, 101.0), &VolumeConfig::default()).unwrap();
        assert_eq!(signal.signal, VolumeSignalKind::LowVolume);
        assert_eq!(signal.strength, 20.0);
        assert!(!signal.is_spike);
    }

    #[test]
    fn test_spike_without_price_move_is_neutral() {
        let signal = analyze_volume(&series(300.0, 100.0), &VolumeConfig::default()).unwrap();
        assert_eq!(signal.signal, VolumeSignalKind::Neutral);
        assert!(signal.is_spike);
    }

    #[test]
    fn test_insufficient_history() {
        let candles = from_closes(&[100.0; 10]);
        assert!(matches!(
            analyze_volume(&candles, &VolumeConfig::default()),
            Err(AnalysisError::InsufficientData { required: 21, actual: 10 })
        ));
    }
}
