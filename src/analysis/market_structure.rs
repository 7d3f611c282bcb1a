//! Market Structure Detection
//!
//! Finds swing highs/lows over a 5-candle window and classifies the series
//! as an uptrend (higher highs + higher lows), a downtrend (lower highs +
//! lower lows) or ranging.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Neighbours required on each side of a swing point
pub const SWING_WINDOW: usize = 2;

/// Minimum series length for swing detection
pub const MIN_STRUCTURE_CANDLES: usize = SWING_WINDOW * 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingType {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    #[serde(rename = "type")]
    pub swing_type: SwingType,
    pub index: usize,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureTrend {
    Uptrend,
    Downtrend,
    Ranging,
}

impl StructureTrend {
    pub fn is_trending(&self) -> bool {
        !matches!(self, StructureTrend::Ranging)
    }
}

impl std::fmt::Display for StructureTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureTrend::Uptrend => write!(f, "uptrend"),
            StructureTrend::Downtrend => write!(f, "downtrend"),
            StructureTrend::Ranging => write!(f, "ranging"),
        }
    }
}

/// Configuration for trend classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Higher-high/higher-low (or lower-high/lower-low) pairs needed to call a trend
    pub min_confirmations: u32,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self { min_confirmations: 2 }
    }
}

/// Derived market structure; recomputed on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend: StructureTrend,
    pub higher_highs: u32,
    pub higher_lows: u32,
    pub lower_highs: u32,
    pub lower_lows: u32,
    pub swing_points: Vec<SwingPoint>,
}

fn is_extreme(values: &[f64], idx: usize, beats: impl Fn(f64, f64) -> bool) -> bool {
    let candidate = values[idx];
    (1..=SWING_WINDOW).all(|k| beats(candidate, values[idx - k]) && beats(candidate, values[idx + k]))
}

/// Detect swing points. The first and last two candles are never classified.
///
/// High and low checks run independently per index, ordered by index.
pub fn detect_swing_points(highs: &[f64], lows: &[f64]) -> Vec<SwingPoint> {
    let len = highs.len().min(lows.len());
    if len < MIN_STRUCTURE_CANDLES {
        return Vec::new();
    }

    let mut points = Vec::new();
    for i in SWING_WINDOW..len - SWING_WINDOW {
        if is_extreme(highs, i, |a, b| a > b) {
            points.push(SwingPoint {
                swing_type: SwingType::High,
                index: i,
                price: highs[i],
            });
        }
        if is_extreme(lows, i, |a, b| a < b) {
            points.push(SwingPoint {
                swing_type: SwingType::Low,
                index: i,
                price: lows[i],
            });
        }
    }

    points
}

/// Count (rising, falling) consecutive pairs in a price sequence
fn count_pairs(prices: &[f64]) -> (u32, u32) {
    prices.windows(2).fold((0, 0), |(up, down), w| {
        if w[1] > w[0] {
            (up + 1, down)
        } else if w[1] < w[0] {
            (up, down + 1)
        } else {
            (up, down)
        }
    })
}

/// Analyze swing structure of a high/low series
pub fn analyze_structure(
    highs: &[f64],
    lows: &[f64],
    config: &StructureConfig,
) -> AnalysisResult<MarketStructure> {
    let len = highs.len().min(lows.len());
    if len < MIN_STRUCTURE_CANDLES {
        return Err(AnalysisError::insufficient(MIN_STRUCTURE_CANDLES, len));
    }

    let swing_points = detect_swing_points(highs, lows);

    let high_prices: Vec<f64> = swing_points
        .iter()
        .filter(|p| p.swing_type == SwingType::High)
        .map(|p| p.price)
        .collect();
    let low_prices: Vec<f64> = swing_points
        .iter()
        .filter(|p| p.swing_type == SwingType::Low)
        .map(|p| p.price)
        .collect();

    let (higher_highs, lower_highs) = count_pairs(&high_prices);
    let (higher_lows, lower_lows) = count_pairs(&low_prices);

    let needed = config.min_confirmations;
    let trend = if higher_highs >= needed && higher_lows >= needed {
        StructureTrend::Uptrend
    } else if lower_highs >= needed && lower_lows >= needed {
        StructureTrend::Downtrend
    } else {
        StructureTrend::Ranging
    };

    Ok(MarketStructure {
        trend,
        higher_highs,
        higher_lows,
        lower_highs,
        lower_lows,
        swing_points,
    })
}
