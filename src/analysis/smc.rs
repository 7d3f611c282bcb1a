//! Smart-money pattern detection
//!
//! - Order blocks: the candle before a sharp (>1%) close-to-close move
//! - Fair value gaps: 3-candle gaps the middle candle never filled
//! - Liquidity zones: clusters of highs (sell-side) or lows (buy-side)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Candle, Trend};

/// Configuration for pattern detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Close-to-close move (percent) that marks the prior candle as an order block
    pub order_block_move_pct: f64,
    /// Relative distance (percent) for merging prices into one liquidity cluster
    pub liquidity_tolerance_pct: f64,
    /// Members required for a cluster to count
    pub min_cluster_size: usize,
    /// Clusters kept per side
    pub max_zones: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            order_block_move_pct: 1.0,
            liquidity_tolerance_pct: 0.5,
            min_cluster_size: 3,
            max_zones: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    /// Index of the tagged candle (the one before the move)
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: Trend,
    pub high: f64,
    pub low: f64,
    /// Size of the following move, in percent
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    /// Index of the candle completing the pattern
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub direction: Trend,
    pub top: f64,
    pub bottom: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquiditySide {
    /// Clustered highs, resting buy stops above
    SellSide,
    /// Clustered lows, resting sell stops below
    BuySide,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub price: f64,
    pub count: usize,
    pub side: LiquiditySide,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmcPatterns {
    pub order_blocks: Vec<OrderBlock>,
    pub fair_value_gaps: Vec<FairValueGap>,
    pub liquidity_zones: Vec<LiquidityZone>,
}

/// Tag candles preceding a close-to-close move larger than the threshold
pub fn find_order_blocks(candles: &[Candle], config: &PatternConfig) -> Vec<OrderBlock> {
    let n = candles.len();
    let threshold = config.order_block_move_pct / 100.0;
    let mut blocks = Vec::new();

    // i - 1 is tagged; the final candle is still forming and never confirms a move
    for i in 3..n.saturating_sub(1) {
        let prev_close = candles[i - 1].close;
        if prev_close == 0.0 {
            continue;
        }
        let change = (candles[i].close - prev_close) / prev_close;
        if change.abs() > threshold {
            let tagged = &candles[i - 1];
            blocks.push(OrderBlock {
                index: i - 1,
                timestamp: tagged.timestamp,
                direction: if change > 0.0 { Trend::Bullish } else { Trend::Bearish },
                high: tagged.high,
                low: tagged.low,
                strength: change.abs() * 100.0,
            });
        }
    }

    blocks
}

/// Find 3-candle gaps. Bullish and bearish checks are independent per index.
pub fn find_fair_value_gaps(candles: &[Candle]) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();

    for i in 2..candles.len() {
        let first = &candles[i - 2];
        let third = &candles[i];

        if third.low > first.high {
            gaps.push(FairValueGap {
                index: i,
                timestamp: third.timestamp,
                direction: Trend::Bullish,
                top: third.low,
                bottom: first.high,
                size: third.low - first.high,
            });
        }
        if third.high < first.low {
            gaps.push(FairValueGap {
                index: i,
                timestamp: third.timestamp,
                direction: Trend::Bearish,
                top: first.low,
                bottom: third.high,
                size: first.low - third.high,
            });
        }
    }

    gaps
}

/// Greedy price clustering.
///
/// Prices are sorted ascending and merged into the running cluster while
/// within `tolerance_pct` of its mean. Returns qualifying clusters as
/// (mean price, member count), largest first, at most `max_zones`.
pub fn cluster_levels(
    prices: &[f64],
    tolerance_pct: f64,
    min_members: usize,
    max_zones: usize,
) -> Vec<(f64, usize)> {
    let mut sorted: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let tolerance = tolerance_pct / 100.0;
    let mut clusters: Vec<(f64, usize)> = Vec::new();
    let mut current: Option<(f64, usize)> = None;

    for price in sorted {
        current = match current {
            Some((mean, count)) if mean != 0.0 && ((price - mean) / mean).abs() <= tolerance => {
                let count = count + 1;
                Some((mean + (price - mean) / count as f64, count))
            }
            Some(done) => {
                clusters.push(done);
                Some((price, 1))
            }
            None => Some((price, 1)),
        };
    }
    clusters.extend(current);

    clusters.retain(|&(_, count)| count >= min_members);
    // Stable: equal counts keep ascending price order
    clusters.sort_by(|a, b| b.1.cmp(&a.1));
    clusters.truncate(max_zones);
    clusters
}

/// Sell-side zones from highs followed by buy-side zones from lows
pub fn find_liquidity_zones(candles: &[Candle], config: &PatternConfig) -> Vec<LiquidityZone> {
    let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();

    let zones = |prices: &[f64], side| {
        cluster_levels(
            prices,
            config.liquidity_tolerance_pct,
            config.min_cluster_size,
            config.max_zones,
        )
        .into_iter()
        .map(move |(price, count)| LiquidityZone { price, count, side })
    };

    zones(&highs, LiquiditySide::SellSide)
        .chain(zones(&lows, LiquiditySide::BuySide))
        .collect()
}

/// Run every detector over one series
pub fn detect_patterns(candles: &[Candle], config: &PatternConfig) -> SmcPatterns {
    SmcPatterns {
        order_blocks: find_order_blocks(candles, config),
        fair_value_gaps: find_fair_value_gaps(candles),
        liquidity_zones: find_liquidity_zones(candles, config),
    }
}
