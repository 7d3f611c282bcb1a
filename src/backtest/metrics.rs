//! Performance statistics over a completed backtest

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use super::simulator::SimulatedTrade;

/// Trading days per year for Sharpe annualization
const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    /// Gross win % / gross loss %; `Infinity` when nothing lost
    #[serde(
        serialize_with = "serialize_profit_factor",
        deserialize_with = "deserialize_profit_factor"
    )]
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline of the equity curve, percent
    pub max_drawdown_pct: f64,
    pub total_pnl: f64,
    pub avg_pnl_pct: f64,
    pub avg_win_pct: f64,
    /// Positive magnitude
    pub avg_loss_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub avg_duration_hours: f64,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return_pct: f64,
    pub exit_reasons: BTreeMap<String, usize>,
}

impl PerformanceMetrics {
    pub fn from_trades(
        trades: &[SimulatedTrade],
        equity_curve: &[f64],
        initial_capital: f64,
    ) -> Self {
        let final_capital = equity_curve.last().copied().unwrap_or(initial_capital);
        let mut metrics = Self {
            initial_capital,
            final_capital,
            total_return_pct: if initial_capital > 0.0 {
                (final_capital - initial_capital) / initial_capital * 100.0
            } else {
                0.0
            },
            max_drawdown_pct: max_drawdown_pct(equity_curve),
            ..Default::default()
        };
        if trades.is_empty() {
            return metrics;
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let n = trades.len() as f64;

        let mut gross_win = 0.0;
        let mut gross_loss = 0.0;
        for trade in trades {
            if trade.is_win() {
                metrics.wins += 1;
                gross_win += trade.pnl_pct;
            } else if trade.is_loss() {
                metrics.losses += 1;
                gross_loss += trade.pnl_pct.abs();
            }
            metrics.total_pnl += trade.pnl;
            *metrics
                .exit_reasons
                .entry(trade.exit_reason.to_string())
                .or_insert(0) += 1;
        }

        metrics.total_trades = trades.len();
        metrics.win_rate = metrics.wins as f64 / n * 100.0;
        metrics.avg_win_pct = if metrics.wins > 0 {
            gross_win / metrics.wins as f64
        } else {
            0.0
        };
        metrics.avg_loss_pct = if metrics.losses > 0 {
            gross_loss / metrics.losses as f64
        } else {
            0.0
        };
        metrics.profit_factor = profit_factor(gross_win, gross_loss, metrics.wins);
        metrics.sharpe_ratio = sharpe_ratio(&returns);
        metrics.avg_pnl_pct = returns.iter().sum::<f64>() / n;
        metrics.best_trade_pct = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        metrics.worst_trade_pct = returns.iter().copied().fold(f64::INFINITY, f64::min);
        metrics.avg_duration_hours = trades.iter().map(|t| t.duration_hours).sum::<f64>() / n;

        metrics
    }
}

/// Infinite with wins and no losses, zero without wins
pub fn profit_factor(gross_win: f64, gross_loss: f64, wins: usize) -> f64 {
    if wins == 0 {
        0.0
    } else if gross_loss > 0.0 {
        gross_win / gross_loss
    } else {
        f64::INFINITY
    }
}

/// Annualized Sharpe over per-trade returns, population std dev.
/// A zero std dev is replaced by 1.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let std_dev = if std_dev > 0.0 { std_dev } else { 1.0 };
    mean / std_dev * TRADING_DAYS.sqrt()
}

/// Largest relative decline from a running peak, percent
pub fn max_drawdown_pct(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0;

    for &value in equity_curve {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let drawdown = (peak - value) / peak * 100.0;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    max_drawdown
}

fn serialize_profit_factor<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_infinite() && value.is_sign_positive() {
        serializer.serialize_str("Infinity")
    } else {
        serializer.serialize_f64(*value)
    }
}

fn deserialize_profit_factor<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(v) => Ok(v),
        Raw::Text(s) if s == "Infinity" => Ok(f64::INFINITY),
        Raw::Text(s) => Err(serde::de::Error::custom(format!(
            "invalid profit factor '{}'",
            s
        ))),
    }
}

/// Print the metrics table
pub fn print_metrics(metrics: &PerformanceMetrics) {
    println!("Performance:");
    println!("  Total Trades:    {}", metrics.total_trades);
    println!(
        "  Wins / Losses:   {} / {}",
        metrics.wins, metrics.losses
    );
    println!("  Win Rate:        {:.1}%", metrics.win_rate);
    if metrics.profit_factor.is_infinite() {
        println!("  Profit Factor:   ∞");
    } else {
        println!("  Profit Factor:   {:.2}", metrics.profit_factor);
    }
    println!("  Sharpe Ratio:    {:.2}", metrics.sharpe_ratio);
    println!("  Max Drawdown:    {:.2}%", metrics.max_drawdown_pct);
    println!();
    println!("  Avg Trade:       {:+.2}%", metrics.avg_pnl_pct);
    println!("  Avg Win:         {:+.2}%", metrics.avg_win_pct);
    println!("  Avg Loss:        {:.2}%", -metrics.avg_loss_pct);
    println!("  Best / Worst:    {:+.2}% / {:+.2}%", metrics.best_trade_pct, metrics.worst_trade_pct);
    println!("  Avg Duration:    {:.1}h", metrics.avg_duration_hours);
    println!();
    println!(
        "  Capital:         {:.2} -> {:.2} ({:+.2}%)",
        metrics.initial_capital, metrics.final_capital, metrics.total_return_pct
    );
    println!("  Total P&L:       {:+.2}", metrics.total_pnl);

    if !metrics.exit_reasons.is_empty() {
        println!();
        println!("Exit Reasons:");
        for (reason, count) in &metrics.exit_reasons {
            println!("  {:<10} {}", reason, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::simulator::ExitReason;
    use crate::types::test_support::t0;
    use crate::types::Direction;
    use uuid::Uuid;

    fn trade(pnl_pct: f64, reason: ExitReason) -> SimulatedTrade {
        SimulatedTrade {
            opportunity_id: Uuid::nil(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            stop_loss: 95.0,
            targets: vec![110.0],
            entry_time: t0(),
            exit_time: t0(),
            exit_price: 100.0,
            exit_reason: reason,
            pnl_pct,
            pnl: pnl_pct * 10.0,
            duration_hours: 2.0,
        }
    }

    #[test]
    fn test_empty_trades() {
        let m = PerformanceMetrics::from_trades(&[], &[10_000.0], 10_000.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.final_capital, 10_000.0);
    }

    #[test]
    fn test_profit_factor_infinite_without_losses() {
        let trades = vec![
            trade(5.0, ExitReason::TakeProfit(1)),
            trade(3.0, ExitReason::TakeProfit(2)),
        ];
        let m = PerformanceMetrics::from_trades(&trades, &[100.0, 105.0, 108.0], 100.0);
        assert!(m.profit_factor.is_infinite());
        assert_eq!(m.win_rate, 100.0);

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["profit_factor"], "Infinity");
        let back: PerformanceMetrics = serde_json::from_value(json).unwrap();
        assert!(back.profit_factor.is_infinite());
    }

    #[test]
    fn test_profit_factor_zero_without_wins() {
        let trades = vec![trade(-2.0, ExitReason::StopLoss)];
        let m = PerformanceMetrics::from_trades(&trades, &[100.0, 98.0], 100.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.losses, 1);
        assert_eq!(m.avg_loss_pct, 2.0);
    }

    #[test]
    fn test_mixed_trades() {
        let trades = vec![
            trade(6.0, ExitReason::TakeProfit(3)),
            trade(-2.0, ExitReason::StopLoss),
            trade(-1.0, ExitReason::Timeout),
            trade(0.0, ExitReason::Timeout),
        ];
        let m = PerformanceMetrics::from_trades(&trades, &[100.0, 106.0, 104.0, 103.0, 103.0], 100.0);

        assert_eq!(m.wins, 1);
        assert_eq!(m.losses, 2);
        assert_eq!(m.win_rate, 25.0);
        assert_eq!(m.profit_factor, 2.0);
        assert_eq!(m.best_trade_pct, 6.0);
        assert_eq!(m.worst_trade_pct, -2.0);
        assert_eq!(m.avg_pnl_pct, 0.75);
        assert_eq!(m.exit_reasons["TIMEOUT"], 2);
        assert_eq!(m.exit_reasons["TP3"], 1);
        assert!((m.total_return_pct - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_uses_unit_floor_for_identical_returns() {
        let sharpe = sharpe_ratio(&[2.0, 2.0, 2.0]);
        assert!((sharpe - 2.0 * 252f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_population_std() {
        // mean 2, population std 1
        let sharpe = sharpe_ratio(&[1.0, 3.0]);
        assert!((sharpe - 2.0 * 252f64.sqrt()).abs() < 1e-9);
        assert_eq!(sharpe_ratio(&[]), 0.0);
    }

    #[test]
    fn test_max_drawdown_relative_to_running_peak() {
        let curve = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert!((max_drawdown_pct(&curve) - 25.0).abs() < 1e-9);
        assert_eq!(max_drawdown_pct(&[100.0, 110.0, 120.0]), 0.0);
    }
}
