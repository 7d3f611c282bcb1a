//! Trade lifecycle simulation
//!
//! Each opportunity is replayed candle by candle through a small state
//! machine:
//! 1. AWAITING_ENTRY - wait for a candle whose range contains the entry price
//! 2. IN_POSITION - stop loss first, then targets from the highest index down
//! 3. CLOSED - terminal; a trade still open when candles run out is closed
//!    at the last close as TIMEOUT
//!
//! Exits are evaluated from the candle after the entry candle onwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::metrics::PerformanceMetrics;
use crate::analysis::Opportunity;
use crate::data::CandleProvider;
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{Candle, Direction, Timeframe};

/// Order in which closed trades are applied to the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOrdering {
    /// Order of the opportunity list
    #[default]
    InputOrder,
    /// Chronological by entry time across symbols
    EntryTime,
}

/// Configuration for the backtester
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting capital (default: 10,000)
    pub initial_capital: f64,
    /// Fraction of capital committed per trade (default: 0.1)
    pub position_size: f64,
    /// Slippage per side, percent (default: 0.05)
    pub slippage_pct: f64,
    /// Commission per side, percent (default: 0.1)
    pub commission_pct: f64,
    pub ordering: TradeOrdering,
    /// Candle granularity replayed by `run_with_provider` (default: 1h)
    pub timeframe: Timeframe,
    /// Candles fetched per symbol by `run_with_provider` (default: 500)
    pub candle_limit: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size: 0.1,
            slippage_pct: 0.05,
            commission_pct: 0.1,
            ordering: TradeOrdering::InputOrder,
            timeframe: Timeframe::H1,
            candle_limit: 500,
        }
    }
}

impl BacktestConfig {
    /// Round-trip cost in percentage points
    pub fn round_trip_cost_pct(&self) -> f64 {
        (self.slippage_pct + self.commission_pct) * 2.0
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if !(self.initial_capital > 0.0) {
            return Err(AnalysisError::Config(
                "backtest.initial_capital must be positive".into(),
            ));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(AnalysisError::Config(
                "backtest.position_size must be in (0, 1]".into(),
            ));
        }
        if self.slippage_pct < 0.0 || self.commission_pct < 0.0 {
            return Err(AnalysisError::Config(
                "backtest costs must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Why a trade closed. Serialized as `STOP_LOSS`, `TP1`.., `TIMEOUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExitReason {
    StopLoss,
    /// 1-based target number
    TakeProfit(usize),
    Timeout,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TakeProfit(n) => write!(f, "TP{}", n),
            ExitReason::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP_LOSS" => Ok(ExitReason::StopLoss),
            "TIMEOUT" => Ok(ExitReason::Timeout),
            other => other
                .strip_prefix("TP")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(ExitReason::TakeProfit)
                .ok_or_else(|| format!("unknown exit reason '{}'", other)),
        }
    }
}

impl Serialize for ExitReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExitReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// State of a single simulated trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    AwaitingEntry,
    InPosition,
    Closed(ExitReason),
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeState::AwaitingEntry => write!(f, "AWAITING_ENTRY"),
            TradeState::InPosition => write!(f, "IN_POSITION"),
            TradeState::Closed(reason) => write!(f, "{}", reason),
        }
    }
}

/// Fill and exit of a simulated trade, before costs and sizing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeExit {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub reason: ExitReason,
}

/// State machine replaying one opportunity
pub struct TradeSimulation<'a> {
    opportunity: &'a Opportunity,
    state: TradeState,
    entry_time: Option<DateTime<Utc>>,
    exit: Option<TradeExit>,
    last_candle: Option<Candle>,
}

impl<'a> TradeSimulation<'a> {
    pub fn new(opportunity: &'a Opportunity) -> Self {
        Self {
            opportunity,
            state: TradeState::AwaitingEntry,
            entry_time: None,
            exit: None,
            last_candle: None,
        }
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    /// Advance by one candle and return the resulting state
    pub fn process_candle(&mut self, candle: &Candle) -> TradeState {
        match self.state {
            TradeState::AwaitingEntry => {
                if candle.contains(self.opportunity.entry_price) {
                    debug!(
                        "{} entry filled at {} ({})",
                        self.opportunity.symbol, self.opportunity.entry_price, candle.timestamp
                    );
                    self.entry_time = Some(candle.timestamp);
                    self.state = TradeState::InPosition;
                }
            }
            TradeState::InPosition => {
                if let Some((reason, price)) = self.check_exit(candle) {
                    self.close(candle.timestamp, price, reason);
                }
            }
            TradeState::Closed(_) => {}
        }
        self.last_candle = Some(*candle);
        self.state
    }

    fn check_exit(&self, candle: &Candle) -> Option<(ExitReason, f64)> {
        let opp = self.opportunity;
        let stop_hit = match opp.direction {
            Direction::Long => candle.low <= opp.stop_loss,
            Direction::Short => candle.high >= opp.stop_loss,
        };
        if stop_hit {
            return Some((ExitReason::StopLoss, opp.stop_loss));
        }

        // Most ambitious target first: a wide candle credits the best target reached
        opp.targets
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &target)| match opp.direction {
                Direction::Long => candle.high >= target,
                Direction::Short => candle.low <= target,
            })
            .map(|(i, &target)| (ExitReason::TakeProfit(i + 1), target))
    }

    fn close(&mut self, time: DateTime<Utc>, price: f64, reason: ExitReason) {
        if let Some(entry_time) = self.entry_time {
            self.exit = Some(TradeExit {
                entry_time,
                exit_time: time,
                exit_price: price,
                reason,
            });
            self.state = TradeState::Closed(reason);
        }
    }

    /// End of data. Open positions close at the last close as TIMEOUT;
    /// returns `None` if the entry was never filled.
    pub fn finish(mut self) -> Option<TradeExit> {
        if self.state == TradeState::InPosition {
            if let Some(last) = self.last_candle {
                self.close(last.timestamp, last.close, ExitReason::Timeout);
            }
        }
        self.exit
    }
}

/// Replay one opportunity over candles at or after its creation time
pub fn simulate(opportunity: &Opportunity, candles: &[Candle]) -> Option<TradeExit> {
    let mut sim = TradeSimulation::new(opportunity);
    for candle in candles
        .iter()
        .filter(|c| c.timestamp >= opportunity.created_at)
    {
        if let TradeState::Closed(_) = sim.process_candle(candle) {
            break;
        }
    }
    sim.finish()
}

/// Directional move in percent, net of round-trip costs
pub fn net_pnl_pct(direction: Direction, entry: f64, exit: f64, cost_pct: f64) -> f64 {
    let gross = match direction {
        Direction::Long => (exit - entry) / entry * 100.0,
        Direction::Short => (entry - exit) / entry * 100.0,
    };
    gross - cost_pct
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub opportunity_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Net of slippage and commission, in percent
    pub pnl_pct: f64,
    /// Currency P&L on the sized position
    pub pnl: f64,
    pub duration_hours: f64,
}

impl SimulatedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl_pct < 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub config: BacktestConfig,
    pub trades: Vec<SimulatedTrade>,
    /// Capital after each trade, starting with the initial capital
    pub equity_curve: Vec<f64>,
    pub metrics: PerformanceMetrics,
    /// Invalid or unreadable opportunities that were not simulated
    pub skipped: usize,
    /// Entry price never reached
    pub unfilled: usize,
    /// No candles available for the symbol
    pub missing_data: usize,
}

pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    /// Simulate every opportunity against the candles of its symbol
    pub fn run(
        &self,
        opportunities: &[Opportunity],
        candles: &HashMap<String, Vec<Candle>>,
    ) -> BacktestRun {
        let mut skipped = 0;
        let mut unfilled = 0;
        let mut missing_data = 0;
        let mut fills: Vec<(&Opportunity, TradeExit)> = Vec::new();

        for opp in opportunities {
            if let Err(e) = opp.validate() {
                warn!("Skipping {}: {}", opp.symbol, e);
                skipped += 1;
                continue;
            }
            let Some(series) = candles.get(&opp.symbol) else {
                warn!("No candles for {}, skipping opportunity {}", opp.symbol, opp.id);
                missing_data += 1;
                continue;
            };
            match simulate(opp, series) {
                Some(exit) => fills.push((opp, exit)),
                None => unfilled += 1,
            }
        }

        if self.config.ordering == TradeOrdering::EntryTime {
            fills.sort_by_key(|(_, exit)| exit.entry_time);
        }

        let cost = self.config.round_trip_cost_pct();
        let mut capital = self.config.initial_capital;
        let mut equity_curve = Vec::with_capacity(fills.len() + 1);
        equity_curve.push(capital);
        let mut trades = Vec::with_capacity(fills.len());

        for (opp, exit) in fills {
            let pnl_pct = net_pnl_pct(opp.direction, opp.entry_price, exit.exit_price, cost);
            let pnl = self.config.position_size * capital * pnl_pct / 100.0;
            capital += pnl;
            equity_curve.push(capital);

            trades.push(SimulatedTrade {
                opportunity_id: opp.id,
                symbol: opp.symbol.clone(),
                direction: opp.direction,
                entry_price: opp.entry_price,
                stop_loss: opp.stop_loss,
                targets: opp.targets.clone(),
                entry_time: exit.entry_time,
                exit_time: exit.exit_time,
                exit_price: exit.exit_price,
                exit_reason: exit.reason,
                pnl_pct,
                pnl,
                duration_hours: (exit.exit_time - exit.entry_time).num_seconds() as f64 / 3600.0,
            });
        }

        let metrics =
            PerformanceMetrics::from_trades(&trades, &equity_curve, self.config.initial_capital);
        info!(
            "Backtest: {} trades, {:.1}% win rate, {:.2}% return ({} skipped, {} unfilled)",
            metrics.total_trades, metrics.win_rate, metrics.total_return_pct, skipped, unfilled
        );

        BacktestRun {
            config: self.config.clone(),
            trades,
            equity_curve,
            metrics,
            skipped,
            unfilled,
            missing_data,
        }
    }

    /// Fetch candles per symbol, then run. A failed fetch only drops that
    /// symbol's opportunities.
    pub async fn run_with_provider(
        &self,
        opportunities: &[Opportunity],
        provider: &dyn CandleProvider,
    ) -> BacktestRun {
        let mut candles = HashMap::new();
        for opp in opportunities {
            if candles.contains_key(&opp.symbol) {
                continue;
            }
            match provider
                .get_candles(&opp.symbol, self.config.timeframe, self.config.candle_limit)
                .await
            {
                Ok(series) => {
                    candles.insert(opp.symbol.clone(), series);
                }
                Err(e) => warn!("{}", e),
            }
        }
        self.run(opportunities, &candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ConfluenceScore, IndicatorSnapshot, Recommendation};
    use crate::data::test_support::{FailingProvider, FixedProvider};
    use crate::types::test_support::{candles, t0};
    use crate::types::Trend;
    use chrono::Duration;

    fn opportunity(direction: Direction, entry: f64, stop: f64, targets: &[f64]) -> Opportunity {
        Opportunity {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            trend: match direction {
                Direction::Long => Trend::Bullish,
                Direction::Short => Trend::Bearish,
            },
            direction,
            entry_price: entry,
            stop_loss: stop,
            targets: targets.to_vec(),
            confluence: ConfluenceScore::zero(),
            indicators: IndicatorSnapshot::default(),
            recommendation: Recommendation::Buy,
            created_at: t0(),
        }
    }

    fn long_100() -> Opportunity {
        opportunity(Direction::Long, 100.0, 95.0, &[110.0, 120.0, 130.0])
    }

    #[test]
    fn test_wide_candle_credits_highest_target_reached() {
        let series = candles(&[
            (101.0, 102.0, 99.5, 100.5),
            (100.5, 125.0, 100.0, 124.0),
        ]);
        let exit = simulate(&long_100(), &series).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit(2));
        assert_eq!(exit.exit_price, 120.0);
        assert_eq!(exit.reason.to_string(), "TP2");
    }

    #[test]
    fn test_stop_takes_precedence_over_target() {
        let series = candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 131.0, 94.0, 100.0),
        ]);
        let exit = simulate(&long_100(), &series).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.exit_price, 95.0);
    }

    #[test]
    fn test_timeout_exits_at_last_close() {
        let series = candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 105.0, 97.0, 103.0),
            (103.0, 106.0, 101.0, 104.5),
        ]);
        let exit = simulate(&long_100(), &series).unwrap();
        assert_eq!(exit.reason, ExitReason::Timeout);
        assert_eq!(exit.exit_price, 104.5);
        assert_eq!(exit.exit_time, t0() + Duration::hours(2));
    }

    #[test]
    fn test_short_trade_lifecycle() {
        let opp = opportunity(Direction::Short, 100.0, 105.0, &[95.0, 90.0]);
        let series = candles(&[
            (99.0, 100.5, 98.0, 99.0),
            (99.0, 99.5, 94.0, 95.0),
        ]);
        let exit = simulate(&opp, &series).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit(1));
        assert_eq!(exit.exit_price, 95.0);
    }

    #[test]
    fn test_state_transitions() {
        let opp = long_100();
        let mut sim = TradeSimulation::new(&opp);
        assert_eq!(sim.state(), TradeState::AwaitingEntry);
        let series = candles(&[
            (105.0, 106.0, 104.0, 105.0),
            (104.0, 104.0, 99.0, 101.0),
            (101.0, 111.0, 100.0, 110.0),
            (110.0, 140.0, 90.0, 100.0),
        ]);
        assert_eq!(sim.process_candle(&series[0]), TradeState::AwaitingEntry);
        assert_eq!(sim.process_candle(&series[1]), TradeState::InPosition);
        assert_eq!(
            sim.process_candle(&series[2]),
            TradeState::Closed(ExitReason::TakeProfit(1))
        );
        // Terminal: later candles do not change the exit
        assert_eq!(
            sim.process_candle(&series[3]),
            TradeState::Closed(ExitReason::TakeProfit(1))
        );
        assert_eq!(sim.state().to_string(), "TP1");
        let exit = sim.finish().unwrap();
        assert_eq!(exit.exit_price, 110.0);
        assert_eq!(exit.exit_time, t0() + Duration::hours(2));
    }

    #[test]
    fn test_candles_before_creation_ignored() {
        let mut opp = long_100();
        opp.created_at = t0() + Duration::hours(1);
        // Only the first candle touches the entry
        let series = candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (102.0, 104.0, 101.0, 103.0),
        ]);
        assert!(simulate(&opp, &series).is_none());
    }

    #[test]
    fn test_exit_reason_serde() {
        let json = serde_json::to_string(&ExitReason::TakeProfit(3)).unwrap();
        assert_eq!(json, "\"TP3\"");
        let back: ExitReason = serde_json::from_str("\"STOP_LOSS\"").unwrap();
        assert_eq!(back, ExitReason::StopLoss);
        assert!("TP0".parse::<ExitReason>().is_err());
    }

    #[test]
    fn test_pnl_net_of_costs() {
        // 0.05 slippage + 0.1 commission, both sides
        let cost = BacktestConfig::default().round_trip_cost_pct();
        assert!((cost - 0.3).abs() < 1e-12);
        assert!((net_pnl_pct(Direction::Long, 100.0, 120.0, cost) - 19.7).abs() < 1e-9);
        assert!((net_pnl_pct(Direction::Short, 100.0, 105.0, cost) + 5.3).abs() < 1e-9);
    }

    #[test]
    fn test_run_accumulates_equity_and_counts() {
        let win = long_100();
        let mut unfilled = long_100();
        unfilled.entry_price = 200.0;
        unfilled.stop_loss = 190.0;
        unfilled.targets = vec![210.0];
        let mut invalid = long_100();
        invalid.targets.clear();
        let mut unknown = long_100();
        unknown.symbol = "DOGEUSDT".to_string();

        let series = candles(&[
            (101.0, 102.0, 99.5, 100.5),
            (100.5, 125.0, 100.0, 124.0),
        ]);
        let data = HashMap::from([("BTCUSDT".to_string(), series)]);

        let run = Backtester::new(BacktestConfig::default())
            .run(&[win, unfilled, invalid, unknown], &data);

        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.skipped, 1);
        assert_eq!(run.unfilled, 1);
        assert_eq!(run.missing_data, 1);

        let trade = &run.trades[0];
        assert!((trade.pnl_pct - 19.7).abs() < 1e-9);
        assert!((trade.pnl - 197.0).abs() < 1e-6);
        assert_eq!(trade.duration_hours, 1.0);
        assert_eq!(run.equity_curve.len(), 2);
        assert_eq!(run.equity_curve[0], 10_000.0);
        assert!((run.equity_curve[1] - 10_197.0).abs() < 1e-6);
    }

    #[test]
    fn test_entry_time_ordering() {
        let mut late = long_100();
        late.symbol = "ETHUSDT".to_string();
        let early = long_100();

        let btc = candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 111.0, 100.0, 110.0),
        ]);
        let eth = candles(&[
            (90.0, 91.0, 89.0, 90.0),
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 100.0, 94.0, 95.0),
        ]);
        let data = HashMap::from([("BTCUSDT".to_string(), btc), ("ETHUSDT".to_string(), eth)]);
        let opportunities = [late, early];

        let input = Backtester::new(BacktestConfig::default()).run(&opportunities, &data);
        assert_eq!(input.trades[0].symbol, "ETHUSDT");

        let config = BacktestConfig {
            ordering: TradeOrdering::EntryTime,
            ..Default::default()
        };
        let chrono_run = Backtester::new(config).run(&opportunities, &data);
        assert_eq!(chrono_run.trades[0].symbol, "BTCUSDT");
        assert_eq!(chrono_run.trades[1].exit_reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn test_run_with_provider() {
        let series = candles(&[
            (101.0, 102.0, 99.5, 100.5),
            (100.5, 125.0, 100.0, 124.0),
        ]);
        let provider = FixedProvider {
            series: HashMap::from([(("BTCUSDT".to_string(), Timeframe::H1), series)]),
        };
        let run = Backtester::new(BacktestConfig::default())
            .run_with_provider(&[long_100()], &provider)
            .await;
        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].exit_reason, ExitReason::TakeProfit(2));

        let failed = Backtester::new(BacktestConfig::default())
            .run_with_provider(&[long_100()], &FailingProvider)
            .await;
        assert!(failed.trades.is_empty());
        assert_eq!(failed.missing_data, 1);
        assert_eq!(failed.equity_curve, vec![10_000.0]);
    }
}
