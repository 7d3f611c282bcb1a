//! Opportunity backtesting
//!
//! Replays stored opportunities against historical candles, independent of
//! the scoring pipeline, and reports trade-level and aggregate performance.

pub mod metrics;
pub mod report;
pub mod simulator;

pub use metrics::PerformanceMetrics;
pub use simulator::{
    simulate, BacktestConfig, BacktestRun, Backtester, ExitReason, SimulatedTrade, TradeOrdering,
    TradeSimulation, TradeState,
};
