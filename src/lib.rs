// Library crate - analysis pipeline, data providers, scanner and backtester

pub mod analysis;
pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod scanner;
pub mod types;

// Re-export commonly used types
pub use config::ScannerConfig;
pub use error::{AnalysisError, AnalysisResult};
pub use scanner::{ScanEvent, ScanReport, Scanner};
pub use types::*;
