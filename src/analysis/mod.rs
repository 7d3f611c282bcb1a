//! Analysis pipeline: indicators, detectors, aggregation and scoring
//!
//! Everything here is a pure function over candle slices and immutable
//! config. Fetching and per-scan state live in `scanner`.

pub mod confluence;
pub mod indicators;
pub mod market_structure;
pub mod mtf;
pub mod opportunity;
pub mod smc;
pub mod volume;

pub use confluence::{ConfluenceConfig, ConfluenceFactor, ConfluenceScore, Confidence, Grade};
pub use indicators::{atr, ema, rsi, IndicatorSnapshot};
pub use market_structure::{analyze_structure, MarketStructure, StructureConfig, StructureTrend};
pub use mtf::{MtfConfig, MtfResult, Recommendation, TimeframeReport};
pub use opportunity::{Candidate, Opportunity, OpportunityConfig, WatchlistEntry};
pub use smc::{detect_patterns, PatternConfig, SmcPatterns};
pub use volume::{analyze_volume, VolumeConfig, VolumeSignal};
