//! ChaosEngine-FX: multi-instrument volatility scanner
//!
//! Ranks trend-continuation breakouts by opportunity score and executes the
//! best few through portfolio-level risk gates.

pub mod config;
pub mod engine;
pub mod strategy;

pub use config::ChaosConfig;
pub use engine::{ChaosEngine, CycleReason, RunSummary, SkipReason, SkippedCandidate, TradeAction};
pub use strategy::{evaluate, ChaosSignal, Decision, FlatReason, PatternKind, TradeSetup};
