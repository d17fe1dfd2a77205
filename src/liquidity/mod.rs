//! Liquidity sweep engine
//!
//! Multi-timeframe: 4H/1H swing structure sets the bias, the 5m window
//! supplies liquidity levels, the sweep bar and the break of structure.

pub mod config;
pub mod levels;
pub mod strategy;
pub mod sweep;
pub mod tick;

pub use config::{AlignmentPolicy, LiquidityConfig, PairConfig};
pub use levels::{build_liquidity_levels, LevelKind, LiquidityLevel};
pub use strategy::{evaluate_pair, generate_signals};
pub use sweep::{confirm_bos, detect_sweep, SweepResult};
pub use tick::{ExecutedOrder, PlannedOrder, TickConfig, TickEngine, TickResult};
