//! Per-pair configuration for the liquidity sweep strategy

use serde::{Deserialize, Serialize};

use crate::types::Timeframe;

/// How the secondary (1H) bias is combined with the primary (4H) bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Secondary bias must equal primary, otherwise no trade
    RequireSecondary,
    /// Primary bias alone decides; secondary conflict is ignored
    PrimaryOnly,
}

/// Static per-instrument thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub symbol: String,
    /// Spread ceiling in pips
    pub max_spread_pips: f64,
    /// Minimum sweep wick as a fraction of bar range
    pub min_wick_ratio: f64,
    /// RR when an equal-highs/lows cluster was swept
    pub rr_default: f64,
    /// RR when a previous-day high/low was swept
    pub rr_premium: f64,
    pub alignment: AlignmentPolicy,
}

impl PairConfig {
    pub fn eurgbp() -> Self {
        Self {
            symbol: "EURGBP".to_string(),
            max_spread_pips: 2.5,
            min_wick_ratio: 0.35,
            rr_default: 2.0,
            rr_premium: 2.5,
            alignment: AlignmentPolicy::RequireSecondary,
        }
    }

    /// Gold wicks aggressively, so the wick bar is lower and 4H alone sets bias
    pub fn xauusd() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            max_spread_pips: 35.0,
            min_wick_ratio: 0.30,
            rr_default: 2.5,
            rr_premium: 3.0,
            alignment: AlignmentPolicy::PrimaryOnly,
        }
    }

    pub fn gbpcad() -> Self {
        Self {
            symbol: "GBPCAD".to_string(),
            max_spread_pips: 4.0,
            min_wick_ratio: 0.35,
            rr_default: 2.0,
            rr_premium: 2.5,
            alignment: AlignmentPolicy::RequireSecondary,
        }
    }
}

/// Strategy-wide parameters shared by all pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityConfig {
    pub pairs: Vec<PairConfig>,
    pub primary_timeframe: Timeframe,
    pub secondary_timeframe: Timeframe,
    pub entry_timeframe: Timeframe,
    /// Candles requested per higher timeframe
    pub htf_limit: usize,
    /// Candles requested on the entry timeframe
    pub entry_limit: usize,
    /// Minimum bars on each higher timeframe
    pub min_htf_bars: usize,
    /// Minimum bars on the entry timeframe
    pub min_entry_bars: usize,
    /// Fractal lookback for swing detection
    pub swing_lookback: usize,
    /// Equal-level tolerance as a fraction of average bar range
    pub cluster_ratio: f64,
    /// Trailing entry bars searched for a sweep, newest first (1 = last bar only)
    pub sweep_window: usize,
    /// Bars before the sweep that define the minor structure level
    pub bos_lookback: usize,
    /// Stop buffer beyond the sweep wick, in pips
    pub stop_buffer_pips: f64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            pairs: vec![PairConfig::eurgbp(), PairConfig::xauusd(), PairConfig::gbpcad()],
            primary_timeframe: Timeframe::H4,
            secondary_timeframe: Timeframe::H1,
            entry_timeframe: Timeframe::M5,
            htf_limit: 150,
            entry_limit: 200,
            min_htf_bars: 30,
            min_entry_bars: 50,
            swing_lookback: 2,
            cluster_ratio: 0.20,
            sweep_window: 6,
            bos_lookback: 3,
            stop_buffer_pips: 3.0,
        }
    }
}

impl LiquidityConfig {
    pub fn pair(&self, symbol: &str) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| p.symbol == symbol)
    }
}
