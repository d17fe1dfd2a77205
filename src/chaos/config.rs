//! ChaosEngine-FX configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::market::DEFAULT_IO_TIMEOUT;
use crate::types::Timeframe;

/// Everything the scan-execute cycle needs, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    /// Instrument universe, OANDA spelling (e.g. "EUR_USD")
    pub instruments: Vec<String>,

    /// Only the first `max_pairs` instruments are scanned
    pub max_pairs: usize,

    /// Background loop cadence
    pub loop_interval: Duration,

    /// Equity fraction risked per trade (0.01 = 1%)
    pub risk_per_trade: f64,

    /// Fractional daily drawdown that halts new entries
    pub max_drawdown_per_day: f64,

    /// Base cap on concurrently open trades
    pub max_open_trades: usize,

    /// Raised cap while portfolio risk stays under `max_portfolio_risk`
    pub max_open_trades_extended: usize,

    /// Ceiling on aggregate open risk as a fraction of equity
    pub max_portfolio_risk: f64,

    /// Losing closes in a row that trip the kill switch
    pub consecutive_loss_limit: usize,

    /// Volatility floor: some instrument must score at least this
    pub min_volatility_score: f64,

    /// Score at `min_volatility_score * extreme_volatility_multiplier` is extreme
    pub extreme_volatility_multiplier: f64,

    /// Score at `min_volatility_score * preferred_volatility_multiplier` earns the preferred RR
    pub preferred_volatility_multiplier: f64,

    /// Max orders attempted per cycle. Candidates stopped by a gate don't
    /// count, so a lower-ranked candidate can trade when higher ones are gated.
    pub top_k: usize,

    /// Minimum confidence to trade a non-flat signal
    pub min_confidence: f64,

    /// Trading session, UTC hours, half-open
    pub session_start_hour: u32,
    pub session_end_hour: u32,

    /// Size multiplier when trading outside session on extreme volatility
    pub surge_size_factor: f64,

    /// Current ATR must exceed this multiple of its rolling mean
    pub atr_expansion_multiplier: f64,

    pub sl_atr_multiplier: f64,
    pub tp_atr_multiplier: f64,

    /// Take-profit distance never exceeds this many ATRs
    pub max_tp_atr_multiplier: f64,

    pub rr_min: f64,
    pub rr_preferred: f64,
    pub rr_max: f64,

    /// Static SL/TP floors in pips
    pub default_sl_pips: f64,
    pub default_tp_pips: f64,

    /// Executed trades kept for the dashboard
    pub recent_trades_limit: usize,

    /// Run summaries kept in memory
    pub run_history_limit: usize,

    /// Currency whose directional stacking is limited
    pub anchor_currency: String,

    /// Existing same-direction positions on the anchor that block another
    pub max_same_direction_exposure: usize,

    pub granularity: Timeframe,
    pub candle_count: usize,

    pub ma_fast: usize,
    pub ma_slow: usize,
    pub atr_period: usize,

    /// Window of the ATR mean used as the volatility baseline
    pub atr_mean_period: usize,

    /// Bars over which the fast MA slope is measured
    pub slope_bars: usize,

    /// Consolidation channel length, excluding the last two bars
    pub breakout_lookback: usize,

    /// Bars scanned for a pin bar's local extreme
    pub pattern_lookback: usize,

    /// Bound on each provider/sink call
    pub io_timeout: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            instruments: ["EUR_USD", "GBP_USD", "USD_JPY", "XAU_USD", "AUD_USD", "USD_CHF"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_pairs: 6,
            loop_interval: Duration::from_secs(60),
            risk_per_trade: 0.01,
            max_drawdown_per_day: 0.03,
            max_open_trades: 2,
            max_open_trades_extended: 3,
            max_portfolio_risk: 0.04,
            consecutive_loss_limit: 3,
            min_volatility_score: 1.0,
            extreme_volatility_multiplier: 2.0,
            preferred_volatility_multiplier: 1.5,
            top_k: 2,
            min_confidence: 2.0,
            session_start_hour: 7,
            session_end_hour: 20,
            surge_size_factor: 0.5,
            atr_expansion_multiplier: 1.1,
            sl_atr_multiplier: 1.5,
            tp_atr_multiplier: 3.0,
            max_tp_atr_multiplier: 6.0,
            rr_min: 2.0,
            rr_preferred: 3.0,
            rr_max: 4.0,
            default_sl_pips: 15.0,
            default_tp_pips: 30.0,
            recent_trades_limit: 20,
            run_history_limit: 100,
            anchor_currency: "USD".to_string(),
            max_same_direction_exposure: 2,
            granularity: Timeframe::M1,
            candle_count: 200,
            ma_fast: 10,
            ma_slow: 30,
            atr_period: 14,
            atr_mean_period: 50,
            slope_bars: 5,
            breakout_lookback: 20,
            pattern_lookback: 10,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl ChaosConfig {
    /// Instruments actually scanned each cycle
    pub fn scanned_instruments(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().take(self.max_pairs).map(|s| s.as_str())
    }

    /// Bars needed before every indicator is defined on the last bar
    pub fn min_bars(&self) -> usize {
        (self.atr_period + self.atr_mean_period)
            .max(self.ma_slow + self.slope_bars)
            .max(self.breakout_lookback + 2)
            .max(self.pattern_lookback)
    }

    /// Volatility score at or above which surge mode may override the session
    pub fn extreme_score(&self) -> f64 {
        self.min_volatility_score * self.extreme_volatility_multiplier
    }

    /// Target RR for a given volatility score
    pub fn target_rr(&self, volatility_score: f64) -> f64 {
        if volatility_score >= self.extreme_score() {
            self.rr_max
        } else if volatility_score >= self.min_volatility_score * self.preferred_volatility_multiplier {
            self.rr_preferred
        } else {
            self.rr_min
        }
    }

    /// Scan one instrument only
    pub fn single_instrument(instrument: &str) -> Self {
        Self {
            instruments: vec![instrument.to_string()],
            max_pairs: 1,
            ..Self::default()
        }
    }
}
