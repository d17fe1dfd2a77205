//! Volatility/pattern strategy for ChaosEngine-FX
//!
//! Trend-continuation only. A candidate must pass, in order:
//! 1. ATR expansion: ATR(14) above `atr_expansion_multiplier` x its 50-bar mean
//! 2. Trend: fast/slow MA relationship with a fast-MA slope in the same direction
//! 3. Breakout: last close beyond the channel of bars `[n-22, n-2)`
//! 4. Pattern: engulfing or pin bar on the trend side
//! 5. RR: the volatility-tiered target survives the ATR reachability cap
//!
//! The first failing filter becomes the FLAT reason.

use serde::{Deserialize, Serialize};

use super::config::ChaosConfig;
use crate::indicators::{atr, last_value, rolling_mean_opt, sma_close};
use crate::market::pip_factor;
use crate::types::{Candle, Side};

/// Confidence credit for trading with the MA trend
const TREND_WEIGHT: f64 = 0.5;

/// Volatility contribution to confidence is capped here
const MAX_VOLATILITY_CONFIDENCE: f64 = 2.0;

/// Why an instrument produced no trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatReason {
    InsufficientData,
    AtrNotExpanded,
    NoTrend,
    NoBreakout,
    NoPattern,
    RrBelowMinimum,
    /// Candles could not be fetched this cycle
    DataUnavailable,
}

impl FlatReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlatReason::InsufficientData => "insufficient_data",
            FlatReason::AtrNotExpanded => "atr_not_expanded",
            FlatReason::NoTrend => "no_trend",
            FlatReason::NoBreakout => "no_breakout",
            FlatReason::NoPattern => "no_pattern",
            FlatReason::RrBelowMinimum => "rr_below_minimum",
            FlatReason::DataUnavailable => "data_unavailable",
        }
    }
}

impl std::fmt::Display for FlatReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirming candlestick pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Engulfing,
    PinBar,
}

impl PatternKind {
    pub fn weight(&self) -> f64 {
        match self {
            PatternKind::Engulfing => 1.0,
            PatternKind::PinBar => 0.8,
        }
    }
}

/// A tradeable setup with its stop and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Realized reward:risk after the reachability cap
    pub rr: f64,
    pub pattern: PatternKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Trade(TradeSetup),
    Flat { reason: FlatReason },
}

/// Per-instrument analysis for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosSignal {
    pub instrument: String,
    pub decision: Decision,
    /// ATR over its rolling mean. None until enough history exists.
    pub volatility_score: Option<f64>,
    pub atr: Option<f64>,
    pub confidence: f64,
    /// Ranking key across instruments
    pub opportunity: f64,
}

impl ChaosSignal {
    pub fn flat(instrument: &str, reason: FlatReason) -> Self {
        Self {
            instrument: instrument.to_string(),
            decision: Decision::Flat { reason },
            volatility_score: None,
            atr: None,
            confidence: 0.0,
            opportunity: 0.0,
        }
    }

    pub fn setup(&self) -> Option<&TradeSetup> {
        match &self.decision {
            Decision::Trade(setup) => Some(setup),
            Decision::Flat { .. } => None,
        }
    }

    pub fn flat_reason(&self) -> Option<FlatReason> {
        match &self.decision {
            Decision::Flat { reason } => Some(*reason),
            Decision::Trade(_) => None,
        }
    }
}

/// Bullish engulfing for longs, bearish for shorts.
///
/// The last body must open at or beyond the prior close, close at or beyond
/// the prior open, and be strictly larger.
pub fn is_engulfing(prev: &Candle, last: &Candle, side: Side) -> bool {
    if last.body() <= prev.body() {
        return false;
    }
    match side {
        Side::Long => {
            prev.is_bearish()
                && last.is_bullish()
                && last.open <= prev.close
                && last.close >= prev.open
        }
        Side::Short => {
            prev.is_bullish()
                && last.is_bearish()
                && last.open >= prev.close
                && last.close <= prev.open
        }
    }
}

/// Rejection wick of at least twice the body reaching the local extreme,
/// with the close in the signal-side half of the bar.
pub fn is_pin_bar(candles: &[Candle], side: Side, lookback: usize) -> bool {
    let Some(last) = candles.last() else {
        return false;
    };
    let range = last.range();
    if range <= 0.0 {
        return false;
    }
    let window = &candles[candles.len().saturating_sub(lookback.max(1))..];
    let near = 0.1 * range;
    let mid = last.low + range / 2.0;

    match side {
        Side::Long => {
            let local_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            last.lower_wick() >= 2.0 * last.body() && last.low <= local_low + near && last.close >= mid
        }
        Side::Short => {
            let local_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            last.upper_wick() >= 2.0 * last.body() && last.high >= local_high - near && last.close <= mid
        }
    }
}

pub fn detect_pattern(candles: &[Candle], side: Side, lookback: usize) -> Option<PatternKind> {
    if candles.len() < 2 {
        return None;
    }
    let last = &candles[candles.len() - 1];
    let prev = &candles[candles.len() - 2];

    if is_engulfing(prev, last, side) {
        Some(PatternKind::Engulfing)
    } else if is_pin_bar(candles, side, lookback) {
        Some(PatternKind::PinBar)
    } else {
        None
    }
}

/// Stop and target distances in price units, and the realized RR
pub fn stop_and_target(
    instrument: &str,
    atr: f64,
    volatility_score: f64,
    config: &ChaosConfig,
) -> (f64, f64, f64) {
    let pip = pip_factor(instrument);
    let sl_dist = (config.default_sl_pips * pip).max(atr * config.sl_atr_multiplier);
    let target_rr = config.target_rr(volatility_score);

    let tp_dist = (config.default_tp_pips * pip)
        .max(atr * config.tp_atr_multiplier)
        .max(sl_dist * target_rr)
        .min(atr * config.max_tp_atr_multiplier);

    (sl_dist, tp_dist, tp_dist / sl_dist)
}

/// Analyze one instrument's candles
pub fn evaluate(instrument: &str, candles: &[Candle], config: &ChaosConfig) -> ChaosSignal {
    let n = candles.len();
    if n < config.min_bars() || n <= config.slope_bars {
        return ChaosSignal::flat(instrument, FlatReason::InsufficientData);
    }

    let atr_series = atr(candles, config.atr_period);
    let atr_now = last_value(&atr_series);
    let atr_mean = last_value(&rolling_mean_opt(&atr_series, config.atr_mean_period));
    let fast = sma_close(candles, config.ma_fast);
    let slow = sma_close(candles, config.ma_slow);
    let fast_now = last_value(&fast);
    let fast_before = fast[n - 1 - config.slope_bars];
    let slow_now = last_value(&slow);

    let (Some(atr_now), Some(atr_mean), Some(fast_now), Some(fast_before), Some(slow_now)) =
        (atr_now, atr_mean, fast_now, fast_before, slow_now)
    else {
        return ChaosSignal::flat(instrument, FlatReason::InsufficientData);
    };
    if atr_now <= 0.0 || atr_mean <= 0.0 {
        return ChaosSignal::flat(instrument, FlatReason::InsufficientData);
    }

    let score = atr_now / atr_mean;
    let separation = (fast_now - slow_now).abs() / atr_now;

    let flat = |reason: FlatReason| ChaosSignal {
        instrument: instrument.to_string(),
        decision: Decision::Flat { reason },
        volatility_score: Some(score),
        atr: Some(atr_now),
        confidence: 0.0,
        opportunity: 0.5 * score + 0.2 * separation,
    };

    if score <= config.atr_expansion_multiplier {
        return flat(FlatReason::AtrNotExpanded);
    }

    let side = if fast_now > slow_now && fast_now > fast_before {
        Side::Long
    } else if fast_now < slow_now && fast_now < fast_before {
        Side::Short
    } else {
        return flat(FlatReason::NoTrend);
    };

    let last = &candles[n - 1];
    let channel = &candles[n - config.breakout_lookback - 2..n - 2];
    let broke_out = match side {
        Side::Long => {
            let top = channel.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            last.close > top
        }
        Side::Short => {
            let bottom = channel.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            last.close < bottom
        }
    };
    if !broke_out {
        return flat(FlatReason::NoBreakout);
    }

    let Some(pattern) = detect_pattern(candles, side, config.pattern_lookback) else {
        return flat(FlatReason::NoPattern);
    };

    let (sl_dist, tp_dist, rr) = stop_and_target(instrument, atr_now, score, config);
    if rr + 1e-9 < config.rr_min {
        return flat(FlatReason::RrBelowMinimum);
    }

    let entry = last.close;
    let sign = side.sign();
    ChaosSignal {
        instrument: instrument.to_string(),
        decision: Decision::Trade(TradeSetup {
            side,
            entry,
            stop_loss: entry - sign * sl_dist,
            take_profit: entry + sign * tp_dist,
            rr,
            pattern,
        }),
        volatility_score: Some(score),
        atr: Some(atr_now),
        confidence: score.min(MAX_VOLATILITY_CONFIDENCE) + pattern.weight() + TREND_WEIGHT,
        opportunity: 0.5 * score + 0.3 * pattern.weight() + 0.2 * separation,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic one-minute series for the ChaosFX tests

    use chrono::{Duration, TimeZone, Utc};

    use crate::types::Candle;

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2025, 6, 4, 8, 0, 0).unwrap();
        Candle::new(start + Duration::minutes(i as i64), open, high, low, close)
    }

    /// Slow grind up, eight expanding bars, a red bar, then a bullish engulfing
    /// close above the channel. Volatility score ends near 2.9.
    pub fn breakout() -> Vec<Candle> {
        let mut bars = Vec::with_capacity(120);
        let mut p = 1.1000;
        for i in 0..110 {
            bars.push(bar(i, p, p + 0.0002, p - 0.0001, p + 0.0001));
            p += 0.0001;
        }
        for i in 110..118 {
            bars.push(bar(i, p, p + 0.0009, p - 0.0006, p + 0.0003));
            p += 0.0003;
        }
        bars.push(bar(118, p, p + 0.0001, p - 0.0005, p - 0.0004));
        bars.push(bar(119, p - 0.0005, p + 0.0013, p - 0.0007, p + 0.0012));
        bars
    }

    /// Alternating two-pip bars with an engulfing finish. Score about 1.03.
    pub fn quiet() -> Vec<Candle> {
        let mut bars: Vec<Candle> = (0..120)
            .map(|i| {
                if i % 2 == 0 {
                    bar(i, 1.1000, 1.1003, 1.0999, 1.1002)
                } else {
                    bar(i, 1.1002, 1.1003, 1.0999, 1.1000)
                }
            })
            .collect();
        bars.push(bar(120, 1.0999, 1.1004, 1.0998, 1.1003));
        bars
    }

    /// Ranges halve over the last 20 bars, so the score drops below 1
    pub fn contracting() -> Vec<Candle> {
        (0..120)
            .map(|i| {
                let pad = if i < 100 { 0.0003 } else { 0.0001 };
                let (open, close) = if i % 2 == 0 {
                    (1.1000, 1.1002)
                } else {
                    (1.1002, 1.1000)
                };
                bar(i, open, 1.1002 + pad, 1.1000 - pad, close)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2025, 6, 4, 8, 0, 0).unwrap();
        Candle::new(ts, open, high, low, close)
    }

    #[test]
    fn test_breakout_with_engulfing_trades_long() {
        let config = ChaosConfig::default();
        let signal = evaluate("EUR_USD", &breakout(), &config);

        let setup = signal.setup().expect("expected a trade");
        assert_eq!(setup.side, Side::Long);
        assert_eq!(setup.pattern, PatternKind::Engulfing);
        assert!(setup.stop_loss < setup.entry && setup.take_profit > setup.entry);
        assert!(setup.rr >= config.rr_min);

        let score = signal.volatility_score.unwrap();
        assert!(score > 2.5 && score < 3.2, "score {}", score);
        // Extreme volatility: capped volatility credit + engulfing + trend
        assert!((signal.confidence - 3.5).abs() < 1e-9);
        assert!(signal.opportunity > 0.5 * score);
    }

    #[test]
    fn test_quiet_market_flat_on_atr_even_with_pattern() {
        let candles = quiet();
        let n = candles.len();
        assert!(is_engulfing(&candles[n - 2], &candles[n - 1], Side::Long));

        let signal = evaluate("EUR_USD", &candles, &ChaosConfig::default());
        assert_eq!(signal.flat_reason(), Some(FlatReason::AtrNotExpanded));
        let score = signal.volatility_score.unwrap();
        assert!(score > 1.0 && score < 1.1);
    }

    #[test]
    fn test_wide_static_stop_fails_rr_floor() {
        let config = ChaosConfig {
            default_sl_pips: 60.0,
            ..ChaosConfig::default()
        };
        let signal = evaluate("EUR_USD", &breakout(), &config);
        assert_eq!(signal.flat_reason(), Some(FlatReason::RrBelowMinimum));
    }

    #[test]
    fn test_insufficient_history() {
        let candles = breakout();
        let signal = evaluate("EUR_USD", &candles[..60], &ChaosConfig::default());
        assert_eq!(signal.flat_reason(), Some(FlatReason::InsufficientData));
        assert_eq!(signal.volatility_score, None);
    }

    #[test]
    fn test_contracting_score_below_one() {
        let signal = evaluate("EUR_USD", &contracting(), &ChaosConfig::default());
        assert!(signal.volatility_score.unwrap() < 1.0);
        assert_eq!(signal.flat_reason(), Some(FlatReason::AtrNotExpanded));
    }

    #[test]
    fn test_no_breakout_when_close_inside_channel() {
        let mut candles = breakout();
        let n = candles.len();
        // Pull the engulfing close back under the channel top
        let top = candles[n - 3].high;
        candles[n - 1].close = top - 0.0001;
        candles[n - 1].high = top;

        let signal = evaluate("EUR_USD", &candles, &ChaosConfig::default());
        assert_eq!(signal.flat_reason(), Some(FlatReason::NoBreakout));
    }

    #[test]
    fn test_engulfing_requires_opposite_colour_and_bigger_body() {
        let red = bar(1.1004, 1.1005, 1.0999, 1.1000);
        let green = bar(1.0999, 1.1007, 1.0998, 1.1006);
        assert!(is_engulfing(&red, &green, Side::Long));
        assert!(!is_engulfing(&red, &green, Side::Short));

        let small_green = bar(1.1001, 1.1004, 1.1000, 1.1003);
        assert!(!is_engulfing(&red, &small_green, Side::Long));
    }

    #[test]
    fn test_pin_bar() {
        let mut candles: Vec<Candle> = (0..10).map(|_| bar(1.1000, 1.1004, 1.0996, 1.1002)).collect();
        // Long lower wick to a new low, close near the top
        candles.push(bar(1.1001, 1.1003, 1.0985, 1.1002));
        assert!(is_pin_bar(&candles, Side::Long, 10));
        assert!(!is_pin_bar(&candles, Side::Short, 10));
        assert_eq!(detect_pattern(&candles, Side::Long, 10), Some(PatternKind::PinBar));

        // Same shape but the wick stops well short of the local low
        let mut shallow = candles.clone();
        shallow[5].low = 1.0970;
        assert!(!is_pin_bar(&shallow, Side::Long, 10));
    }

    #[test]
    fn test_stop_and_target_cap() {
        let config = ChaosConfig::default();
        // Quiet EUR_USD: static pips dominate the stop, target capped at 6 ATR
        let (sl, tp, rr) = stop_and_target("EUR_USD", 0.0002, 1.2, &config);
        assert!((sl - 0.0015).abs() < 1e-12);
        assert!((tp - 0.0012).abs() < 1e-12);
        assert!(rr < config.rr_min);

        // Busy: ATR-based stop, tiered target fits under the cap
        let (sl, tp, rr) = stop_and_target("EUR_USD", 0.0020, 1.6, &config);
        assert!((sl - 0.0030).abs() < 1e-12);
        assert!((tp - 0.0090).abs() < 1e-12);
        assert!((rr - 3.0).abs() < 1e-9);
    }
}
