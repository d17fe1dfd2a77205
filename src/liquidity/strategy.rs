//! Liquidity sweep strategy: per-pair signal decision
//!
//! Flow per pair and cycle:
//! 1. Spread filter on the live quote
//! 2. 4H/1H bias from swing structure, combined per the pair's alignment policy
//! 3. Liquidity levels from the 5m window, sweep detection, BOS confirmation
//! 4. Signal with SL beyond the sweep wick and TP at the pair's RR tier
//!
//! Every skip is a silent "no signal". Provider failures are logged and cost
//! only the pair being scanned.

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::{AlignmentPolicy, LiquidityConfig, PairConfig};
use super::levels::{build_liquidity_levels, LiquidityLevel};
use super::sweep::{confirm_bos, detect_sweep, SweepResult};
use crate::indicators::{classify_bias, Bias};
use crate::market::{pip_factor, with_timeout, MarketDataProvider};
use crate::types::{Candle, Quote, Side, Signal};

/// Spread in pips for an instrument
pub fn spread_pips(symbol: &str, quote: &Quote) -> f64 {
    quote.spread() / pip_factor(symbol)
}

/// True when the spread is within the pair's ceiling
pub fn spread_ok(pair: &PairConfig, quote: &Quote) -> bool {
    spread_pips(&pair.symbol, quote) <= pair.max_spread_pips
}

/// Combine primary and secondary bias. `None` means no trade this cycle.
pub fn resolve_bias(primary: Bias, secondary: Bias, policy: AlignmentPolicy) -> Option<Bias> {
    if primary == Bias::Range {
        return None;
    }
    match policy {
        AlignmentPolicy::RequireSecondary if secondary != primary => None,
        _ => Some(primary),
    }
}

/// Premium tier for previous-day levels, default tier for equal-level clusters
pub fn choose_rr(pair: &PairConfig, level: &LiquidityLevel) -> f64 {
    if level.kind.is_previous_day() {
        pair.rr_premium
    } else {
        pair.rr_default
    }
}

/// Stop beyond the sweep wick plus buffer, target at `rr` times the risk.
///
/// Returns `None` when the stop ends up on the wrong side of entry.
pub fn calc_sl_tp(
    side: Side,
    entry: f64,
    sweep_candle: &Candle,
    buffer: f64,
    rr: f64,
) -> Option<(f64, f64)> {
    let stop_loss = match side {
        Side::Long => sweep_candle.low - buffer,
        Side::Short => sweep_candle.high + buffer,
    };
    let risk = (entry - stop_loss) * side.sign();
    if risk <= 0.0 {
        return None;
    }
    let take_profit = entry + side.sign() * risk * rr;
    Some((stop_loss, take_profit))
}

/// Evaluate one pair from already-fetched candles.
///
/// Pure: no I/O, no state. The spread filter is applied by the caller.
pub fn evaluate_pair(
    pair: &PairConfig,
    config: &LiquidityConfig,
    primary: &[Candle],
    secondary: &[Candle],
    entry_bars: &[Candle],
) -> Option<Signal> {
    if primary.len() < config.min_htf_bars
        || secondary.len() < config.min_htf_bars
        || entry_bars.len() < config.min_entry_bars
    {
        debug!(
            "{}: insufficient data ({}/{}/{} bars)",
            pair.symbol,
            primary.len(),
            secondary.len(),
            entry_bars.len()
        );
        return None;
    }

    let primary_bias = classify_bias(primary, config.swing_lookback);
    let secondary_bias = classify_bias(secondary, config.swing_lookback);
    let Some(bias) = resolve_bias(primary_bias, secondary_bias, pair.alignment) else {
        debug!(
            "{}: no bias ({} {} / {} {})",
            pair.symbol,
            config.primary_timeframe,
            primary_bias,
            config.secondary_timeframe,
            secondary_bias
        );
        return None;
    };

    let levels = build_liquidity_levels(entry_bars, config.cluster_ratio);
    let sweep: SweepResult =
        detect_sweep(entry_bars, &levels, bias, pair, config.sweep_window)?;

    if !confirm_bos(entry_bars, &sweep, config.bos_lookback) {
        debug!(
            "{}: {} sweep at {} without BOS",
            pair.symbol, sweep.level.kind, sweep.candle.timestamp
        );
        return None;
    }

    let entry = entry_bars.last()?.close;
    let rr = choose_rr(pair, &sweep.level);
    let buffer = config.stop_buffer_pips * pip_factor(&pair.symbol);
    let Some((stop_loss, take_profit)) = calc_sl_tp(sweep.side, entry, &sweep.candle, buffer, rr)
    else {
        debug!("{}: entry already beyond the sweep stop", pair.symbol);
        return None;
    };

    Some(Signal {
        symbol: pair.symbol.clone(),
        side: sweep.side,
        entry,
        stop_loss,
        take_profit,
        rr,
        timeframe: config.entry_timeframe,
        comment: format!(
            "HTF {} + {} liquidity sweep ({}) + BOS",
            bias, config.entry_timeframe, sweep.level.kind
        ),
    })
}

async fn scan_pair<P: MarketDataProvider>(
    provider: &P,
    config: &LiquidityConfig,
    pair: &PairConfig,
    io_timeout: Duration,
) -> Result<Option<Signal>> {
    let symbol = pair.symbol.as_str();

    let quote = with_timeout(io_timeout, "quote", provider.quote(symbol)).await?;
    if !spread_ok(pair, &quote) {
        debug!(
            "{}: spread {:.1} pips above {:.1}",
            symbol,
            spread_pips(symbol, &quote),
            pair.max_spread_pips
        );
        return Ok(None);
    }

    let primary = with_timeout(
        io_timeout,
        "primary candles",
        provider.candles(symbol, config.primary_timeframe, config.htf_limit),
    )
    .await?;
    let secondary = with_timeout(
        io_timeout,
        "secondary candles",
        provider.candles(symbol, config.secondary_timeframe, config.htf_limit),
    )
    .await?;
    let entry_bars = with_timeout(
        io_timeout,
        "entry candles",
        provider.candles(symbol, config.entry_timeframe, config.entry_limit),
    )
    .await?;

    Ok(evaluate_pair(pair, config, &primary, &secondary, &entry_bars))
}

/// Scan every configured pair in order and collect signals
pub async fn generate_signals<P: MarketDataProvider>(
    provider: &P,
    config: &LiquidityConfig,
    io_timeout: Duration,
) -> Vec<Signal> {
    let mut signals = Vec::new();

    for pair in &config.pairs {
        match scan_pair(provider, config, pair, io_timeout).await {
            Ok(Some(signal)) => {
                info!(
                    "{} {} @ {:.5} SL {:.5} TP {:.5} (RR {:.1}): {}",
                    signal.symbol,
                    signal.side,
                    signal.entry,
                    signal.stop_loss,
                    signal.take_profit,
                    signal.rr,
                    signal.comment
                );
                signals.push(signal);
            }
            Ok(None) => {}
            Err(e) => warn!("{}: skipped, {:#}", pair.symbol, e),
        }
    }

    signals
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic EURGBP series shared by the strategy and tick tests

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::types::Candle;

    /// Zigzag on a rising baseline: higher swing lows and higher swing highs
    pub fn uptrend(n: usize, step_hours: i64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap();
        let wave = [0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0];
        (0..n)
            .map(|i| {
                let mid = 0.84 + 0.0001 * i as f64 + 0.001 * wave[i % 8];
                Candle::new(
                    start + Duration::hours(step_hours * i as i64),
                    mid,
                    mid + 0.0002,
                    mid - 0.0002,
                    mid,
                )
            })
            .collect()
    }

    fn five_min(i: usize) -> DateTime<Utc> {
        // 12 bars on the previous day, the rest after midnight
        Utc.with_ymd_and_hms(2025, 6, 3, 23, 0, 0).unwrap() + Duration::minutes(5 * i as i64)
    }

    /// 60 five-minute bars: previous day low 0.8505, a sweep bar at index 56
    /// with the given low/open, and a BOS bar at index 58.
    pub fn entry_series(sweep_open: f64, sweep_low: f64) -> Vec<Candle> {
        (0..60)
            .map(|i| {
                let ts = five_min(i);
                match i {
                    0..=11 => Candle::new(ts, 0.8510, 0.8515, 0.8505, 0.8510),
                    56 => Candle::new(ts, sweep_open, 0.8511, sweep_low, 0.8510),
                    58 => Candle::new(ts, 0.8512, 0.8520, 0.8511, 0.8518),
                    _ => Candle::new(ts, 0.8512, 0.8516, 0.8508, 0.8512),
                }
            })
            .collect()
    }

    /// Sweep through the previous-day low (0.8505)
    pub fn pdl_sweep() -> Vec<Candle> {
        entry_series(0.8510, 0.8502)
    }

    /// Sweep through the 0.8508 equal lows, staying above the previous-day low
    pub fn eql_sweep() -> Vec<Candle> {
        entry_series(0.8510, 0.85065)
    }

    /// Pierces the previous-day low but with a short lower wick
    pub fn weak_wick() -> Vec<Candle> {
        let mut bars = entry_series(0.8504, 0.8502);
        let sweep = &mut bars[56];
        sweep.high = 0.8515;
        sweep.close = 0.8514;
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::liquidity::levels::LevelKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_rr_construction() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap();
        let sweep = Candle::new(ts, 1.0990, 1.1000, 1.0953, 1.0995);
        let (sl, tp) = calc_sl_tp(Side::Long, 1.100, &sweep, 0.0003, 3.0).unwrap();

        assert!((sl - 1.095).abs() < 1e-9);
        assert!(((tp - 1.100) / (1.100 - sl) - 3.0).abs() < 1e-6);

        // Short mirrors above the sweep high
        let (sl, tp) = calc_sl_tp(Side::Short, 1.0990, &sweep, 0.0003, 2.0).unwrap();
        assert!((sl - 1.1003).abs() < 1e-9);
        assert!(tp < 1.0990);

        // Entry already below the long stop
        assert!(calc_sl_tp(Side::Long, 1.0940, &sweep, 0.0003, 3.0).is_none());
    }

    #[test]
    fn test_choose_rr_tiers() {
        let pair = PairConfig::eurgbp();
        let pdl = LiquidityLevel {
            price: 0.85,
            kind: LevelKind::PrevDayLow,
        };
        let eqh = LiquidityLevel {
            price: 0.85,
            kind: LevelKind::EqualHighs,
        };
        assert_eq!(choose_rr(&pair, &pdl), 2.5);
        assert_eq!(choose_rr(&pair, &eqh), 2.0);
    }

    #[test]
    fn test_spread_filter_is_deterministic() {
        let eurgbp = PairConfig::eurgbp();
        let gold = PairConfig::xauusd();
        let wide = Quote {
            bid: 0.85000,
            ask: 0.85030,
        };
        let tight = Quote {
            bid: 0.85000,
            ask: 0.85010,
        };
        let gold_quote = Quote {
            bid: 2350.00,
            ask: 2350.30,
        };

        for _ in 0..3 {
            assert!(!spread_ok(&eurgbp, &wide));
            assert!(spread_ok(&eurgbp, &tight));
            // 30 pips on gold is inside its 35 pip ceiling
            assert!(spread_ok(&gold, &gold_quote));
        }
    }

    #[test]
    fn test_resolve_bias_policies() {
        use AlignmentPolicy::*;
        assert_eq!(resolve_bias(Bias::Range, Bias::Bullish, PrimaryOnly), None);
        assert_eq!(
            resolve_bias(Bias::Bullish, Bias::Bullish, RequireSecondary),
            Some(Bias::Bullish)
        );
        assert_eq!(resolve_bias(Bias::Bullish, Bias::Range, RequireSecondary), None);
        assert_eq!(
            resolve_bias(Bias::Bearish, Bias::Bullish, PrimaryOnly),
            Some(Bias::Bearish)
        );
    }

    #[test]
    fn test_pdl_sweep_with_bos_signals_long_at_premium_tier() {
        let config = LiquidityConfig::default();
        let pair = PairConfig::eurgbp();
        let htf = uptrend(60, 4);

        let signal = evaluate_pair(&pair, &config, &htf, &htf, &pdl_sweep()).unwrap();
        assert_eq!(signal.side, Side::Long);
        assert!((signal.entry - 0.8512).abs() < 1e-9);
        assert!((signal.stop_loss - 0.8499).abs() < 1e-9);
        assert_eq!(signal.rr, 2.5);
        assert!(((signal.take_profit - signal.entry) / (signal.entry - signal.stop_loss) - 2.5).abs() < 1e-6);
        assert!(signal.comment.contains("PDL"));
    }

    #[test]
    fn test_equal_lows_sweep_uses_default_tier() {
        let config = LiquidityConfig::default();
        let pair = PairConfig::eurgbp();
        let htf = uptrend(60, 4);

        let signal = evaluate_pair(&pair, &config, &htf, &htf, &eql_sweep()).unwrap();
        assert_eq!(signal.side, Side::Long);
        assert_eq!(signal.rr, pair.rr_default);
        assert!(signal.stop_loss < 0.85065);
        assert!(signal.comment.contains("EQL"));
    }

    #[test]
    fn test_short_wick_yields_no_signal() {
        let config = LiquidityConfig::default();
        let pair = PairConfig::eurgbp();
        let htf = uptrend(60, 4);

        assert!(evaluate_pair(&pair, &config, &htf, &htf, &weak_wick()).is_none());
    }

    #[test]
    fn test_no_bos_no_signal() {
        let config = LiquidityConfig::default();
        let pair = PairConfig::eurgbp();
        let htf = uptrend(60, 4);
        let mut bars = pdl_sweep();
        bars[58].high = 0.8516;

        assert!(evaluate_pair(&pair, &config, &htf, &htf, &bars).is_none());
    }

    #[test]
    fn test_insufficient_and_rangebound_history() {
        let config = LiquidityConfig::default();
        let pair = PairConfig::eurgbp();
        let htf = uptrend(60, 4);

        assert!(evaluate_pair(&pair, &config, &htf[..25], &htf, &pdl_sweep()).is_none());
        assert!(evaluate_pair(&pair, &config, &htf, &htf, &pdl_sweep()[..40]).is_none());

        // Flat 1H conflicts with a bullish 4H on a pair that requires alignment
        let flat: Vec<Candle> = htf
            .iter()
            .map(|c| Candle::new(c.timestamp, 0.85, 0.8502, 0.8498, 0.85))
            .collect();
        assert!(evaluate_pair(&pair, &config, &htf, &flat, &pdl_sweep()).is_none());
    }
}
