//! Liquidity sweep detection and break-of-structure confirmation
//!
//! Stateless: everything is recomputed from the candle window each cycle.

use serde::{Deserialize, Serialize};

use super::config::PairConfig;
use super::levels::LiquidityLevel;
use crate::indicators::{Bias, WickMetrics};
use crate::types::{Candle, Side};

/// Fewer entry bars than this can't confirm a BOS
const MIN_BOS_BARS: usize = 10;

/// A liquidity grab: a bar that pierced a level and closed back through it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub candle: Candle,
    /// Position of the sweep bar within the entry window
    pub index: usize,
    pub level: LiquidityLevel,
    /// Trade side implied by the sweep (opposite of the wick direction)
    pub side: Side,
}

/// Check a single bar against the levels.
///
/// Bullish bias wants a long lower wick through a level with the close back
/// above it (`low < level <= close`); bearish mirrors this on the upper wick.
/// The first matching level in list order wins, not the nearest one.
pub fn sweep_at(
    candle: &Candle,
    levels: &[LiquidityLevel],
    bias: Bias,
    pair: &PairConfig,
) -> Option<(LiquidityLevel, Side)> {
    let wicks = WickMetrics::of(candle);

    match bias {
        Bias::Bullish => {
            let ratio = wicks.lower_ratio()?;
            if ratio < pair.min_wick_ratio {
                return None;
            }
            levels
                .iter()
                .find(|level| candle.low < level.price && level.price <= candle.close)
                .map(|level| (*level, Side::Long))
        }
        Bias::Bearish => {
            let ratio = wicks.upper_ratio()?;
            if ratio < pair.min_wick_ratio {
                return None;
            }
            levels
                .iter()
                .find(|level| candle.high > level.price && level.price >= candle.close)
                .map(|level| (*level, Side::Short))
        }
        Bias::Range => None,
    }
}

/// Find the most recent sweep within the trailing `window` bars.
///
/// Bars are examined newest first and the first qualifying bar is the
/// sweep; at most one result per call.
pub fn detect_sweep(
    candles: &[Candle],
    levels: &[LiquidityLevel],
    bias: Bias,
    pair: &PairConfig,
    window: usize,
) -> Option<SweepResult> {
    if candles.is_empty() || levels.is_empty() || window == 0 {
        return None;
    }

    let first = candles.len().saturating_sub(window);
    (first..candles.len()).rev().find_map(|index| {
        let candle = &candles[index];
        sweep_at(candle, levels, bias, pair).map(|(level, side)| SweepResult {
            candle: *candle,
            index,
            level,
            side,
        })
    })
}

/// Break of structure after the sweep.
///
/// The `lookback` bars before the sweep define a minor high (long) or low
/// (short). BOS is confirmed by the first later bar whose wick trades
/// through it.
pub fn confirm_bos(candles: &[Candle], sweep: &SweepResult, lookback: usize) -> bool {
    if candles.len() < MIN_BOS_BARS {
        return false;
    }

    let Some(idx) = candles
        .iter()
        .position(|c| c.timestamp == sweep.candle.timestamp)
    else {
        return false;
    };

    let structure = &candles[idx.saturating_sub(lookback)..idx];
    if structure.is_empty() {
        return false;
    }
    let after = &candles[idx + 1..];

    match sweep.side {
        Side::Long => {
            let minor_high = structure.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            after.iter().any(|c| c.high > minor_high)
        }
        Side::Short => {
            let minor_low = structure.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            after.iter().any(|c| c.low < minor_low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidity::levels::LevelKind;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let start = Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap();
        Candle::new(start + Duration::minutes(5 * i), open, high, low, close)
    }

    fn level(price: f64, kind: LevelKind) -> LiquidityLevel {
        LiquidityLevel { price, kind }
    }

    #[test]
    fn test_bullish_sweep_requires_close_back_above() {
        let pair = PairConfig::eurgbp();
        let levels = vec![level(0.8500, LevelKind::PrevDayLow)];

        // Lower wick 0.0008 of 0.0009 range, low through 0.8500, close above
        let sweep = bar(0, 0.8502, 0.8503, 0.8494, 0.8502);
        assert!(sweep_at(&sweep, &levels, Bias::Bullish, &pair).is_some());

        // Closed below the level: no recovery
        let no_recovery = bar(0, 0.8499, 0.8500, 0.8490, 0.8498);
        assert!(sweep_at(&no_recovery, &levels, Bias::Bullish, &pair).is_none());

        // Right bar, wrong bias
        assert!(sweep_at(&sweep, &levels, Bias::Bearish, &pair).is_none());
        assert!(sweep_at(&sweep, &levels, Bias::Range, &pair).is_none());
    }

    #[test]
    fn test_wick_ratio_gate() {
        let pair = PairConfig::eurgbp();
        let levels = vec![level(0.8500, LevelKind::PrevDayLow)];

        // Lower wick 0.0003 of 0.0012 range: ratio 0.25 < 0.35
        let weak = bar(0, 0.8501, 0.8510, 0.8498, 0.8509);
        assert!(sweep_at(&weak, &levels, Bias::Bullish, &pair).is_none());
    }

    #[test]
    fn test_bearish_sweep_and_first_level_wins() {
        let pair = PairConfig::eurgbp();
        let levels = vec![
            level(0.8520, LevelKind::EqualHighs),
            level(0.8515, LevelKind::PrevDayHigh),
        ];
        let candle = bar(0, 0.8512, 0.8525, 0.8510, 0.8511);

        let (hit, side) = sweep_at(&candle, &levels, Bias::Bearish, &pair).unwrap();
        assert_eq!(side, Side::Short);
        // List order, not proximity or kind
        assert_eq!(hit.kind, LevelKind::EqualHighs);
    }

    #[test]
    fn test_detect_sweep_window() {
        let pair = PairConfig::eurgbp();
        let levels = vec![level(0.8500, LevelKind::PrevDayLow)];

        let mut candles: Vec<Candle> = (0..10)
            .map(|i| bar(i, 0.8505, 0.8507, 0.8503, 0.8506))
            .collect();
        candles[7] = bar(7, 0.8502, 0.8503, 0.8494, 0.8502);

        let found = detect_sweep(&candles, &levels, Bias::Bullish, &pair, 6).unwrap();
        assert_eq!(found.index, 7);
        assert_eq!(found.side, Side::Long);

        // Last-bar-only window misses it
        assert!(detect_sweep(&candles, &levels, Bias::Bullish, &pair, 1).is_none());
    }

    #[test]
    fn test_confirm_bos_long_uses_wicks() {
        let mut candles: Vec<Candle> = (0..12)
            .map(|i| bar(i, 0.8505, 0.8508, 0.8503, 0.8506))
            .collect();
        // Pre-sweep structure high 0.8510 on bar 7
        candles[7] = bar(7, 0.8505, 0.8510, 0.8503, 0.8506);
        candles[9] = bar(9, 0.8502, 0.8503, 0.8494, 0.8502);
        let sweep = SweepResult {
            candle: candles[9],
            index: 9,
            level: level(0.8500, LevelKind::PrevDayLow),
            side: Side::Long,
        };

        assert!(!confirm_bos(&candles, &sweep, 3));

        // Wick above 0.8510 with a close below it still confirms
        candles[11] = bar(11, 0.8505, 0.8511, 0.8504, 0.8507);
        assert!(confirm_bos(&candles, &sweep, 3));
    }

    #[test]
    fn test_confirm_bos_short() {
        let mut candles: Vec<Candle> = (0..12)
            .map(|i| bar(i, 0.8505, 0.8508, 0.8503, 0.8506))
            .collect();
        candles[9] = bar(9, 0.8508, 0.8516, 0.8506, 0.8507);
        let sweep = SweepResult {
            candle: candles[9],
            index: 9,
            level: level(0.8512, LevelKind::EqualHighs),
            side: Side::Short,
        };
        assert!(!confirm_bos(&candles, &sweep, 3));

        candles[10] = bar(10, 0.8506, 0.8507, 0.8502, 0.8503);
        assert!(confirm_bos(&candles, &sweep, 3));
    }

    #[test]
    fn test_confirm_bos_short_window() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| bar(i, 0.8505, 0.8508, 0.8503, 0.8506))
            .collect();
        let sweep = SweepResult {
            candle: candles[2],
            index: 2,
            level: level(0.8500, LevelKind::PrevDayLow),
            side: Side::Long,
        };
        assert!(!confirm_bos(&candles, &sweep, 3));
    }
}
