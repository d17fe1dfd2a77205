//! Liquidity levels from the entry-timeframe window
//!
//! Two sources:
//! - PDH/PDL: extremes of the second-most-recent UTC calendar date in the window
//! - EQH/EQL: adjacent bars whose highs (lows) sit within a tolerance of each other
//!
//! The equal-level pass only compares neighbouring bars. It is a rough O(n)
//! heuristic, not a clustering algorithm: a run of k near-equal highs yields
//! k-1 overlapping levels, and two equal highs separated by another bar are
//! missed. Level order is PDH, PDL, EQH..., EQL..., and the sweep detector
//! relies on that order for its tie-break.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Candle;

/// Fewer bars than this yields no equal-level clusters
const MIN_EQUAL_LEVEL_BARS: usize = 10;

/// Kind of liquidity pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    PrevDayHigh,
    PrevDayLow,
    EqualHighs,
    EqualLows,
}

impl LevelKind {
    /// Previous-day levels earn the premium RR tier
    pub fn is_previous_day(&self) -> bool {
        matches!(self, LevelKind::PrevDayHigh | LevelKind::PrevDayLow)
    }
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKind::PrevDayHigh => write!(f, "PDH"),
            LevelKind::PrevDayLow => write!(f, "PDL"),
            LevelKind::EqualHighs => write!(f, "EQH"),
            LevelKind::EqualLows => write!(f, "EQL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub price: f64,
    pub kind: LevelKind,
}

/// High and low of the second-most-recent UTC date in the window.
///
/// Needs at least two distinct dates.
pub fn previous_day_high_low(candles: &[Candle]) -> Option<(f64, f64)> {
    let mut by_date: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for candle in candles {
        let entry = by_date
            .entry(candle.timestamp.date_naive())
            .or_insert((f64::MIN, f64::MAX));
        entry.0 = entry.0.max(candle.high);
        entry.1 = entry.1.min(candle.low);
    }

    if by_date.len() < 2 {
        return None;
    }

    by_date.values().rev().nth(1).copied()
}

/// Adjacent-pair equal highs/lows within `avg_range * cluster_ratio`
pub fn equal_levels(candles: &[Candle], cluster_ratio: f64) -> Vec<LiquidityLevel> {
    if candles.len() < MIN_EQUAL_LEVEL_BARS {
        return Vec::new();
    }

    let avg_range = candles.iter().map(|c| c.range()).sum::<f64>() / candles.len() as f64;
    if avg_range <= 0.0 {
        return Vec::new();
    }
    let tolerance = avg_range * cluster_ratio;

    let mut levels = Vec::new();
    for pair in candles.windows(2) {
        if (pair[1].high - pair[0].high).abs() <= tolerance {
            levels.push(LiquidityLevel {
                price: (pair[1].high + pair[0].high) / 2.0,
                kind: LevelKind::EqualHighs,
            });
        }
    }
    for pair in candles.windows(2) {
        if (pair[1].low - pair[0].low).abs() <= tolerance {
            levels.push(LiquidityLevel {
                price: (pair[1].low + pair[0].low) / 2.0,
                kind: LevelKind::EqualLows,
            });
        }
    }

    levels
}

/// All liquidity levels for this cycle, previous-day levels first
pub fn build_liquidity_levels(candles: &[Candle], cluster_ratio: f64) -> Vec<LiquidityLevel> {
    let mut levels = Vec::new();

    if let Some((high, low)) = previous_day_high_low(candles) {
        levels.push(LiquidityLevel {
            price: high,
            kind: LevelKind::PrevDayHigh,
        });
        levels.push(LiquidityLevel {
            price: low,
            kind: LevelKind::PrevDayLow,
        });
    }

    levels.extend(equal_levels(candles, cluster_ratio));
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(start: chrono::DateTime<Utc>, highs_lows: &[(f64, f64)]) -> Vec<Candle> {
        highs_lows
            .iter()
            .enumerate()
            .map(|(i, &(h, l))| {
                let mid = (h + l) / 2.0;
                Candle::new(start + Duration::hours(i as i64), mid, h, l, mid)
            })
            .collect()
    }

    #[test]
    fn test_previous_day_needs_two_dates() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let one_day = bars_from(start, &[(1.2, 1.1), (1.3, 1.0)]);
        assert_eq!(previous_day_high_low(&one_day), None);
        assert_eq!(previous_day_high_low(&[]), None);
    }

    #[test]
    fn test_previous_day_is_second_most_recent_date() {
        let day1 = Utc.with_ymd_and_hms(2025, 6, 2, 20, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 6, 3, 20, 0, 0).unwrap();
        let day3 = Utc.with_ymd_and_hms(2025, 6, 4, 20, 0, 0).unwrap();

        let mut candles = bars_from(day1, &[(1.50, 1.40)]);
        candles.extend(bars_from(day2, &[(1.30, 1.20), (1.35, 1.25), (1.32, 1.18)]));
        candles.extend(bars_from(day3, &[(1.10, 1.00)]));

        assert_eq!(previous_day_high_low(&candles), Some((1.35, 1.18)));
    }

    #[test]
    fn test_equal_levels_adjacent_pairs_only() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        // Average range 0.010, tolerance 0.002
        let mut rows = vec![(1.010, 1.000); 10];
        rows[0] = (1.010, 1.000);
        rows[1] = (1.0115, 1.0015); // high within 0.0015 of previous
        rows[2] = (1.020, 1.010);
        rows[3] = (1.030, 1.020);
        rows[4] = (1.040, 1.030);
        rows[5] = (1.050, 1.040);
        rows[6] = (1.060, 1.050);
        rows[7] = (1.070, 1.060);
        rows[8] = (1.080, 1.070);
        rows[9] = (1.090, 1.080);
        let candles = bars_from(start, &rows);

        let levels = equal_levels(&candles, 0.20);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].kind, LevelKind::EqualHighs);
        assert!((levels[0].price - 1.01075).abs() < 1e-9);
        assert_eq!(levels[1].kind, LevelKind::EqualLows);
        assert!((levels[1].price - 1.00075).abs() < 1e-9);
    }

    #[test]
    fn test_equal_levels_guards() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let short = bars_from(start, &[(1.01, 1.00); 9]);
        assert!(equal_levels(&short, 0.2).is_empty());

        let zero_range = bars_from(start, &[(1.0, 1.0); 12]);
        assert!(equal_levels(&zero_range, 0.2).is_empty());
    }

    #[test]
    fn test_build_orders_previous_day_first() {
        let day1 = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap();
        let mut candles = bars_from(day1, &[(1.01, 1.00); 6]);
        candles.extend(bars_from(day2, &[(1.01, 1.00); 6]));

        let levels = build_liquidity_levels(&candles, 0.2);
        assert_eq!(levels[0].kind, LevelKind::PrevDayHigh);
        assert_eq!(levels[1].kind, LevelKind::PrevDayLow);
        assert!(levels[2..].iter().all(|l| !l.kind.is_previous_day()));
        // 11 adjacent pairs, all equal, on both sides
        assert_eq!(levels.len(), 2 + 11 + 11);
    }
}
