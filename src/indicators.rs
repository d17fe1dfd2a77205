//! Technical indicators over candle sequences
//!
//! Pure functions, no state. Series-valued indicators return one entry per
//! input bar, with `None` for bars where the indicator is not yet
//! computable. Callers must treat `None` as insufficient data, never as zero.

use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Fewer bars than this on a timeframe always classifies as range
pub const MIN_BIAS_BARS: usize = 20;

/// Default fractal lookback on each side of a swing bar
pub const DEFAULT_SWING_LOOKBACK: usize = 2;

/// Per-bar true range. The first bar has no previous close and yields `None`.
pub fn true_range(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(candles.len());
    for (i, bar) in candles.iter().enumerate() {
        if i == 0 {
            out.push(None);
            continue;
        }
        let prev_close = candles[i - 1].close;
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        out.push(Some(tr));
    }
    out
}

/// Average True Range: simple rolling mean of true range over `period` bars.
///
/// Needs `period + 1` bars, so entries `0..period` are `None`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    rolling_mean_opt(&true_range(candles), period)
}

/// Simple moving average of closes
pub fn sma_close(candles: &[Candle], window: usize) -> Vec<Option<f64>> {
    let closes: Vec<Option<f64>> = candles.iter().map(|c| Some(c.close)).collect();
    rolling_mean_opt(&closes, window)
}

/// Rolling mean over an optional series. A window containing any `None` is `None`.
pub fn rolling_mean_opt(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut defined = 0usize;

    for i in 0..values.len() {
        if let Some(v) = values[i] {
            sum += v;
            defined += 1;
        }
        if i >= window {
            if let Some(v) = values[i - window] {
                sum -= v;
                defined -= 1;
            }
        }
        if i + 1 >= window && defined == window {
            out[i] = Some(sum / window as f64);
        }
    }

    out
}

/// Last value of a series, if computable
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Wick/body decomposition of a single bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WickMetrics {
    pub upper_wick: f64,
    pub lower_wick: f64,
    pub body: f64,
    pub range: f64,
}

impl WickMetrics {
    pub fn of(candle: &Candle) -> Self {
        Self {
            upper_wick: candle.upper_wick(),
            lower_wick: candle.lower_wick(),
            body: candle.body(),
            range: candle.range(),
        }
    }

    /// Upper wick as a fraction of range. `None` for a zero-range bar.
    pub fn upper_ratio(&self) -> Option<f64> {
        (self.range > 0.0).then(|| self.upper_wick / self.range)
    }

    /// Lower wick as a fraction of range. `None` for a zero-range bar.
    pub fn lower_ratio(&self) -> Option<f64> {
        (self.range > 0.0).then(|| self.lower_wick / self.range)
    }
}

/// Swing highs and lows, in bar order
#[derive(Debug, Clone, Default)]
pub struct Swings {
    pub highs: Vec<Candle>,
    pub lows: Vec<Candle>,
}

/// Fractal swing detection.
///
/// A bar is a swing high when its high is strictly above the highs of the
/// `lookback` bars on each side; swing lows mirror this. Bars within
/// `lookback` of either end can't qualify.
pub fn find_swings(candles: &[Candle], lookback: usize) -> Swings {
    let mut swings = Swings::default();
    let n = candles.len();
    if lookback == 0 || n < 2 * lookback + 1 {
        return swings;
    }

    for i in lookback..(n - lookback) {
        let bar = &candles[i];
        let neighbours = candles[i - lookback..i]
            .iter()
            .chain(candles[i + 1..=i + lookback].iter());

        let mut is_high = true;
        let mut is_low = true;
        for other in neighbours {
            if bar.high <= other.high {
                is_high = false;
            }
            if bar.low >= other.low {
                is_low = false;
            }
        }

        if is_high {
            swings.highs.push(*bar);
        }
        if is_low {
            swings.lows.push(*bar);
        }
    }

    swings
}

/// Higher lows: the last three swing lows strictly increasing
pub fn is_up_trend(swing_lows: &[Candle]) -> bool {
    if swing_lows.len() < 3 {
        return false;
    }
    let last = &swing_lows[swing_lows.len() - 3..];
    last[2].low > last[1].low && last[1].low > last[0].low
}

/// Lower highs: the last three swing highs strictly decreasing
pub fn is_down_trend(swing_highs: &[Candle]) -> bool {
    if swing_highs.len() < 3 {
        return false;
    }
    let last = &swing_highs[swing_highs.len() - 3..];
    last[2].high < last[1].high && last[1].high < last[0].high
}

/// Directional lean derived from swing structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Range,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Range => write!(f, "RANGE"),
        }
    }
}

/// Classify a timeframe as bullish/bearish/range from its swings.
///
/// Conflicting structure (both higher lows and lower highs) is range.
pub fn classify_bias(candles: &[Candle], lookback: usize) -> Bias {
    if candles.len() < MIN_BIAS_BARS {
        return Bias::Range;
    }

    let swings = find_swings(candles, lookback);
    let bullish = is_up_trend(&swings.lows);
    let bearish = is_down_trend(&swings.highs);

    match (bullish, bearish) {
        (true, false) => Bias::Bullish,
        (false, true) => Bias::Bearish,
        _ => Bias::Range,
    }
}
