//! Shared value types for both engines
//!
//! Candles and quotes come in from the market data provider, signals and
//! order requests go out to the execution sink. Everything here is a plain
//! value: created per cycle, never mutated after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC bar. Sequences are ordered by timestamp ascending (most recent last).
///
/// `high >= max(open, close)` and `low <= min(open, close)` are trusted from
/// the data source, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Full bar range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Current bid/ask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Apply direction to an unsigned unit count
    pub fn signed_units(&self, units: u64) -> i64 {
        match self {
            Side::Long => units as i64,
            Side::Short => -(units as i64),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Candle granularity requested from the market data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Bar length in seconds
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "1m"),
            Timeframe::M5 => write!(f, "5m"),
            Timeframe::M15 => write!(f, "15m"),
            Timeframe::H1 => write!(f, "1h"),
            Timeframe::H4 => write!(f, "4h"),
            Timeframe::D1 => write!(f, "1d"),
        }
    }
}

/// Directional trade signal from the liquidity sweep strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Reward:risk multiple used to place the take-profit
    pub rr: f64,
    /// Timeframe the entry was taken on
    pub timeframe: Timeframe,
    pub comment: String,
}

/// Open position as reported by the execution sink. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub instrument: String,
    /// Positive = long, negative = short
    pub signed_units: i64,
    pub entry_price: f64,
    /// None when the venue reports no attached stop
    pub stop_loss_price: Option<f64>,
}

/// Account state polled once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub equity: f64,
    /// Cumulative realized P/L, used to infer closed trades between polls
    pub realized_pl: Option<f64>,
    pub open_positions: Vec<OpenPosition>,
}

/// Market order with attached stop-loss / take-profit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    /// Positive = buy, negative = sell
    pub units: i64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Venue acknowledgment for a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: Option<String>,
    pub status: String,
    /// Venue-specific payload, passed through untouched
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Result of an order submission. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderOutcome {
    Accepted(OrderAck),
    Failed { error: String },
}

impl OrderOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderOutcome::Accepted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_candle_wicks() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
        let candle = Candle::new(ts, 1.1000, 1.1010, 1.0980, 1.1005);

        assert!((candle.range() - 0.0030).abs() < 1e-12);
        assert!((candle.body() - 0.0005).abs() < 1e-12);
        assert!((candle.upper_wick() - 0.0005).abs() < 1e-12);
        assert!((candle.lower_wick() - 0.0020).abs() < 1e-12);
        assert!(candle.is_bullish());
    }

    #[test]
    fn test_side_signed_units() {
        assert_eq!(Side::Long.signed_units(1000), 1000);
        assert_eq!(Side::Short.signed_units(1000), -1000);
        assert_eq!(format!("{}", Side::Short), "SHORT");
    }

    #[test]
    fn test_order_outcome_serializes_with_outcome_tag() {
        let failed = OrderOutcome::Failed {
            error: "rejected".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert!(!failed.is_accepted());
    }
}
