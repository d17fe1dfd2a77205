//! Broker boundary and instrument conventions
//!
//! The engines never talk to a venue directly. They consume a
//! [`MarketDataProvider`] for candles/quotes and an [`ExecutionSink`] for
//! account state and orders. Both are network calls in a real deployment,
//! so every call goes through [`with_timeout`] and a failure only costs the
//! instrument being processed.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use std::future::Future;
use std::time::Duration;

use crate::types::{AccountSnapshot, Candle, OrderAck, OrderRequest, Quote, Timeframe};

/// Default bound for a single provider/sink call
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of candles and quotes
pub trait MarketDataProvider: Send + Sync {
    /// Most-recent-last candles. May return fewer than `limit` when history is short.
    fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Candle>>> + Send;

    /// Current bid/ask
    fn quote(&self, instrument: &str) -> impl Future<Output = Result<Quote>> + Send;
}

/// Destination for orders, and source of account state
pub trait ExecutionSink: Send + Sync {
    /// Submit a market order with attached SL/TP
    fn submit_order(&self, order: &OrderRequest) -> impl Future<Output = Result<OrderAck>> + Send;

    /// Equity, cumulative realized P/L and open positions
    fn account(&self) -> impl Future<Output = Result<AccountSnapshot>> + Send;
}

/// Run a provider/sink call with a bounded timeout, folding the elapsed case
/// into an ordinary error.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} timed out after {:?}", what, limit)),
    }
}

/// Price increment of one pip: 0.01 for yen crosses and metals, 0.0001 otherwise
pub fn pip_factor(instrument: &str) -> f64 {
    let upper = instrument.to_ascii_uppercase();
    if upper.contains("JPY") || upper.contains("XAU") || upper.contains("XAG") {
        0.01
    } else {
        0.0001
    }
}

/// True for metal instruments (gold/silver)
pub fn is_metal(instrument: &str) -> bool {
    let upper = instrument.to_ascii_uppercase();
    upper.contains("XAU") || upper.contains("XAG")
}

/// Split an instrument into (base, quote) currency codes.
///
/// Accepts both `EUR_USD` and `EURUSD` spellings.
pub fn split_currencies(instrument: &str) -> Option<(String, String)> {
    let upper = instrument.to_ascii_uppercase();
    if let Some((base, quote)) = upper.split_once('_') {
        if base.len() == 3 && quote.len() == 3 {
            return Some((base.to_string(), quote.to_string()));
        }
        return None;
    }
    if upper.len() == 6 && upper.is_ascii() {
        return Some((upper[..3].to_string(), upper[3..].to_string()));
    }
    None
}

/// Forex weekend: closed from Friday 22:00 UTC until Sunday 22:00 UTC
pub fn is_forex_market_open(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Sat => false,
        Weekday::Fri => now.hour() < 22,
        Weekday::Sun => now.hour() >= 22,
        _ => true,
    }
}

/// Half-open UTC hour window `[start, end)`. Wraps past midnight when `start > end`.
pub fn in_session(now: DateTime<Utc>, start_hour: u32, end_hour: u32) -> bool {
    let hour = now.hour();
    if start_hour <= end_hour {
        hour >= start_hour && hour < end_hour
    } else {
        hour >= start_hour || hour < end_hour
    }
}
