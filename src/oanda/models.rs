//! OANDA v20 Data Models
//!
//! Request and response types for the OANDA v20 REST API. OANDA encodes
//! prices and unit counts as decimal strings.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::market::pip_factor;
use crate::types::{Candle, OpenPosition, OrderRequest, Quote, Timeframe};

fn de_decimal<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<f64>().map_err(serde::de::Error::custom)
}

fn de_decimal_opt<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| s.parse::<f64>().map_err(serde::de::Error::custom))
        .transpose()
}

/// OANDA instrument spelling: `EURGBP` -> `EUR_GBP`, `XAUUSD` -> `XAU_USD`.
/// Names already containing an underscore pass through.
pub fn normalize_instrument(instrument: &str) -> String {
    let upper = instrument.trim().to_ascii_uppercase();
    if upper.contains('_') || upper.len() != 6 || !upper.chars().all(|c| c.is_ascii_alphabetic()) {
        return upper;
    }
    format!("{}_{}", &upper[..3], &upper[3..])
}

/// Candle granularity code for a timeframe
pub fn granularity(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::M1 => "M1",
        Timeframe::M5 => "M5",
        Timeframe::M15 => "M15",
        Timeframe::H1 => "H1",
        Timeframe::H4 => "H4",
        Timeframe::D1 => "D",
    }
}

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AccountSummaryResponse {
    pub account: AccountSummary,
}

/// Subset of the account summary the engines consume
#[derive(Debug, Deserialize, Clone)]
pub struct AccountSummary {
    /// Net asset value (equity)
    #[serde(rename = "NAV", deserialize_with = "de_decimal")]
    pub nav: f64,
    #[serde(default, deserialize_with = "de_decimal_opt")]
    pub balance: Option<f64>,
    /// Cumulative realized P/L over the account's lifetime
    #[serde(default, deserialize_with = "de_decimal_opt")]
    pub pl: Option<f64>,
    #[serde(rename = "openTradeCount", default)]
    pub open_trade_count: u32,
}

// ============================================================================
// Trades
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenTradesResponse {
    #[serde(default)]
    pub trades: Vec<Trade>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub instrument: String,
    #[serde(deserialize_with = "de_decimal")]
    pub current_units: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub price: f64,
    #[serde(default)]
    pub stop_loss_order: Option<DependentOrder>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DependentOrder {
    #[serde(default, deserialize_with = "de_decimal_opt")]
    pub price: Option<f64>,
}

impl Trade {
    pub fn to_position(&self) -> OpenPosition {
        OpenPosition {
            instrument: self.instrument.clone(),
            signed_units: self.current_units.round() as i64,
            entry_price: self.price,
            stop_loss_price: self.stop_loss_order.as_ref().and_then(|o| o.price),
        }
    }
}

// ============================================================================
// Candles
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CandlesResponse {
    #[serde(default)]
    pub candles: Vec<CandleStick>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CandleStick {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub mid: Option<CandleData>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CandleData {
    #[serde(deserialize_with = "de_decimal")]
    pub o: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub h: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub l: f64,
    #[serde(deserialize_with = "de_decimal")]
    pub c: f64,
}

impl CandlesResponse {
    /// Completed mid candles, oldest first. The still-forming bar is dropped.
    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
            .into_iter()
            .filter(|stick| stick.complete)
            .filter_map(|stick| {
                let mid = stick.mid?;
                Some(Candle::new(stick.time, mid.o, mid.h, mid.l, mid.c))
            })
            .collect()
    }
}

// ============================================================================
// Pricing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PricingResponse {
    #[serde(default)]
    pub prices: Vec<Price>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Price {
    pub instrument: String,
    #[serde(default)]
    pub bids: Vec<PriceBucket>,
    #[serde(default)]
    pub asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceBucket {
    #[serde(deserialize_with = "de_decimal")]
    pub price: f64,
}

impl PricingResponse {
    /// Top-of-book quote for `instrument`
    pub fn quote_for(&self, instrument: &str) -> Result<Quote> {
        let price = self
            .prices
            .iter()
            .find(|p| p.instrument == instrument)
            .ok_or_else(|| anyhow!("No price returned for {}", instrument))?;
        let bid = price
            .bids
            .first()
            .ok_or_else(|| anyhow!("Empty bid book for {}", instrument))?;
        let ask = price
            .asks
            .first()
            .ok_or_else(|| anyhow!("Empty ask book for {}", instrument))?;
        Ok(Quote {
            bid: bid.price,
            ask: ask.price,
        })
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub order: MarketOrder,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOrder {
    /// Signed: positive buys, negative sells
    pub units: String,
    pub instrument: String,
    pub time_in_force: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub position_fill: String,
    pub stop_loss_on_fill: PriceDetails,
    pub take_profit_on_fill: PriceDetails,
}

#[derive(Debug, Serialize)]
pub struct PriceDetails {
    pub price: String,
}

/// Decimal places OANDA accepts on order prices: 3 for yen crosses and
/// metals, 5 otherwise
pub fn price_precision(instrument: &str) -> usize {
    if pip_factor(instrument) >= 0.01 {
        3
    } else {
        5
    }
}

impl CreateOrderRequest {
    /// Fill-or-kill market order with SL/TP attached at the instrument's precision
    pub fn market(order: &OrderRequest) -> Self {
        let digits = price_precision(&order.instrument);
        Self {
            order: MarketOrder {
                units: order.units.to_string(),
                instrument: normalize_instrument(&order.instrument),
                time_in_force: "FOK".to_string(),
                order_type: "MARKET".to_string(),
                position_fill: "DEFAULT".to_string(),
                stop_loss_on_fill: PriceDetails {
                    price: format!("{:.*}", digits, order.stop_loss),
                },
                take_profit_on_fill: PriceDetails {
                    price: format!("{:.*}", digits, order.take_profit),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub order_create_transaction: Option<Transaction>,
    #[serde(default)]
    pub order_fill_transaction: Option<Transaction>,
    #[serde(default)]
    pub order_cancel_transaction: Option<Transaction>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub error_message: Option<String>,
}
