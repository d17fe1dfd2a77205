//! OANDA v20 Integration
//!
//! REST adapter implementing both [`crate::market::MarketDataProvider`] and
//! [`crate::market::ExecutionSink`].
//!
//! # Environment Variables
//!
//! - `OANDA_API_KEY` - Personal access token
//! - `OANDA_ACCOUNT_ID` - Account to trade
//! - `OANDA_ENV` (optional) - `practice` (default) or `live`
//!
//! # API Endpoints Used
//!
//! - `GET /accounts/{id}/summary` - NAV, realized P/L
//! - `GET /accounts/{id}/openTrades` - Open positions
//! - `GET /instruments/{instrument}/candles` - Mid candles
//! - `GET /accounts/{id}/pricing` - Bid/ask
//! - `POST /accounts/{id}/orders` - Market orders
//! - `PUT /accounts/{id}/trades/{trade}/close` - Close a trade

pub mod client;
pub mod models;

pub use client::{OandaClient, LIVE_BASE_URL, PRACTICE_BASE_URL};
pub use models::normalize_instrument;
