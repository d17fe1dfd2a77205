//! OANDA v20 API Client
//!
//! HTTP client for the OANDA v20 REST API with bearer-token authentication.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::models::*;
use crate::market::{ExecutionSink, MarketDataProvider};
use crate::types::{AccountSnapshot, Candle, OrderAck, OrderRequest, Quote, Timeframe};

/// Practice environment base URL
pub const PRACTICE_BASE_URL: &str = "https://api-fxpractice.oanda.com/v3";

/// Live environment base URL
pub const LIVE_BASE_URL: &str = "https://api-fxtrade.oanda.com/v3";

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// OANDA REST client bound to one account
pub struct OandaClient {
    client: Client,
    base_url: String,
    api_key: String,
    account_id: String,
}

impl OandaClient {
    /// Create a new client for the practice environment
    pub fn practice(api_key: String, account_id: String) -> Result<Self> {
        Self::new(api_key, account_id, PRACTICE_BASE_URL.to_string())
    }

    /// Create a new client for the live environment
    pub fn live(api_key: String, account_id: String) -> Result<Self> {
        Self::new(api_key, account_id, LIVE_BASE_URL.to_string())
    }

    /// Create a new client with explicit configuration
    pub fn new(api_key: String, account_id: String, base_url: String) -> Result<Self> {
        if api_key.is_empty() || account_id.is_empty() {
            return Err(anyhow!("OANDA_API_KEY and OANDA_ACCOUNT_ID must be set"));
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
            account_id,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_message)
                .unwrap_or(body);
            return Err(anyhow!("{} failed with status {}: {}", what, status, message));
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse {} response", what))
    }

    /// Account summary: NAV and realized P/L
    pub async fn account_summary(&self) -> Result<AccountSummary> {
        let url = format!("{}/accounts/{}/summary", self.base_url, self.account_id);
        let response: AccountSummaryResponse = self.send(self.client.get(url), "account summary").await?;
        Ok(response.account)
    }

    pub async fn open_trades(&self) -> Result<Vec<Trade>> {
        let url = format!("{}/accounts/{}/openTrades", self.base_url, self.account_id);
        let response: OpenTradesResponse = self.send(self.client.get(url), "open trades").await?;
        Ok(response.trades)
    }

    /// Completed mid candles, oldest first
    pub async fn get_candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let instrument = normalize_instrument(instrument);
        let url = format!("{}/instruments/{}/candles", self.base_url, instrument);
        let count = count.to_string();
        let request = self.client.get(url).query(&[
            ("granularity", granularity(timeframe)),
            ("count", count.as_str()),
            ("price", "M"),
        ]);
        let response: CandlesResponse = self.send(request, "candles").await?;
        let candles = response.into_candles();
        debug!("Fetched {} {} candles for {}", candles.len(), timeframe, instrument);
        Ok(candles)
    }

    pub async fn pricing(&self, instrument: &str) -> Result<Quote> {
        let instrument = normalize_instrument(instrument);
        let url = format!("{}/accounts/{}/pricing", self.base_url, self.account_id);
        let request = self.client.get(url).query(&[("instruments", instrument.as_str())]);
        let response: PricingResponse = self.send(request, "pricing").await?;
        response.quote_for(&instrument)
    }

    /// Place a fill-or-kill market order with SL/TP on fill
    pub async fn create_market_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let url = format!("{}/accounts/{}/orders", self.base_url, self.account_id);
        let body = CreateOrderRequest::market(order);

        info!(
            "Placing order: {} units={} SL={} TP={}",
            body.order.instrument, body.order.units, body.order.stop_loss_on_fill.price, body.order.take_profit_on_fill.price
        );

        let raw: serde_json::Value = self.send(self.client.post(url).json(&body), "order").await?;
        let response: CreateOrderResponse =
            serde_json::from_value(raw.clone()).context("Failed to parse order response")?;

        if let Some(cancel) = response.order_cancel_transaction {
            let reason = cancel.reason.unwrap_or_else(|| "unknown".to_string());
            warn!("Order {} cancelled: {}", cancel.id, reason);
            return Err(anyhow!("Order cancelled: {}", reason));
        }

        let (order_id, status) = match (response.order_fill_transaction, response.order_create_transaction) {
            (Some(fill), _) => (Some(fill.id), "filled"),
            (None, Some(create)) => (Some(create.id), "created"),
            (None, None) => (None, "unknown"),
        };

        info!("Order accepted: id={:?} status={}", order_id, status);
        Ok(OrderAck {
            order_id,
            status: status.to_string(),
            raw,
        })
    }

    /// Close an open trade in full.
    ///
    /// The engines never close trades; this is for manual operation.
    pub async fn close_trade(&self, trade_id: &str) -> Result<serde_json::Value> {
        let url = format!(
            "{}/accounts/{}/trades/{}/close",
            self.base_url, self.account_id, trade_id
        );
        info!("Closing trade {}", trade_id);
        self.send(self.client.put(url), "close trade").await
    }
}

impl MarketDataProvider for OandaClient {
    async fn candles(&self, instrument: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        self.get_candles(instrument, timeframe, limit).await
    }

    async fn quote(&self, instrument: &str) -> Result<Quote> {
        self.pricing(instrument).await
    }
}

impl ExecutionSink for OandaClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.create_market_order(order).await
    }

    async fn account(&self) -> Result<AccountSnapshot> {
        let (summary, trades) = tokio::try_join!(self.account_summary(), self.open_trades())?;
        Ok(AccountSnapshot {
            equity: summary.nav,
            realized_pl: summary.pl,
            open_positions: trades.iter().map(Trade::to_position).collect(),
        })
    }
}
