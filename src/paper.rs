//! Paper broker
//!
//! Safe default sink: no market data, no venue. Orders are logged and
//! acknowledged as `simulated` so the engines can be exercised end to end
//! without credentials.

use anyhow::Result;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::market::{ExecutionSink, MarketDataProvider};
use crate::types::{AccountSnapshot, Candle, OrderAck, OrderRequest, Quote, Timeframe};

pub const DEFAULT_PAPER_EQUITY: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct PaperBroker {
    equity: f64,
}

impl PaperBroker {
    pub fn new(equity: f64) -> Self {
        Self { equity }
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(DEFAULT_PAPER_EQUITY)
    }
}

impl MarketDataProvider for PaperBroker {
    async fn candles(&self, _instrument: &str, _timeframe: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn quote(&self, _instrument: &str) -> Result<Quote> {
        Ok(Quote { bid: 0.0, ask: 0.0 })
    }
}

impl ExecutionSink for PaperBroker {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let id = Uuid::new_v4().to_string();
        info!(
            "[paper] {} units={} entry={:.5} SL={:.5} TP={:.5} id={}",
            order.instrument, order.units, order.entry, order.stop_loss, order.take_profit, id
        );
        Ok(OrderAck {
            order_id: Some(id),
            status: "simulated".to_string(),
            raw: json!({ "detail": "No real broker is configured." }),
        })
    }

    async fn account(&self) -> Result<AccountSnapshot> {
        Ok(AccountSnapshot {
            equity: self.equity,
            realized_pl: Some(0.0),
            open_positions: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_market_data() {
        let broker = PaperBroker::default();
        assert!(broker.candles("EURGBP", Timeframe::M5, 200).await.unwrap().is_empty());
        let quote = broker.quote("EURGBP").await.unwrap();
        assert_eq!(quote.spread(), 0.0);
    }

    #[tokio::test]
    async fn test_orders_simulated() {
        let broker = PaperBroker::new(25_000.0);
        let order = OrderRequest {
            instrument: "EUR_USD".to_string(),
            units: 1000,
            entry: 1.1,
            stop_loss: 1.095,
            take_profit: 1.115,
        };
        let first = broker.submit_order(&order).await.unwrap();
        let second = broker.submit_order(&order).await.unwrap();
        assert_eq!(first.status, "simulated");
        assert!(first.order_id.is_some());
        assert_ne!(first.order_id, second.order_id);

        let account = broker.account().await.unwrap();
        assert_eq!(account.equity, 25_000.0);
        assert!(account.open_positions.is_empty());
    }
}
