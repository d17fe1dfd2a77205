//! Broker selection for the host process

use anyhow::Result;

use crate::market::{ExecutionSink, MarketDataProvider};
use crate::oanda::OandaClient;
use crate::paper::PaperBroker;
use crate::types::{AccountSnapshot, Candle, OrderAck, OrderRequest, Quote, Timeframe};

/// The venue both engines run against
pub enum Broker {
    Paper(PaperBroker),
    Oanda(OandaClient),
}

impl Broker {
    pub fn name(&self) -> &'static str {
        match self {
            Broker::Paper(_) => "paper",
            Broker::Oanda(_) => "oanda",
        }
    }
}

impl MarketDataProvider for Broker {
    async fn candles(&self, instrument: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        match self {
            Broker::Paper(paper) => paper.candles(instrument, timeframe, limit).await,
            Broker::Oanda(oanda) => oanda.candles(instrument, timeframe, limit).await,
        }
    }

    async fn quote(&self, instrument: &str) -> Result<Quote> {
        match self {
            Broker::Paper(paper) => paper.quote(instrument).await,
            Broker::Oanda(oanda) => oanda.quote(instrument).await,
        }
    }
}

impl ExecutionSink for Broker {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        match self {
            Broker::Paper(paper) => paper.submit_order(order).await,
            Broker::Oanda(oanda) => oanda.submit_order(order).await,
        }
    }

    async fn account(&self) -> Result<AccountSnapshot> {
        match self {
            Broker::Paper(paper) => paper.account().await,
            Broker::Oanda(oanda) => oanda.account().await,
        }
    }
}
