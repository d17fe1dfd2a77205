// Library crate - exports the strategy engines, risk engine and broker adapters

pub mod types;
pub mod market;
pub mod indicators;
pub mod risk;
pub mod liquidity;
pub mod chaos;
pub mod paper;
pub mod oanda;
pub mod broker;
pub mod api;

// Re-export commonly used types
pub use types::*;
pub use market::{with_timeout, ExecutionSink, MarketDataProvider};
pub use broker::Broker;
pub use paper::PaperBroker;
