//! Tick orchestrator for the liquidity sweep strategy
//!
//! One tick: market-hours guard, signal generation, sizing, per-symbol
//! cooldown, optional execution. The only state carried between ticks is
//! the cooldown map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::LiquidityConfig;
use super::strategy::generate_signals;
use crate::market::{
    is_forex_market_open, is_metal, pip_factor, with_timeout, ExecutionSink, MarketDataProvider,
    DEFAULT_IO_TIMEOUT,
};
use crate::risk::position_size;
use crate::types::{OrderOutcome, OrderRequest, Signal};

/// Sizing and execution settings for the tick loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Risk per trade in percent of equity (0.5 = 0.5%)
    pub risk_pct_per_trade: f64,

    /// Submit orders, or only report what would be sent
    pub execute_orders: bool,

    /// Minimum time between two orders on the same symbol
    pub cooldown: Duration,

    /// Unit ceiling for currency pairs
    pub max_units_fx: u64,

    /// Unit ceiling for metals
    pub max_units_metal: u64,

    /// Equity assumed when the account can't be read
    pub fallback_balance: f64,

    /// Bound on each provider/sink call
    pub io_timeout: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            risk_pct_per_trade: 0.5,
            execute_orders: false,
            cooldown: Duration::from_secs(5 * 60),
            max_units_fx: 500_000,
            max_units_metal: 500,
            fallback_balance: 10_000.0,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl TickConfig {
    pub fn max_units(&self, symbol: &str) -> u64 {
        if is_metal(symbol) {
            self.max_units_metal
        } else {
            self.max_units_fx
        }
    }
}

/// An order built from a signal, before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedOrder {
    pub order: OrderRequest,
    /// Execution skipped because the symbol traded recently
    pub cooldown_active: bool,
}

/// A submission attempt and what the venue said
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedOrder {
    pub order: OrderRequest,
    #[serde(flatten)]
    pub outcome: OrderOutcome,
}

/// Everything one tick saw and did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResult {
    pub timestamp: DateTime<Utc>,
    pub market_open: bool,
    pub equity: Option<f64>,
    pub signals: Vec<Signal>,
    pub planned_orders: Vec<PlannedOrder>,
    pub executed_orders: Vec<ExecutedOrder>,
}

impl TickResult {
    fn empty(timestamp: DateTime<Utc>, market_open: bool) -> Self {
        Self {
            timestamp,
            market_open,
            equity: None,
            signals: Vec::new(),
            planned_orders: Vec::new(),
            executed_orders: Vec::new(),
        }
    }
}

/// Drives the liquidity strategy against one broker
pub struct TickEngine<B> {
    broker: Arc<B>,
    strategy: LiquidityConfig,
    config: TickConfig,
    /// Symbol -> monotonic time of the last submission attempt
    last_order: HashMap<String, Instant>,
}

impl<B> TickEngine<B>
where
    B: MarketDataProvider + ExecutionSink,
{
    pub fn new(broker: Arc<B>, strategy: LiquidityConfig, config: TickConfig) -> Self {
        Self {
            broker,
            strategy,
            config,
            last_order: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn strategy(&self) -> &LiquidityConfig {
        &self.strategy
    }

    fn cooldown_active(&self, symbol: &str, now: Instant) -> bool {
        self.last_order
            .get(symbol)
            .map(|last| now.saturating_duration_since(*last) < self.config.cooldown)
            .unwrap_or(false)
    }

    async fn equity(&self) -> f64 {
        match with_timeout(self.config.io_timeout, "account", self.broker.account()).await {
            Ok(account) if account.equity > 0.0 => account.equity,
            Ok(account) => {
                warn!(
                    "Account equity {:.2} not usable, sizing on {:.2}",
                    account.equity, self.config.fallback_balance
                );
                self.config.fallback_balance
            }
            Err(e) => {
                warn!(
                    "Account unavailable ({:#}), sizing on {:.2}",
                    e, self.config.fallback_balance
                );
                self.config.fallback_balance
            }
        }
    }

    fn plan(&self, signal: &Signal, equity: f64) -> Option<OrderRequest> {
        let pip = pip_factor(&signal.symbol);
        let sized = position_size(
            equity,
            self.config.risk_pct_per_trade / 100.0,
            signal.entry,
            signal.stop_loss,
            pip,
        );
        let units = sized.min(self.config.max_units(&signal.symbol));
        if units == 0 {
            debug!("{}: sized to zero units", signal.symbol);
            return None;
        }
        if units < sized {
            debug!("{}: {} units clamped to {}", signal.symbol, sized, units);
        }

        Some(OrderRequest {
            instrument: signal.symbol.clone(),
            units: signal.side.signed_units(units),
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
        })
    }

    /// Run one tick against the wall clock
    pub async fn run_tick(&mut self) -> TickResult {
        self.run_tick_at(Utc::now(), Instant::now()).await
    }

    /// Run one tick at the given wall-clock and monotonic instants
    pub async fn run_tick_at(&mut self, now: DateTime<Utc>, mono: Instant) -> TickResult {
        if !is_forex_market_open(now) {
            info!("Forex market closed, skipping tick");
            return TickResult::empty(now, false);
        }

        let mut result = TickResult::empty(now, true);
        result.signals =
            generate_signals(self.broker.as_ref(), &self.strategy, self.config.io_timeout).await;
        if result.signals.is_empty() {
            debug!("No liquidity signals this tick");
            return result;
        }

        let equity = self.equity().await;
        result.equity = Some(equity);

        for signal in &result.signals {
            let Some(order) = self.plan(signal, equity) else {
                continue;
            };

            let cooling = self.cooldown_active(&signal.symbol, mono);
            result.planned_orders.push(PlannedOrder {
                order: order.clone(),
                cooldown_active: cooling,
            });

            if cooling {
                info!("{}: cooldown active, not sending", signal.symbol);
                continue;
            }
            if !self.config.execute_orders {
                continue;
            }

            let outcome = match with_timeout(
                self.config.io_timeout,
                "order submission",
                self.broker.submit_order(&order),
            )
            .await
            {
                Ok(ack) => {
                    info!(
                        "{}: order {} units accepted ({})",
                        order.instrument, order.units, ack.status
                    );
                    OrderOutcome::Accepted(ack)
                }
                Err(e) => {
                    warn!("{}: order failed: {:#}", order.instrument, e);
                    OrderOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            };

            // Failures start the cooldown too
            self.last_order.insert(signal.symbol.clone(), mono);
            result.executed_orders.push(ExecutedOrder { order, outcome });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liquidity::strategy::fixtures::{pdl_sweep, uptrend};
    use crate::types::{AccountSnapshot, Candle, OrderAck, Quote, Timeframe};
    use anyhow::{anyhow, Result};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// EURGBP has a clean setup, every other pair has no history
    struct MockBroker {
        equity: Option<f64>,
        reject: bool,
        submissions: AtomicUsize,
    }

    impl MockBroker {
        fn new(equity: Option<f64>, reject: bool) -> Self {
            Self {
                equity,
                reject,
                submissions: AtomicUsize::new(0),
            }
        }
    }

    impl MarketDataProvider for MockBroker {
        async fn candles(
            &self,
            instrument: &str,
            timeframe: Timeframe,
            _limit: usize,
        ) -> Result<Vec<Candle>> {
            if instrument != "EURGBP" {
                return Ok(Vec::new());
            }
            Ok(match timeframe {
                Timeframe::M5 => pdl_sweep(),
                _ => uptrend(60, 4),
            })
        }

        async fn quote(&self, _instrument: &str) -> Result<Quote> {
            Ok(Quote {
                bid: 0.85115,
                ask: 0.85125,
            })
        }
    }

    impl ExecutionSink for MockBroker {
        async fn submit_order(&self, _order: &OrderRequest) -> Result<OrderAck> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(anyhow!("insufficient margin"));
            }
            Ok(OrderAck {
                order_id: Some("1".to_string()),
                status: "filled".to_string(),
                raw: serde_json::Value::Null,
            })
        }

        async fn account(&self) -> Result<AccountSnapshot> {
            match self.equity {
                Some(equity) => Ok(AccountSnapshot {
                    equity,
                    realized_pl: None,
                    open_positions: Vec::new(),
                }),
                None => Err(anyhow!("account endpoint down")),
            }
        }
    }

    fn wednesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap()
    }

    fn executing() -> TickConfig {
        TickConfig {
            execute_orders: true,
            ..TickConfig::default()
        }
    }

    #[tokio::test]
    async fn test_market_closed_returns_empty() {
        let broker = Arc::new(MockBroker::new(Some(10_000.0), false));
        let mut engine = TickEngine::new(broker.clone(), LiquidityConfig::default(), executing());

        let saturday = Utc.with_ymd_and_hms(2025, 6, 7, 12, 0, 0).unwrap();
        let result = engine.run_tick_at(saturday, Instant::now()).await;

        assert!(!result.market_open);
        assert!(result.signals.is_empty());
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sizing_uses_risk_percent_and_fallback_balance() {
        let broker = Arc::new(MockBroker::new(None, false));
        let mut engine = TickEngine::new(broker, LiquidityConfig::default(), TickConfig::default());

        let result = engine.run_tick_at(wednesday(), Instant::now()).await;

        assert_eq!(result.signals.len(), 1);
        assert_eq!(result.equity, Some(10_000.0));
        assert_eq!(result.planned_orders.len(), 1);
        // 50 risked over a 13 pip stop
        let units = result.planned_orders[0].order.units;
        assert!((38_460..=38_462).contains(&units));
        // Dry run by default
        assert!(result.executed_orders.is_empty());
    }

    #[tokio::test]
    async fn test_unit_ceiling() {
        let broker = Arc::new(MockBroker::new(Some(10_000_000.0), false));
        let mut engine = TickEngine::new(broker, LiquidityConfig::default(), TickConfig::default());

        let result = engine.run_tick_at(wednesday(), Instant::now()).await;
        assert_eq!(result.planned_orders[0].order.units, 500_000);
    }

    #[tokio::test]
    async fn test_failed_order_still_starts_cooldown() {
        let broker = Arc::new(MockBroker::new(Some(10_000.0), true));
        let mut engine = TickEngine::new(broker.clone(), LiquidityConfig::default(), executing());
        let start = Instant::now();

        let first = engine.run_tick_at(wednesday(), start).await;
        assert_eq!(first.executed_orders.len(), 1);
        assert!(!first.executed_orders[0].outcome.is_accepted());
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 1);

        let later = wednesday() + chrono::Duration::seconds(60);
        let second = engine
            .run_tick_at(later, start + Duration::from_secs(60))
            .await;
        assert_eq!(second.signals.len(), 1);
        assert!(second.planned_orders[0].cooldown_active);
        assert!(second.executed_orders.is_empty());
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 1);

        // Window elapsed
        let third = engine
            .run_tick_at(later, start + Duration::from_secs(301))
            .await;
        assert_eq!(third.executed_orders.len(), 1);
        assert_eq!(broker.submissions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_accepted_order_reports_ack() {
        let broker = Arc::new(MockBroker::new(Some(10_000.0), false));
        let mut engine = TickEngine::new(broker, LiquidityConfig::default(), executing());

        let result = engine.run_tick_at(wednesday(), Instant::now()).await;
        let executed = &result.executed_orders[0];
        assert!(executed.outcome.is_accepted());
        assert!(executed.order.units > 0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["executed_orders"][0]["outcome"], "accepted");
    }
}
