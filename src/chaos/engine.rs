//! ChaosEngine-FX scan-execute cycle
//!
//! One call to [`ChaosEngine::run_once`] walks the cycle state machine:
//!
//! ```text
//! market closed -> account -> drawdown halt -> consecutive-loss halt
//!   -> max trades -> volatility floor -> session / surge -> rank + execute
//! ```
//!
//! Every branch ends in a [`RunSummary`] with a terminal [`CycleReason`].
//! The engine owns its histories, daily anchor and P/L ledger exclusively;
//! the host serializes cycles by holding it behind a mutex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::config::ChaosConfig;
use super::strategy::{evaluate, ChaosSignal, FlatReason};
use crate::market::{
    in_session, is_forex_market_open, pip_factor, with_timeout, ExecutionSink, MarketDataProvider,
};
use crate::risk::{
    currency_exposure, drawdown_exceeded, dynamic_max_open_trades, exposure_bias,
    portfolio_risk, position_risk, position_size, stacks_exposure, ClosedTradeLedger,
    ClosedTradeRecord, DailyAnchor, ExposureBias,
};
use crate::types::{AccountSnapshot, OpenPosition, OrderOutcome, OrderRequest, Side};

/// Terminal state of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleReason {
    MarketClosed,
    AccountUnavailable,
    DrawdownHalt,
    ConsecutiveLossHalt,
    MaxTradesReached,
    LowVolatility,
    OutsideSession,
    Executed,
    NoValidSignals,
}

impl CycleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleReason::MarketClosed => "market_closed",
            CycleReason::AccountUnavailable => "account_unavailable",
            CycleReason::DrawdownHalt => "drawdown_halt",
            CycleReason::ConsecutiveLossHalt => "consecutive_loss_halt",
            CycleReason::MaxTradesReached => "max_trades_reached",
            CycleReason::LowVolatility => "low_volatility",
            CycleReason::OutsideSession => "outside_session",
            CycleReason::Executed => "executed",
            CycleReason::NoValidSignals => "no_valid_signals",
        }
    }
}

impl std::fmt::Display for CycleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a ranked candidate was not executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyOpen,
    Flat,
    LowConfidence,
    ExposureStacked,
    ZeroSize,
    PortfolioRiskLimit,
    MaxTradesReached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub instrument: String,
    pub reason: SkipReason,
    /// Set when the candidate was flat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_reason: Option<FlatReason>,
}

/// An order attempt made by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub side: Side,
    /// Signed: positive buys, negative sells
    pub units: i64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub rr: f64,
    pub confidence: f64,
    pub opportunity: f64,
    pub surge: bool,
    #[serde(flatten)]
    pub outcome: OrderOutcome,
}

/// Result of one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub equity: Option<f64>,
    pub reason: CycleReason,
    pub surge_mode: bool,
    /// Aggregate open risk in percent of equity
    pub portfolio_risk_pct: f64,
    pub currency_exposure: BTreeMap<String, f64>,
    pub anchor_bias: ExposureBias,
    /// Cap in force this cycle
    pub max_open_trades: usize,
    pub open_trades: usize,
    /// Orders built for candidates that cleared every gate, in submission order
    pub planned_orders: Vec<OrderRequest>,
    /// One per planned order, accepted or failed
    pub actions: Vec<TradeAction>,
    pub skipped: Vec<SkippedCandidate>,
    pub analyses: Vec<ChaosSignal>,
}

impl RunSummary {
    fn new(timestamp: DateTime<Utc>, reason: CycleReason) -> Self {
        Self {
            timestamp,
            equity: None,
            reason,
            surge_mode: false,
            portfolio_risk_pct: 0.0,
            currency_exposure: BTreeMap::new(),
            anchor_bias: ExposureBias::Neutral,
            max_open_trades: 0,
            open_trades: 0,
            planned_orders: Vec::new(),
            actions: Vec::new(),
            skipped: Vec::new(),
            analyses: Vec::new(),
        }
    }
}

/// Scan-execute engine over one broker
pub struct ChaosEngine<B> {
    broker: Arc<B>,
    config: ChaosConfig,
    anchor: Option<DailyAnchor>,
    ledger: ClosedTradeLedger,
    runs: VecDeque<RunSummary>,
    trades: VecDeque<TradeAction>,
}

impl<B> ChaosEngine<B>
where
    B: MarketDataProvider + ExecutionSink,
{
    pub fn new(broker: Arc<B>, config: ChaosConfig) -> Self {
        Self {
            broker,
            config,
            anchor: None,
            ledger: ClosedTradeLedger::default(),
            runs: VecDeque::new(),
            trades: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.runs.back()
    }

    /// Most recent runs, newest last
    pub fn recent_runs(&self, limit: usize) -> Vec<RunSummary> {
        let skip = self.runs.len().saturating_sub(limit);
        self.runs.iter().skip(skip).cloned().collect()
    }

    /// Accepted trades kept in memory, newest last
    pub fn recent_trades(&self) -> Vec<TradeAction> {
        self.trades.iter().cloned().collect()
    }

    pub fn daily_anchor(&self) -> Option<DailyAnchor> {
        self.anchor
    }

    pub fn closed_trades(&self) -> Vec<ClosedTradeRecord> {
        self.ledger.records().copied().collect()
    }

    fn record(&mut self, summary: RunSummary) -> RunSummary {
        info!(
            "Cycle {}: {} action(s), {} skipped",
            summary.reason,
            summary.actions.len(),
            summary.skipped.len()
        );
        if self.runs.len() >= self.config.run_history_limit.max(1) {
            self.runs.pop_front();
        }
        self.runs.push_back(summary.clone());
        summary
    }

    fn remember_trade(&mut self, action: TradeAction) {
        if self.trades.len() >= self.config.recent_trades_limit.max(1) {
            self.trades.pop_front();
        }
        self.trades.push_back(action);
    }

    /// Run one cycle against the wall clock
    pub async fn run_once(&mut self) -> RunSummary {
        self.run_once_at(Utc::now()).await
    }

    /// Run one cycle as of `now`
    pub async fn run_once_at(&mut self, now: DateTime<Utc>) -> RunSummary {
        if !is_forex_market_open(now) {
            info!("Forex market closed, skipping cycle");
            return self.record(RunSummary::new(now, CycleReason::MarketClosed));
        }

        let account = match with_timeout(self.config.io_timeout, "account", self.broker.account()).await {
            Ok(account) => account,
            Err(e) => {
                error!("Account unavailable: {:#}", e);
                return self.record(RunSummary::new(now, CycleReason::AccountUnavailable));
            }
        };

        let mut summary = self.account_summary(now, &account);

        let anchor = self
            .anchor
            .get_or_insert_with(|| DailyAnchor::new(now, account.equity));
        if anchor.refresh(now, account.equity) {
            info!(
                "New trading day {}: start-of-day equity {:.2}",
                anchor.date, anchor.equity
            );
        }
        let anchor = *anchor;

        if let Some(realized) = account.realized_pl {
            if let Some(closed) = self.ledger.observe(realized, now) {
                info!("Closed trade inferred: P/L {:+.2}", closed.pl_delta);
            }
        }

        let drawdown = drawdown_exceeded(account.equity, anchor.equity, self.config.max_drawdown_per_day);
        if drawdown.exceeded {
            warn!(
                "Daily drawdown {:.2}% beyond {:.2}%, no new entries today",
                drawdown.drawdown * 100.0,
                self.config.max_drawdown_per_day * 100.0
            );
            summary.reason = CycleReason::DrawdownHalt;
            return self.record(summary);
        }

        if self.ledger.consecutive_losses(self.config.consecutive_loss_limit) {
            warn!(
                "{} consecutive losing closes, halting entries",
                self.config.consecutive_loss_limit
            );
            summary.reason = CycleReason::ConsecutiveLossHalt;
            return self.record(summary);
        }

        if summary.open_trades >= summary.max_open_trades {
            info!(
                "Max open trades reached ({}/{})",
                summary.open_trades, summary.max_open_trades
            );
            summary.reason = CycleReason::MaxTradesReached;
            return self.record(summary);
        }

        summary.analyses = self.scan().await;

        let best_score = summary
            .analyses
            .iter()
            .filter_map(|a| a.volatility_score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))));

        if !best_score.is_some_and(|s| s >= self.config.min_volatility_score) {
            info!("No instrument above the volatility floor");
            summary.reason = CycleReason::LowVolatility;
            return self.record(summary);
        }

        if !in_session(now, self.config.session_start_hour, self.config.session_end_hour) {
            if best_score.is_some_and(|s| s >= self.config.extreme_score()) {
                warn!("Outside session with extreme volatility, surge mode on");
                summary.surge_mode = true;
            } else {
                info!("Outside trading session");
                summary.reason = CycleReason::OutsideSession;
                return self.record(summary);
            }
        }

        self.execute(now, &account, &mut summary).await;
        self.record(summary)
    }

    /// Summary fields that only depend on the account snapshot
    fn account_summary(&self, now: DateTime<Utc>, account: &AccountSnapshot) -> RunSummary {
        let risk = portfolio_risk(&account.open_positions, account.equity);
        let exposure = currency_exposure(&account.open_positions);

        let mut summary = RunSummary::new(now, CycleReason::NoValidSignals);
        summary.equity = Some(account.equity);
        summary.portfolio_risk_pct = risk * 100.0;
        summary.anchor_bias = exposure_bias(&exposure, &self.config.anchor_currency);
        summary.currency_exposure = exposure;
        summary.max_open_trades = dynamic_max_open_trades(
            risk,
            self.config.max_open_trades,
            self.config.max_open_trades_extended,
            self.config.max_portfolio_risk,
        );
        summary.open_trades = account.open_positions.len();

        info!(
            "Run cycle: equity {:.2}, open trades {}/{}, portfolio risk {:.2}%",
            account.equity, summary.open_trades, summary.max_open_trades, summary.portfolio_risk_pct
        );
        summary
    }

    /// Fetch and analyze every scanned instrument. Fetch failures become flat analyses.
    async fn scan(&self) -> Vec<ChaosSignal> {
        let mut analyses = Vec::new();
        for instrument in self.config.scanned_instruments() {
            let fetched = with_timeout(
                self.config.io_timeout,
                "candles",
                self.broker
                    .candles(instrument, self.config.granularity, self.config.candle_count),
            )
            .await;

            let analysis = match fetched {
                Ok(candles) => evaluate(instrument, &candles, &self.config),
                Err(e) => {
                    warn!("{}: candles unavailable: {:#}", instrument, e);
                    ChaosSignal::flat(instrument, FlatReason::DataUnavailable)
                }
            };

            match analysis.flat_reason() {
                Some(reason) => debug!("{}: FLAT ({})", instrument, reason),
                None => debug!(
                    "{}: candidate, confidence {:.2}, opportunity {:.2}",
                    instrument, analysis.confidence, analysis.opportunity
                ),
            }
            analyses.push(analysis);
        }
        analyses
    }

    /// Rank candidates and execute through the gates
    async fn execute(&mut self, now: DateTime<Utc>, account: &AccountSnapshot, summary: &mut RunSummary) {
        let equity = account.equity;
        let mut positions: Vec<OpenPosition> = account.open_positions.clone();
        let mut open_risk: f64 = positions.iter().map(position_risk).sum();
        let mut attempts = 0usize;
        let mut passed_filters = false;

        let mut ranked: Vec<&ChaosSignal> = summary.analyses.iter().collect();
        ranked.sort_by(|a, b| b.opportunity.total_cmp(&a.opportunity));

        let mut actions = Vec::new();
        let mut skipped = Vec::new();
        let mut skip = |analysis: &ChaosSignal, reason: SkipReason| {
            debug!("{}: skipped ({:?})", analysis.instrument, reason);
            skipped.push(SkippedCandidate {
                instrument: analysis.instrument.clone(),
                reason,
                flat_reason: analysis.flat_reason(),
            });
        };

        for analysis in ranked {
            if attempts >= self.config.top_k {
                break;
            }
            if positions.iter().any(|p| p.instrument == analysis.instrument) {
                skip(analysis, SkipReason::AlreadyOpen);
                continue;
            }
            let Some(setup) = analysis.setup() else {
                skip(analysis, SkipReason::Flat);
                continue;
            };
            if analysis.confidence < self.config.min_confidence {
                skip(analysis, SkipReason::LowConfidence);
                continue;
            }
            passed_filters = true;

            if stacks_exposure(
                &positions,
                &analysis.instrument,
                setup.side,
                &self.config.anchor_currency,
                self.config.max_same_direction_exposure,
            ) {
                skip(analysis, SkipReason::ExposureStacked);
                continue;
            }

            let mut units = position_size(
                equity,
                self.config.risk_per_trade,
                setup.entry,
                setup.stop_loss,
                pip_factor(&analysis.instrument),
            );
            if summary.surge_mode {
                units = (units as f64 * self.config.surge_size_factor).floor() as u64;
            }
            if units == 0 {
                skip(analysis, SkipReason::ZeroSize);
                continue;
            }

            let trade_risk = units as f64 * (setup.entry - setup.stop_loss).abs();
            let projected = (open_risk + trade_risk) / equity;
            if projected > self.config.max_portfolio_risk {
                debug!(
                    "{}: projected portfolio risk {:.2}% above {:.2}%",
                    analysis.instrument,
                    projected * 100.0,
                    self.config.max_portfolio_risk * 100.0
                );
                skip(analysis, SkipReason::PortfolioRiskLimit);
                continue;
            }

            if positions.len() >= summary.max_open_trades {
                skip(analysis, SkipReason::MaxTradesReached);
                break;
            }

            let order = OrderRequest {
                instrument: analysis.instrument.clone(),
                units: setup.side.signed_units(units),
                entry: setup.entry,
                stop_loss: setup.stop_loss,
                take_profit: setup.take_profit,
            };
            attempts += 1;
            summary.planned_orders.push(order.clone());

            let outcome = match with_timeout(
                self.config.io_timeout,
                "order submission",
                self.broker.submit_order(&order),
            )
            .await
            {
                Ok(ack) => OrderOutcome::Accepted(ack),
                Err(e) => {
                    warn!("{}: order failed: {:#}", order.instrument, e);
                    OrderOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            };

            let action = TradeAction {
                timestamp: now,
                instrument: order.instrument.clone(),
                side: setup.side,
                units: order.units,
                entry: setup.entry,
                stop_loss: setup.stop_loss,
                take_profit: setup.take_profit,
                rr: setup.rr,
                confidence: analysis.confidence,
                opportunity: analysis.opportunity,
                surge: summary.surge_mode,
                outcome,
            };

            if action.outcome.is_accepted() {
                info!(
                    "Opened {} {} units={} SL={:.5} TP={:.5} RR={:.2}",
                    action.side, action.instrument, action.units, action.stop_loss, action.take_profit, action.rr
                );
                positions.push(OpenPosition {
                    instrument: order.instrument.clone(),
                    signed_units: order.units,
                    entry_price: order.entry,
                    stop_loss_price: Some(order.stop_loss),
                });
                open_risk += trade_risk;
            }
            actions.push(action);
        }

        for action in actions.iter().filter(|a| a.outcome.is_accepted()) {
            self.remember_trade(action.clone());
        }

        summary.reason = if passed_filters {
            CycleReason::Executed
        } else {
            CycleReason::NoValidSignals
        };
        summary.actions = actions;
        summary.skipped = skipped;
    }
}
