//! Risk engine: sizing, drawdown, portfolio risk, kill switch, exposure
//!
//! Pure helpers plus two small stateful pieces ([`DailyAnchor`],
//! [`ClosedTradeLedger`]) owned by the ChaosFX engine. Nothing here does I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::market::split_currencies;
use crate::types::{OpenPosition, Side};

/// Closed-trade records kept for the kill switch
pub const LEDGER_CAPACITY: usize = 100;

/// Units risking `equity * risk_fraction` over the stop distance.
///
/// The stop distance is measured in pips and priced at one `pip` per unit
/// per pip. Floored, never negative. A zero stop distance sizes to zero.
pub fn position_size(equity: f64, risk_fraction: f64, entry: f64, stop_loss: f64, pip: f64) -> u64 {
    if pip <= 0.0 || equity <= 0.0 || risk_fraction <= 0.0 {
        return 0;
    }
    let stop_pips = (entry - stop_loss).abs() / pip;
    if stop_pips <= 0.0 || !stop_pips.is_finite() {
        return 0;
    }

    let risk_amount = equity * risk_fraction;
    let units = (risk_amount / (stop_pips * pip)).floor();
    if units.is_finite() && units > 0.0 {
        units as u64
    } else {
        0
    }
}

/// Result of a daily drawdown check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownCheck {
    pub exceeded: bool,
    /// Fractional drawdown from the anchor (negative when above it)
    pub drawdown: f64,
}

/// Compare equity against the start-of-day anchor
pub fn drawdown_exceeded(equity: f64, anchor: f64, max_drawdown: f64) -> DrawdownCheck {
    if anchor <= 0.0 {
        return DrawdownCheck {
            exceeded: false,
            drawdown: 0.0,
        };
    }
    let drawdown = (anchor - equity) / anchor;
    DrawdownCheck {
        exceeded: drawdown > max_drawdown,
        drawdown,
    }
}

/// Start-of-day equity, reset once per UTC date change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAnchor {
    pub date: NaiveDate,
    pub equity: f64,
}

impl DailyAnchor {
    pub fn new(now: DateTime<Utc>, equity: f64) -> Self {
        Self {
            date: now.date_naive(),
            equity,
        }
    }

    /// Re-anchor on a new UTC date. Returns true when the anchor moved.
    pub fn refresh(&mut self, now: DateTime<Utc>, equity: f64) -> bool {
        let today = now.date_naive();
        if today == self.date {
            return false;
        }
        self.date = today;
        self.equity = equity;
        true
    }
}

/// Risk of one position in account currency: `|units| * |entry - stop|`.
/// A position without a stop contributes nothing.
pub fn position_risk(position: &OpenPosition) -> f64 {
    match position.stop_loss_price {
        Some(stop) => position.signed_units.unsigned_abs() as f64 * (position.entry_price - stop).abs(),
        None => 0.0,
    }
}

/// Aggregate open risk as a fraction of equity
pub fn portfolio_risk(positions: &[OpenPosition], equity: f64) -> f64 {
    if equity <= 0.0 {
        return 0.0;
    }
    positions.iter().map(position_risk).sum::<f64>() / equity
}

/// Base cap, raised to the extended cap while portfolio risk stays at or under the ceiling
pub fn dynamic_max_open_trades(
    portfolio_risk: f64,
    base: usize,
    extended: usize,
    max_portfolio_risk: f64,
) -> usize {
    if portfolio_risk <= max_portfolio_risk {
        base.max(extended)
    } else {
        base
    }
}

/// A change in cumulative realized P/L between two account polls.
///
/// Treated as one closed trade. Several closes, partial fills and
/// financing adjustments between polls all collapse into one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosedTradeRecord {
    pub cumulative_pl: f64,
    pub pl_delta: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded ledger of inferred trade closures
#[derive(Debug, Clone)]
pub struct ClosedTradeLedger {
    records: VecDeque<ClosedTradeRecord>,
    last_cumulative: Option<f64>,
    capacity: usize,
}

impl Default for ClosedTradeLedger {
    fn default() -> Self {
        Self::new(LEDGER_CAPACITY)
    }
}

impl ClosedTradeLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            last_cumulative: None,
            capacity: capacity.max(1),
        }
    }

    /// Feed the latest cumulative realized P/L.
    ///
    /// The first observation only sets the baseline. Afterwards any change
    /// appends a record.
    pub fn observe(&mut self, cumulative_pl: f64, at: DateTime<Utc>) -> Option<ClosedTradeRecord> {
        let previous = self.last_cumulative.replace(cumulative_pl)?;
        let delta = cumulative_pl - previous;
        if delta == 0.0 {
            return None;
        }

        let record = ClosedTradeRecord {
            cumulative_pl,
            pl_delta: delta,
            timestamp: at,
        };
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        Some(record)
    }

    /// True when the last `limit` records are all strict losses
    pub fn consecutive_losses(&self, limit: usize) -> bool {
        if limit == 0 || self.records.len() < limit {
            return false;
        }
        self.records.iter().rev().take(limit).all(|r| r.pl_delta < 0.0)
    }

    pub fn records(&self) -> impl Iterator<Item = &ClosedTradeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Net signed units per currency across open positions.
///
/// Long base/quote adds units to base and subtracts them from quote; short
/// is the inverse. Instruments that don't split into two currencies
/// (indices, CFDs) are ignored.
pub fn currency_exposure(positions: &[OpenPosition]) -> BTreeMap<String, f64> {
    let mut exposure = BTreeMap::new();
    for position in positions {
        let Some((base, quote)) = split_currencies(&position.instrument) else {
            continue;
        };
        let units = position.signed_units as f64;
        *exposure.entry(base).or_insert(0.0) += units;
        *exposure.entry(quote).or_insert(0.0) -= units;
    }
    exposure
}

/// Directional lean on a single currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureBias {
    Long,
    Short,
    Neutral,
}

pub fn exposure_bias(exposure: &BTreeMap<String, f64>, currency: &str) -> ExposureBias {
    match exposure.get(currency).copied().unwrap_or(0.0) {
        v if v > 0.0 => ExposureBias::Long,
        v if v < 0.0 => ExposureBias::Short,
        _ => ExposureBias::Neutral,
    }
}

/// Sign of a trade's exposure to `currency`: +1, -1, or 0 if not involved
pub fn exposure_direction(instrument: &str, units: i64, currency: &str) -> f64 {
    let Some((base, quote)) = split_currencies(instrument) else {
        return 0.0;
    };
    let sign = (units as f64).signum();
    if units == 0 {
        0.0
    } else if base == currency {
        sign
    } else if quote == currency {
        -sign
    } else {
        0.0
    }
}

/// True when adding a `side` trade on `instrument` would stack at least
/// `max_same_direction` existing same-direction exposures on `anchor`.
pub fn stacks_exposure(
    positions: &[OpenPosition],
    instrument: &str,
    side: Side,
    anchor: &str,
    max_same_direction: usize,
) -> bool {
    let new_direction = exposure_direction(instrument, side.signed_units(1), anchor);
    if new_direction == 0.0 {
        return false;
    }
    let same = positions
        .iter()
        .filter(|p| exposure_direction(&p.instrument, p.signed_units, anchor) == new_direction)
        .count();
    same >= max_same_direction
}

/// R multiple of a closed trade. `None` when the stop sits at entry.
pub fn r_multiple(side: Side, entry: f64, stop_loss: f64, exit: f64) -> Option<f64> {
    let risk = (entry - stop_loss) * side.sign();
    if risk == 0.0 {
        return None;
    }
    Some((exit - entry) * side.sign() / risk)
}
