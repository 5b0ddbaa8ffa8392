//! Account snapshot types returned by the broker port.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Market;

/// A held position as reported by the broker.
///
/// Read-only to the engine: it materializes when a fill occurs at the broker
/// and disappears when the held quantity reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub name: String,
    pub market: Market,
    pub quantity: i64,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub pnl_amount: Decimal,
    /// Unrealized return in percent of the average cost.
    pub pnl_pct: Decimal,
}

/// Account-level cash figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashBalance {
    /// Total account valuation (cash + holdings).
    pub total_eval: Decimal,
    /// Orderable cash.
    pub cash: Decimal,
    /// Valuation of the stock holdings.
    pub stock_eval: Decimal,
    /// Today's realized P&L.
    pub total_pnl: Decimal,
}

/// Latest quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
    pub change_pct: Decimal,
}

/// One OHLCV bar of daily history, oldest-first in a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}
