//! Persistence contract for trade and signal history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Market, OrderSide, Signal};

/// A persisted order attempt. `success` mirrors the broker's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub name: String,
    pub market: Market,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub order_id: String,
    pub strategy: String,
    pub success: bool,
    pub message: String,
    pub executed_at: DateTime<Utc>,
}

/// A persisted strategy signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub market: Market,
    pub strategy: String,
    pub signal: Signal,
    pub strength: f64,
    pub detail: String,
    pub emitted_at: DateTime<Utc>,
}

/// Trade/signal history store.
///
/// The engine writes trades and signals, and reads back only today's trade
/// count for the daily cap; every other risk input is held in memory.
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn save_trade(&self, trade: &TradeRecord) -> Result<()>;

    async fn save_signal(&self, signal: &SignalRecord) -> Result<()>;

    /// Number of successful trades recorded today.
    async fn trade_count_today(&self) -> Result<u32>;

    async fn trades_today(&self) -> Result<Vec<TradeRecord>>;
}
