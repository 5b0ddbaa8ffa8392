//! Engine-private tracking of unfilled limit orders.

use autotrade_core::types::{Market, OrderSide};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Suffix keeping a take-profit leg apart from an entry leg on the same
/// symbol.
const TAKE_PROFIT_SUFFIX: &str = "_tp";

/// Tracking key for an entry order.
pub fn entry_key(symbol: &str) -> String {
    symbol.to_string()
}

/// Tracking key for a take-profit order.
pub fn take_profit_key(symbol: &str) -> String {
    format!("{symbol}{TAKE_PROFIT_SUFFIX}")
}

/// A limit order the broker accepted and has not been seen to fill.
///
/// A soft commitment: the timeout sweep cancels it best-effort and drops
/// the record either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLimitOrder {
    pub order_id: String,
    pub symbol: String,
    pub market: Market,
    pub side: OrderSide,
    pub quantity: i64,
    pub limit_price: Decimal,
    pub placed_at: DateTime<Utc>,
    pub strategy: String,
}

/// Pending orders keyed by symbol (entry) or symbol + "_tp" (take-profit).
///
/// At most one pending order exists per key at a time; `register` refuses
/// a second.
#[derive(Debug, Default)]
pub struct PendingOrderBook {
    orders: DashMap<String, PendingLimitOrder>,
}

impl PendingOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted limit order. Returns false, changing nothing,
    /// when the key already holds one.
    pub fn register(&self, key: String, order: PendingLimitOrder) -> bool {
        match self.orders.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(order);
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.orders.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<PendingLimitOrder> {
        self.orders.get(key).map(|entry| entry.clone())
    }

    pub fn remove(&self, key: &str) -> Option<PendingLimitOrder> {
        self.orders.remove(key).map(|(_, order)| order)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders strictly older than `timeout_sec` at `now`.
    pub fn expired(&self, now: DateTime<Utc>, timeout_sec: i64) -> Vec<(String, PendingLimitOrder)> {
        self.orders
            .iter()
            .filter(|entry| (now - entry.value().placed_at).num_seconds() > timeout_sec)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
