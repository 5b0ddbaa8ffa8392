//! Order types exchanged with the broker port.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Market;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
    Cancel,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
            OrderSide::Cancel => "cancel",
        }
    }
}

/// A request the execution engine is about to hand to the broker.
///
/// A price of exactly zero means "at market". Intents are engine-internal;
/// only the resulting [`OrderResult`] is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: Uuid,
    pub symbol: String,
    pub market: Market,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn new(
        symbol: impl Into<String>,
        market: Market,
        side: OrderSide,
        quantity: i64,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            market,
            side,
            quantity,
            price,
            created_at: now,
        }
    }

    /// Market order (price zero) shorthand.
    pub fn market_order(
        symbol: impl Into<String>,
        market: Market,
        side: OrderSide,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(symbol, market, side, quantity, Decimal::ZERO, now)
    }

    pub fn is_market(&self) -> bool {
        self.price.is_zero()
    }
}

/// Broker response to an order attempt. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    /// Broker-assigned order number; empty when the order never reached the book.
    pub order_id: String,
    pub message: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
}

impl OrderResult {
    /// An accepted order.
    pub fn accepted(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        Self {
            success: true,
            order_id: order_id.into(),
            message: String::new(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
        }
    }

    /// A rejected order with the broker's reason.
    pub fn rejected(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: i64,
        price: Decimal,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            order_id: String::new(),
            message: message.into(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
        }
    }
}
