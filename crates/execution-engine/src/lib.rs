//! Execution Engine
//!
//! Turns strategy signals into broker orders: split entries and exits,
//! limit pricing with timeout-based cancellation, duplicate-signal
//! suppression, and trade persistence.

pub mod executor;
pub mod pending;
pub mod stages;

pub use executor::TradeExecutor;
pub use pending::{PendingLimitOrder, PendingOrderBook};
pub use stages::{PositionStage, StageBook};
