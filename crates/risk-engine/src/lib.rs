//! Risk Engine
//!
//! Position sizing, volatility-scaled stop/take thresholds, trailing-stop
//! monitoring, and portfolio-level circuit breakers.

pub mod breaker;
pub mod monitor;
pub mod sizing;
pub mod thresholds;

use std::sync::Arc;

use autotrade_core::broker::BrokerPort;
use autotrade_core::clock::Clock;
use autotrade_core::config::RiskConfig;
use autotrade_core::store::TradeStore;
use autotrade_core::types::{Candle, Market, Position};
use rust_decimal::Decimal;

pub use breaker::{CircuitBreaker, TradeDenial};
pub use monitor::{PositionCheck, PositionMonitor};
pub use sizing::{diversification_slots, PositionSizer};
pub use thresholds::{average_true_range, ThresholdBook, Thresholds};

/// Facade bundling the risk components behind the calls the execution
/// engine makes.
pub struct RiskEngine {
    breaker: CircuitBreaker,
    sizer: PositionSizer,
    thresholds: Arc<ThresholdBook>,
    monitor: PositionMonitor,
}

impl RiskEngine {
    pub fn new(
        config: RiskConfig,
        broker: Arc<dyn BrokerPort>,
        store: Arc<dyn TradeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let thresholds = Arc::new(ThresholdBook::new(config.clone()));
        Self {
            breaker: CircuitBreaker::new(
                config.clone(),
                Arc::clone(&broker),
                store,
                Arc::clone(&clock),
            ),
            sizer: PositionSizer::new(config.clone(), broker, clock),
            monitor: PositionMonitor::new(&config, Arc::clone(&thresholds)),
            thresholds,
        }
    }

    /// Whether a new trade may be opened right now.
    pub async fn can_trade(&self) -> Result<(), TradeDenial> {
        self.breaker.can_trade().await
    }

    /// Whole shares the budget policy allows buying at `price`.
    pub async fn buy_quantity(&self, symbol: &str, price: Decimal, market: Market) -> i64 {
        self.sizer.buy_quantity(symbol, price, market).await
    }

    /// Refresh the symbol's volatility-derived stop/take pair.
    pub fn update_dynamic_thresholds(&self, symbol: &str, series: &[Candle]) {
        self.thresholds.update_dynamic(symbol, series);
    }

    /// Effective thresholds currently applied to a symbol.
    pub fn thresholds_for(&self, symbol: &str) -> Thresholds {
        self.thresholds.for_symbol(symbol)
    }

    /// Sweep open positions for stop-loss / take-profit candidates.
    pub fn check_positions(&self, positions: &[Position]) -> PositionCheck {
        self.monitor.check_positions(positions)
    }

    /// Account a realized stop-loss against the losing-streak breaker.
    pub async fn record_stop_loss(&self) {
        self.breaker.record_stop_loss().await;
    }

    /// Account a realized profit; resets the losing streak.
    pub async fn record_profit(&self) {
        self.breaker.record_profit().await;
    }

    pub async fn is_halted(&self) -> bool {
        self.breaker.is_halted().await
    }
}
