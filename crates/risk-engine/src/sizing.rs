//! Position sizing from account equity and the budget policy.

use std::sync::Arc;

use autotrade_core::broker::BrokerPort;
use autotrade_core::cache::TtlCache;
use autotrade_core::clock::Clock;
use autotrade_core::config::RiskConfig;
use autotrade_core::types::{CashBalance, Market};
use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info};

/// How long a cash snapshot stays fresh.
const CASH_TTL_SECS: i64 = 30;

/// Number of concurrent positions a budget supports.
///
/// Smaller accounts concentrate into fewer, larger positions; larger
/// accounts diversify. The schedule, in the account's base currency (KRW):
///
/// | budget          | slots |
/// |-----------------|-------|
/// | < 10,000,000    | 2     |
/// | < 30,000,000    | 3     |
/// | < 50,000,000    | 5     |
/// | < 100,000,000   | 7     |
/// | >= 100,000,000  | 10    |
pub fn diversification_slots(budget: Decimal) -> u32 {
    if budget < Decimal::new(10_000_000, 0) {
        2
    } else if budget < Decimal::new(30_000_000, 0) {
        3
    } else if budget < Decimal::new(50_000_000, 0) {
        5
    } else if budget < Decimal::new(100_000_000, 0) {
        7
    } else {
        10
    }
}

/// Computes how many shares a buy signal may take on.
pub struct PositionSizer {
    config: RiskConfig,
    broker: Arc<dyn BrokerPort>,
    clock: Arc<dyn Clock>,
    cash: TtlCache<CashBalance>,
}

impl PositionSizer {
    pub fn new(config: RiskConfig, broker: Arc<dyn BrokerPort>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            broker,
            clock,
            cash: TtlCache::new(Duration::seconds(CASH_TTL_SECS)),
        }
    }

    /// Whole shares to buy at `price`; zero is a valid "do not buy" answer.
    ///
    /// Budget source is the fixed `total_budget` when configured, otherwise
    /// the live account valuation. The per-symbol allocation is
    /// `budget / slots`, capped at 95% of orderable cash, converted through
    /// the configured exchange rate for foreign markets. Any missing input
    /// (zero price, zero budget, unreachable broker) sizes to zero rather
    /// than erroring.
    pub async fn buy_quantity(&self, symbol: &str, price: Decimal, market: Market) -> i64 {
        if price <= Decimal::ZERO {
            debug!(symbol = %symbol, "no usable price, sizing to zero");
            return 0;
        }

        let now = self.clock.now();
        let balance = match self.cash.get(now) {
            Some(balance) => balance,
            None => match self.broker.cash_balance().await {
                Ok(balance) => {
                    self.cash.put(balance.clone(), now);
                    balance
                }
                Err(err) => {
                    error!(symbol = %symbol, error = %err, "cash snapshot unavailable, sizing to zero");
                    return 0;
                }
            },
        };

        let budget = if self.config.total_budget > Decimal::ZERO {
            self.config.total_budget
        } else {
            balance.total_eval
        };
        if budget <= Decimal::ZERO {
            debug!(symbol = %symbol, "no budget, sizing to zero");
            return 0;
        }

        let slots = diversification_slots(budget);
        let per_symbol = budget / Decimal::from(slots);
        let cash_cap = balance.cash * Decimal::new(95, 2);
        let mut allocation = per_symbol.min(cash_cap);

        if market.is_foreign() {
            if self.config.usd_krw_rate <= Decimal::ZERO {
                debug!(symbol = %symbol, "no exchange rate, sizing to zero");
                return 0;
            }
            allocation /= self.config.usd_krw_rate;
        }
        if allocation <= Decimal::ZERO {
            return 0;
        }

        let quantity = (allocation / price).floor().to_i64().unwrap_or(0).max(0);
        info!(
            symbol = %symbol,
            market = %market,
            budget = %budget,
            slots,
            allocation = %allocation,
            price = %price,
            quantity,
            "sized buy quantity"
        );
        quantity
    }
}
