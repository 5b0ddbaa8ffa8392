//! Portfolio-level circuit breakers.

use std::sync::Arc;

use autotrade_core::broker::BrokerPort;
use autotrade_core::cache::TtlCache;
use autotrade_core::clock::Clock;
use autotrade_core::config::RiskConfig;
use autotrade_core::store::TradeStore;
use autotrade_core::types::CashBalance;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How long a daily P&L snapshot stays fresh.
const DAILY_PNL_TTL_SECS: i64 = 60;

/// Why a trade request was denied. A normal negative decision, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDenial {
    #[error("daily trade cap reached ({count}/{limit})")]
    DailyTradeCap { count: u32, limit: u32 },

    #[error("trading halted after losing streak, {remaining_min}m cooldown remaining")]
    CoolingDown { remaining_min: i64 },

    #[error("daily loss {daily_pnl} breached the -{limit} cap")]
    DailyLossCap { daily_pnl: Decimal, limit: Decimal },

    #[error("risk data unavailable: {message}")]
    DataUnavailable { message: String },
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_losses: u32,
    halted: bool,
    last_loss_at: Option<DateTime<Utc>>,
}

/// Daily trade cap, losing-streak halt, and daily realized-loss cap.
///
/// The halt flag is single-writer (this type), read by `can_trade` from any
/// caller; a plain `RwLock` is enough at seconds-to-minutes call frequency.
pub struct CircuitBreaker {
    config: RiskConfig,
    broker: Arc<dyn BrokerPort>,
    store: Arc<dyn TradeStore>,
    clock: Arc<dyn Clock>,
    state: RwLock<BreakerState>,
    /// Cash snapshot backing the daily-loss gate, refreshed at most once
    /// per 60 seconds.
    daily_pnl: TtlCache<CashBalance>,
}

impl CircuitBreaker {
    pub fn new(
        config: RiskConfig,
        broker: Arc<dyn BrokerPort>,
        store: Arc<dyn TradeStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            broker,
            store,
            clock,
            state: RwLock::new(BreakerState::default()),
            daily_pnl: TtlCache::new(Duration::seconds(DAILY_PNL_TTL_SECS)),
        }
    }

    /// Evaluate the gates in order, returning the first denial.
    ///
    /// Gate order: daily trade cap, losing-streak halt (cleared here once
    /// the cooldown has elapsed), daily realized-loss cap. Tripping the
    /// daily-loss cap also sets the halt, so it too requires the cooldown
    /// to clear rather than just the next calendar day.
    pub async fn can_trade(&self) -> Result<(), TradeDenial> {
        let count = match self.store.trade_count_today().await {
            Ok(count) => count,
            Err(err) => {
                return Err(TradeDenial::DataUnavailable {
                    message: err.to_string(),
                })
            }
        };
        if count >= self.config.max_daily_trades {
            return Err(TradeDenial::DailyTradeCap {
                count,
                limit: self.config.max_daily_trades,
            });
        }

        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            if state.halted {
                let resume_at = state
                    .last_loss_at
                    .map(|at| at + Duration::minutes(self.config.consecutive_loss_cooldown_min));
                match resume_at {
                    Some(resume_at) if now < resume_at => {
                        let remaining_min = ((resume_at - now).num_seconds() + 59) / 60;
                        return Err(TradeDenial::CoolingDown { remaining_min });
                    }
                    _ => {
                        info!("loss cooldown elapsed, clearing trading halt");
                        state.halted = false;
                    }
                }
            }
        }

        let snapshot = match self.daily_pnl.get(now) {
            Some(snapshot) => snapshot,
            None => match self.broker.cash_balance().await {
                Ok(balance) => {
                    debug!(total_pnl = %balance.total_pnl, "refreshed daily P&L snapshot");
                    self.daily_pnl.put(balance.clone(), now);
                    balance
                }
                Err(err) => {
                    return Err(TradeDenial::DataUnavailable {
                        message: err.to_string(),
                    })
                }
            },
        };

        let budget = if self.config.total_budget > Decimal::ZERO {
            self.config.total_budget
        } else {
            snapshot.total_eval
        };
        let limit = budget * self.config.daily_max_loss_pct / Decimal::ONE_HUNDRED;
        if limit > Decimal::ZERO && snapshot.total_pnl <= -limit {
            let mut state = self.state.write().await;
            if !state.halted {
                warn!(
                    daily_pnl = %snapshot.total_pnl,
                    limit = %limit,
                    "daily loss cap breached, halting trading"
                );
                state.halted = true;
                state.last_loss_at = Some(now);
            }
            return Err(TradeDenial::DailyLossCap {
                daily_pnl: snapshot.total_pnl,
                limit,
            });
        }

        Ok(())
    }

    /// Account one realized stop-loss. Called exactly once per realized
    /// stop, never on a failed order.
    pub async fn record_stop_loss(&self) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.consecutive_losses += 1;
        state.last_loss_at = Some(now);
        if state.consecutive_losses >= self.config.consecutive_loss_limit {
            state.halted = true;
            warn!(
                consecutive_losses = state.consecutive_losses,
                cooldown_min = self.config.consecutive_loss_cooldown_min,
                "losing streak limit hit, trading halted"
            );
        } else {
            debug!(
                consecutive_losses = state.consecutive_losses,
                limit = self.config.consecutive_loss_limit,
                "stop-loss recorded"
            );
        }
    }

    /// Account one realized profit; the losing streak resets to zero.
    pub async fn record_profit(&self) {
        let mut state = self.state.write().await;
        if state.consecutive_losses > 0 {
            debug!(
                streak = state.consecutive_losses,
                "profit realized, losing streak reset"
            );
        }
        state.consecutive_losses = 0;
    }

    pub async fn is_halted(&self) -> bool {
        self.state.read().await.halted
    }

    pub async fn consecutive_losses(&self) -> u32 {
        self.state.read().await.consecutive_losses
    }
}
