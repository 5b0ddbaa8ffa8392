//! Engine configuration.
//!
//! Values are read once at construction from the environment (an `.env`
//! file is honored); there is no hot reload.

use std::env;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Risk-side tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Static stop-loss threshold, percent.
    pub stop_loss_pct: Decimal,
    /// Static take-profit threshold, percent.
    pub take_profit_pct: Decimal,
    /// Profit percent at which the trailing stop arms itself.
    pub trailing_activation_pct: Decimal,
    /// Pullback from the high-water mark that exits an armed position, percent.
    pub trailing_stop_pct: Decimal,
    /// ATR window length for dynamic thresholds.
    pub atr_period: usize,
    /// Dynamic stop = clamp(atr% x this, 2%, `stop_loss_pct`).
    pub atr_stop_multiplier: Decimal,
    /// Dynamic take = clamp(atr% x this, 3%, `take_profit_pct`).
    pub atr_take_multiplier: Decimal,
    /// Daily realized-loss cap as percent of the budget.
    pub daily_max_loss_pct: Decimal,
    /// Losing-streak length that halts trading.
    pub consecutive_loss_limit: u32,
    /// Minutes the halt stays in force after the last loss.
    pub consecutive_loss_cooldown_min: i64,
    /// Maximum successful trades per day.
    pub max_daily_trades: u32,
    /// Fixed budget in KRW; zero means "use live account valuation".
    pub total_budget: Decimal,
    /// Conversion rate applied to overseas allocations.
    pub usd_krw_rate: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Decimal::new(50, 1),           // 5.0%
            take_profit_pct: Decimal::new(100, 1),        // 10.0%
            trailing_activation_pct: Decimal::new(30, 1), // 3.0%
            trailing_stop_pct: Decimal::new(20, 1),       // 2.0%
            atr_period: 14,
            atr_stop_multiplier: Decimal::new(15, 1), // 1.5x
            atr_take_multiplier: Decimal::new(25, 1), // 2.5x
            daily_max_loss_pct: Decimal::new(30, 1),  // 3.0%
            consecutive_loss_limit: 3,
            consecutive_loss_cooldown_min: 60,
            max_daily_trades: 20,
            total_budget: Decimal::ZERO,
            usd_krw_rate: Decimal::new(1450, 0),
        }
    }
}

/// Execution-side tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub limit_order_enabled: bool,
    /// Entry limit discount below the current price, percent.
    pub limit_buy_offset_pct: Decimal,
    /// Take-profit limit premium above the current price, percent.
    pub limit_tp_offset_pct: Decimal,
    /// Age after which an unfilled limit order is canceled, seconds.
    pub limit_order_timeout_sec: i64,
    pub split_buy_enabled: bool,
    /// Fraction of the full quantity bought on the first leg.
    pub split_buy_first_ratio: Decimal,
    /// Dip below the first entry that triggers the second leg, percent.
    pub split_buy_dip_pct: Decimal,
    pub split_sell_enabled: bool,
    /// Fraction of the held quantity sold on the first take-profit leg.
    pub split_sell_first_ratio: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            limit_order_enabled: true,
            limit_buy_offset_pct: Decimal::new(3, 1), // 0.3%
            limit_tp_offset_pct: Decimal::new(3, 1),  // 0.3%
            limit_order_timeout_sec: 300,
            split_buy_enabled: true,
            split_buy_first_ratio: Decimal::new(5, 1), // 0.5
            split_buy_dip_pct: Decimal::new(20, 1),    // 2.0%
            split_sell_enabled: true,
            split_sell_first_ratio: Decimal::new(5, 1), // 0.5
        }
    }
}

/// Full configuration surface of the engine pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradingConfig {
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
}

impl TradingConfig {
    /// Load from environment variables, falling back to the defaults above.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let risk_defaults = RiskConfig::default();
        let exec_defaults = ExecutionConfig::default();

        Ok(Self {
            risk: RiskConfig {
                stop_loss_pct: decimal_var("STOP_LOSS_PCT", risk_defaults.stop_loss_pct)?,
                take_profit_pct: decimal_var("TAKE_PROFIT_PCT", risk_defaults.take_profit_pct)?,
                trailing_activation_pct: decimal_var(
                    "TRAILING_ACTIVATION_PCT",
                    risk_defaults.trailing_activation_pct,
                )?,
                trailing_stop_pct: decimal_var(
                    "TRAILING_STOP_PCT",
                    risk_defaults.trailing_stop_pct,
                )?,
                atr_period: usize_var("ATR_PERIOD", risk_defaults.atr_period)?,
                atr_stop_multiplier: decimal_var(
                    "ATR_STOP_MULTIPLIER",
                    risk_defaults.atr_stop_multiplier,
                )?,
                atr_take_multiplier: decimal_var(
                    "ATR_TAKE_MULTIPLIER",
                    risk_defaults.atr_take_multiplier,
                )?,
                daily_max_loss_pct: decimal_var(
                    "DAILY_MAX_LOSS_PCT",
                    risk_defaults.daily_max_loss_pct,
                )?,
                consecutive_loss_limit: u32_var(
                    "CONSECUTIVE_LOSS_LIMIT",
                    risk_defaults.consecutive_loss_limit,
                )?,
                consecutive_loss_cooldown_min: i64_var(
                    "CONSECUTIVE_LOSS_COOLDOWN",
                    risk_defaults.consecutive_loss_cooldown_min,
                )?,
                max_daily_trades: u32_var("MAX_DAILY_TRADES", risk_defaults.max_daily_trades)?,
                total_budget: decimal_var("TOTAL_BUDGET", risk_defaults.total_budget)?,
                usd_krw_rate: decimal_var("USD_KRW_RATE", risk_defaults.usd_krw_rate)?,
            },
            execution: ExecutionConfig {
                limit_order_enabled: bool_var(
                    "LIMIT_ORDER_ENABLED",
                    exec_defaults.limit_order_enabled,
                )?,
                limit_buy_offset_pct: decimal_var(
                    "LIMIT_BUY_OFFSET_PCT",
                    exec_defaults.limit_buy_offset_pct,
                )?,
                limit_tp_offset_pct: decimal_var(
                    "LIMIT_TP_OFFSET_PCT",
                    exec_defaults.limit_tp_offset_pct,
                )?,
                limit_order_timeout_sec: i64_var(
                    "LIMIT_ORDER_TIMEOUT_SEC",
                    exec_defaults.limit_order_timeout_sec,
                )?,
                split_buy_enabled: bool_var("SPLIT_BUY_ENABLED", exec_defaults.split_buy_enabled)?,
                split_buy_first_ratio: decimal_var(
                    "SPLIT_BUY_FIRST_RATIO",
                    exec_defaults.split_buy_first_ratio,
                )?,
                split_buy_dip_pct: decimal_var(
                    "SPLIT_BUY_DIP_PCT",
                    exec_defaults.split_buy_dip_pct,
                )?,
                split_sell_enabled: bool_var(
                    "SPLIT_SELL_ENABLED",
                    exec_defaults.split_sell_enabled,
                )?,
                split_sell_first_ratio: decimal_var(
                    "SPLIT_SELL_FIRST_RATIO",
                    exec_defaults.split_sell_first_ratio,
                )?,
            },
        })
    }
}

fn decimal_var(key: &str, default: Decimal) -> Result<Decimal> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("{key} is not a valid decimal: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

fn u32_var(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("{key} is not a valid integer: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

fn i64_var(key: &str, default: i64) -> Result<i64> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("{key} is not a valid integer: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

fn usize_var(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| Error::Config {
            message: format!("{key} is not a valid integer: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}

fn bool_var(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config {
                message: format!("{key} is not a valid boolean: {raw}"),
            }),
        },
        Err(_) => Ok(default),
    }
}
