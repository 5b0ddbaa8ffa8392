//! Open-position protection sweep.
//!
//! Trailing-stop state lives entirely in the high-water-mark map: a
//! position's trailing exit arms itself once its profit crosses the
//! activation threshold and disarms only when the position closes.

use std::sync::Arc;

use autotrade_core::config::RiskConfig;
use autotrade_core::types::Position;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::thresholds::ThresholdBook;

/// Positions flagged by a sweep.
#[derive(Debug, Clone, Default)]
pub struct PositionCheck {
    pub stop_loss: Vec<Position>,
    pub take_profit: Vec<Position>,
}

/// Sweeps broker position snapshots against stop/take/trailing rules.
pub struct PositionMonitor {
    trailing_activation_pct: Decimal,
    trailing_stop_pct: Decimal,
    thresholds: Arc<ThresholdBook>,
    /// Highest price seen per held symbol since entry.
    high_water: DashMap<String, Decimal>,
}

impl PositionMonitor {
    pub fn new(config: &RiskConfig, thresholds: Arc<ThresholdBook>) -> Self {
        Self {
            trailing_activation_pct: config.trailing_activation_pct,
            trailing_stop_pct: config.trailing_stop_pct,
            thresholds,
            high_water: DashMap::new(),
        }
    }

    /// Raise marks to the latest prices and drop marks for symbols no
    /// longer held, so a re-entered position starts from a fresh mark.
    fn refresh_high_water(&self, positions: &[Position]) {
        for position in positions {
            let mut mark = self
                .high_water
                .entry(position.symbol.clone())
                .or_insert(position.current_price);
            if position.current_price > *mark {
                *mark = position.current_price;
            }
        }
        self.high_water
            .retain(|symbol, _| positions.iter().any(|p| p.symbol == *symbol));
    }

    /// Flag positions for protective exits.
    ///
    /// The hard take-profit ceiling always wins and short-circuits the
    /// trailing check for that position.
    pub fn check_positions(&self, positions: &[Position]) -> PositionCheck {
        self.refresh_high_water(positions);

        let mut check = PositionCheck::default();
        for position in positions {
            let thresholds = self.thresholds.for_symbol(&position.symbol);

            if position.pnl_pct <= -thresholds.stop_pct {
                warn!(
                    symbol = %position.symbol,
                    pnl_pct = %position.pnl_pct,
                    stop_pct = %thresholds.stop_pct,
                    "stop-loss threshold hit"
                );
                check.stop_loss.push(position.clone());
                continue;
            }

            if position.pnl_pct >= thresholds.take_pct {
                info!(
                    symbol = %position.symbol,
                    pnl_pct = %position.pnl_pct,
                    take_pct = %thresholds.take_pct,
                    "take-profit ceiling hit"
                );
                check.take_profit.push(position.clone());
                continue;
            }

            if position.pnl_pct >= self.trailing_activation_pct {
                let Some(high) = self.high_water.get(&position.symbol).map(|mark| *mark) else {
                    continue;
                };
                if high <= Decimal::ZERO {
                    continue;
                }
                let drop_pct = (high - position.current_price) / high * Decimal::ONE_HUNDRED;
                if drop_pct >= self.trailing_stop_pct {
                    info!(
                        symbol = %position.symbol,
                        high = %high,
                        current = %position.current_price,
                        drop_pct = %drop_pct,
                        "trailing stop pullback hit"
                    );
                    check.take_profit.push(position.clone());
                }
            }
        }
        check
    }

    /// Current high-water mark for a symbol, if one is tracked.
    pub fn high_water(&self, symbol: &str) -> Option<Decimal> {
        self.high_water.get(symbol).map(|mark| *mark)
    }
}
