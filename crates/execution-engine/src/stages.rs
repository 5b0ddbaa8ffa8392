//! Split-entry stage tracking.

use autotrade_core::types::Market;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Two-tranche entry progress for one symbol.
///
/// Stage is 1 after the first tranche fills and 2 after the dip-triggered
/// second tranche; it never moves backward while the record exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStage {
    pub symbol: String,
    pub market: Market,
    pub stage: u8,
    pub first_price: Decimal,
    pub first_quantity: i64,
    pub partial_exit_done: bool,
}

/// Stage records keyed by symbol, owned exclusively by the executor.
#[derive(Debug, Default)]
pub struct StageBook {
    stages: DashMap<String, PositionStage>,
}

impl StageBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a filled first tranche. An existing record is left untouched.
    pub fn enter_stage1(
        &self,
        symbol: &str,
        market: Market,
        first_price: Decimal,
        first_quantity: i64,
    ) -> bool {
        match self.stages.entry(symbol.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(PositionStage {
                    symbol: symbol.to_string(),
                    market,
                    stage: 1,
                    first_price,
                    first_quantity,
                    partial_exit_done: false,
                });
                true
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<PositionStage> {
        self.stages.get(symbol).map(|entry| entry.clone())
    }

    /// Advance 1 -> 2, the only legal transition. Returns false otherwise.
    pub fn advance_to_stage2(&self, symbol: &str) -> bool {
        match self.stages.get_mut(symbol) {
            Some(mut stage) if stage.stage == 1 => {
                stage.stage = 2;
                true
            }
            _ => false,
        }
    }

    /// Latch the partial take-profit exit.
    pub fn mark_partial_exit(&self, symbol: &str) -> bool {
        match self.stages.get_mut(symbol) {
            Some(mut stage) => {
                stage.partial_exit_done = true;
                true
            }
            None => false,
        }
    }

    /// Drop the record when the position fully closes.
    pub fn remove(&self, symbol: &str) -> Option<PositionStage> {
        self.stages.remove(symbol).map(|(_, stage)| stage)
    }
}
