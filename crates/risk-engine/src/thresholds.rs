//! Volatility-scaled stop/take thresholds.

use autotrade_core::config::RiskConfig;
use autotrade_core::types::Candle;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-symbol stop/take pair, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub stop_pct: Decimal,
    pub take_pct: Decimal,
}

/// Mean true range over the last `period` bars of an oldest-first series.
///
/// True range of a bar = max(H-L, |H-Pc|, |L-Pc|). Returns `None` when the
/// series is shorter than `period + 1` bars.
pub fn average_true_range(series: &[Candle], period: usize) -> Option<Decimal> {
    if period == 0 || series.len() < period + 1 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(series.len() - 1);
    for window in series.windows(2) {
        let prev = &window[0];
        let current = &window[1];

        let hl = current.high - current.low;
        let hpc = (current.high - prev.close).abs();
        let lpc = (current.low - prev.close).abs();
        true_ranges.push(hl.max(hpc).max(lpc));
    }

    let sum: Decimal = true_ranges.iter().rev().take(period).copied().sum();
    Some(sum / Decimal::from(period))
}

/// Per-symbol dynamic thresholds derived from realized volatility.
///
/// Until `update_dynamic` has run for a symbol, the configured static
/// stop/take values apply.
pub struct ThresholdBook {
    config: RiskConfig,
    dynamic: DashMap<String, Thresholds>,
}

impl ThresholdBook {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            dynamic: DashMap::new(),
        }
    }

    /// Effective thresholds for a symbol.
    pub fn for_symbol(&self, symbol: &str) -> Thresholds {
        self.dynamic
            .get(symbol)
            .map(|entry| *entry)
            .unwrap_or(Thresholds {
                stop_pct: self.config.stop_loss_pct,
                take_pct: self.config.take_profit_pct,
            })
    }

    /// Recompute the dynamic pair from recent daily bars.
    ///
    /// `stop = clamp(atr% x stop_mult, 2%, configured stop)` and
    /// `take = clamp(atr% x take_mult, 3%, configured take)`. A series
    /// shorter than `atr_period + 1` bars is a no-op.
    pub fn update_dynamic(&self, symbol: &str, series: &[Candle]) {
        let period = self.config.atr_period;
        let Some(atr) = average_true_range(series, period) else {
            debug!(
                symbol = %symbol,
                bars = series.len(),
                needed = period + 1,
                "series too short for dynamic thresholds"
            );
            return;
        };

        let last_close = match series.last() {
            Some(bar) if bar.close > Decimal::ZERO => bar.close,
            _ => return,
        };
        let atr_pct = atr / last_close * Decimal::ONE_HUNDRED;

        let stop_pct = (atr_pct * self.config.atr_stop_multiplier)
            .max(Decimal::new(2, 0))
            .min(self.config.stop_loss_pct);
        let take_pct = (atr_pct * self.config.atr_take_multiplier)
            .max(Decimal::new(3, 0))
            .min(self.config.take_profit_pct);

        info!(
            symbol = %symbol,
            atr = %atr,
            atr_pct = %atr_pct,
            stop_pct = %stop_pct,
            take_pct = %take_pct,
            "dynamic thresholds updated"
        );
        self.dynamic
            .insert(symbol.to_string(), Thresholds { stop_pct, take_pct });
    }
}
