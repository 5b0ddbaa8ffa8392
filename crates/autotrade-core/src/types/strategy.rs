//! Strategy signal contract consumed by the execution engine.

use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Directional signal emitted by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }
}

/// Outcome of one strategy analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub signal: Signal,
    /// Signal confidence in `[0.0, 1.0]`.
    pub strength: f64,
    pub strategy_name: String,
    pub detail: String,
}

impl StrategyResult {
    pub fn new(
        signal: Signal,
        strength: f64,
        strategy_name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            signal,
            strength,
            strategy_name: strategy_name.into(),
            detail: detail.into(),
        }
    }

    /// A neutral result for strategies with nothing to say.
    pub fn hold(strategy_name: impl Into<String>) -> Self {
        Self::new(Signal::Hold, 0.0, strategy_name, "")
    }
}

/// A signal provider.
///
/// The engine depends only on this trait, never on concrete strategy types;
/// schedulers call `analyze` and hand the result to the execution engine.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Analyze a daily series (oldest first) and emit a signal.
    fn analyze(&self, series: &[Candle]) -> StrategyResult;
}
