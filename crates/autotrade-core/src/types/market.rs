//! Market identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Trading venue a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    /// Domestic (KRX) market, priced in KRW.
    Kr,
    /// Overseas (US) market, priced in USD.
    Us,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kr => "KR",
            Market::Us => "US",
        }
    }

    /// Whether allocations for this market need currency conversion
    /// out of the account's base currency.
    pub fn is_foreign(&self) -> bool {
        matches!(self, Market::Us)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
