//! Error types shared across the engine crates.

use thiserror::Error;

use crate::types::Market;

#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Network-level failure talking to the broker. Retryable.
    #[error("broker transport error: {message}")]
    Transport { message: String },

    /// A broker call exceeded its deadline. Retryable.
    #[error("broker call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The broker understood the request and refused it
    /// (insufficient funds, invalid symbol, ...). Never retried.
    #[error("order rejected: {message}")]
    Rejected { message: String },

    /// This broker instance does not serve the requested market.
    #[error("market {market} not supported by this broker")]
    UnsupportedMarket { market: Market },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("storage error: {message}")]
    Store { message: String },
}

impl Error {
    /// Whether the retry decorator may re-attempt the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        assert!(Error::Transport { message: "reset".into() }.is_transient());
        assert!(Error::Timeout { timeout_ms: 5000 }.is_transient());
        assert!(!Error::Rejected { message: "insufficient funds".into() }.is_transient());
        assert!(!Error::UnsupportedMarket { market: Market::Us }.is_transient());
    }
}
