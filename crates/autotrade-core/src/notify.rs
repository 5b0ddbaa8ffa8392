//! Outbound notification contract.

use async_trait::async_trait;

use crate::types::{Market, OrderResult, Signal};

/// Fire-and-forget notification channel (chat bot, webhook, ...).
///
/// Implementations swallow their own delivery failures; nothing the engine
/// decides may depend on a notification going through.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_signal(
        &self,
        symbol: &str,
        market: Market,
        strategy: &str,
        signal: Signal,
        detail: &str,
    );

    async fn notify_order(&self, order: &OrderResult);

    async fn notify_error(&self, message: &str);
}

/// No-op notifier for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_signal(
        &self,
        _symbol: &str,
        _market: Market,
        _strategy: &str,
        _signal: Signal,
        _detail: &str,
    ) {
    }

    async fn notify_order(&self, _order: &OrderResult) {}

    async fn notify_error(&self, _message: &str) {}
}
