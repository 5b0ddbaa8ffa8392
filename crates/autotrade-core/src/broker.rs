//! Broker port contract and the retry/timeout decorator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{CashBalance, Market, OrderIntent, OrderResult, Position, Quote};

/// Capability-typed brokerage interface.
///
/// One instance serves one or both markets; callers consult
/// [`supports_market`](BrokerPort::supports_market) before dispatch instead
/// of probing with a live call. A limit price of exactly zero on an order
/// intent means "at market".
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Whether this instance can route orders to the given market.
    fn supports_market(&self, market: Market) -> bool;

    /// Whether zero-price (market) orders are accepted on this venue.
    ///
    /// Paper-trading modes of some venues only accept limit orders; callers
    /// fall back to a zero-offset limit when this is false.
    fn supports_market_orders(&self, market: Market) -> bool {
        let _ = market;
        true
    }

    async fn quote(&self, market: Market, symbol: &str) -> Result<Quote>;

    async fn positions(&self, market: Market) -> Result<Vec<Position>>;

    async fn cash_balance(&self) -> Result<CashBalance>;

    async fn buy(&self, order: &OrderIntent) -> Result<OrderResult>;

    async fn sell(&self, order: &OrderIntent) -> Result<OrderResult>;

    async fn cancel(
        &self,
        market: Market,
        order_id: &str,
        symbol: &str,
        quantity: i64,
    ) -> Result<OrderResult>;
}

#[async_trait]
impl<B: BrokerPort + ?Sized> BrokerPort for Arc<B> {
    fn supports_market(&self, market: Market) -> bool {
        (**self).supports_market(market)
    }

    fn supports_market_orders(&self, market: Market) -> bool {
        (**self).supports_market_orders(market)
    }

    async fn quote(&self, market: Market, symbol: &str) -> Result<Quote> {
        (**self).quote(market, symbol).await
    }

    async fn positions(&self, market: Market) -> Result<Vec<Position>> {
        (**self).positions(market).await
    }

    async fn cash_balance(&self) -> Result<CashBalance> {
        (**self).cash_balance().await
    }

    async fn buy(&self, order: &OrderIntent) -> Result<OrderResult> {
        (**self).buy(order).await
    }

    async fn sell(&self, order: &OrderIntent) -> Result<OrderResult> {
        (**self).sell(order).await
    }

    async fn cancel(
        &self,
        market: Market,
        order_id: &str,
        symbol: &str,
        quantity: i64,
    ) -> Result<OrderResult> {
        (**self).cancel(market, order_id, symbol, quantity).await
    }
}

/// Routing facade merging one broker instance per market into a single
/// port.
///
/// Account-level calls (cash balance) go to the domestic instance, which
/// holds the primary account. Order and quote calls route by market, with
/// the capability check applied before dispatch so an unsupported market
/// comes back as a typed error instead of a venue-side failure.
pub struct MarketRouter {
    domestic: Arc<dyn BrokerPort>,
    overseas: Arc<dyn BrokerPort>,
}

impl MarketRouter {
    pub fn new(domestic: Arc<dyn BrokerPort>, overseas: Arc<dyn BrokerPort>) -> Self {
        Self { domestic, overseas }
    }

    fn route(&self, market: Market) -> Result<&Arc<dyn BrokerPort>> {
        let client = match market {
            Market::Kr => &self.domestic,
            Market::Us => &self.overseas,
        };
        if !client.supports_market(market) {
            return Err(Error::UnsupportedMarket { market });
        }
        Ok(client)
    }
}

#[async_trait]
impl BrokerPort for MarketRouter {
    fn supports_market(&self, market: Market) -> bool {
        match market {
            Market::Kr => self.domestic.supports_market(market),
            Market::Us => self.overseas.supports_market(market),
        }
    }

    fn supports_market_orders(&self, market: Market) -> bool {
        match market {
            Market::Kr => self.domestic.supports_market_orders(market),
            Market::Us => self.overseas.supports_market_orders(market),
        }
    }

    async fn quote(&self, market: Market, symbol: &str) -> Result<Quote> {
        self.route(market)?.quote(market, symbol).await
    }

    async fn positions(&self, market: Market) -> Result<Vec<Position>> {
        self.route(market)?.positions(market).await
    }

    async fn cash_balance(&self) -> Result<CashBalance> {
        self.domestic.cash_balance().await
    }

    async fn buy(&self, order: &OrderIntent) -> Result<OrderResult> {
        self.route(order.market)?.buy(order).await
    }

    async fn sell(&self, order: &OrderIntent) -> Result<OrderResult> {
        self.route(order.market)?.sell(order).await
    }

    async fn cancel(
        &self,
        market: Market,
        order_id: &str,
        symbol: &str,
        quantity: i64,
    ) -> Result<OrderResult> {
        self.route(market)?.cancel(market, order_id, symbol, quantity).await
    }
}

/// Retry policy applied by [`RetryBroker`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per call, including the first.
    pub max_attempts: u32,
    /// Linear backoff base: attempt `n` sleeps `base * n` before retrying.
    pub base_delay: Duration,
    /// Per-call deadline.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Decorator adding a per-call timeout and transient-error retries to any
/// broker.
///
/// Only [`Error::Transport`] and [`Error::Timeout`] are retried; business
/// rejections and capability errors pass through on the first attempt.
pub struct RetryBroker<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: BrokerPort> RetryBroker<B> {
    pub fn new(inner: B) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn into_inner(self) -> B {
        self.inner
    }

    async fn run<T, F, Fut>(&self, what: &'static str, call: F) -> Result<T>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut attempt = 1u32;
        loop {
            let outcome = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    timeout_ms: self.policy.call_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    warn!(
                        call = what,
                        attempt,
                        error = %err,
                        "transient broker error, backing off"
                    );
                    tokio::time::sleep(self.policy.base_delay * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<B: BrokerPort> BrokerPort for RetryBroker<B> {
    fn supports_market(&self, market: Market) -> bool {
        self.inner.supports_market(market)
    }

    fn supports_market_orders(&self, market: Market) -> bool {
        self.inner.supports_market_orders(market)
    }

    async fn quote(&self, market: Market, symbol: &str) -> Result<Quote> {
        self.run("quote", || self.inner.quote(market, symbol)).await
    }

    async fn positions(&self, market: Market) -> Result<Vec<Position>> {
        self.run("positions", || self.inner.positions(market)).await
    }

    async fn cash_balance(&self) -> Result<CashBalance> {
        self.run("cash_balance", || self.inner.cash_balance()).await
    }

    async fn buy(&self, order: &OrderIntent) -> Result<OrderResult> {
        self.run("buy", || self.inner.buy(order)).await
    }

    async fn sell(&self, order: &OrderIntent) -> Result<OrderResult> {
        self.run("sell", || self.inner.sell(order)).await
    }

    async fn cancel(
        &self,
        market: Market,
        order_id: &str,
        symbol: &str,
        quantity: i64,
    ) -> Result<OrderResult> {
        self.run("cancel", || self.inner.cancel(market, order_id, symbol, quantity))
            .await
    }
}
