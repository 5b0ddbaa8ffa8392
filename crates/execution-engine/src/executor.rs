//! Order execution engine.
//!
//! Turns strategy signals into broker orders: split entries and exits,
//! limit pricing with timeout cancellation, duplicate-signal suppression,
//! and trade persistence. Nothing here is fatal to the caller: every broker
//! failure becomes a failed order record or a logged skip, so one symbol's
//! trouble cannot stall the cycle for the rest.

use std::sync::Arc;

use autotrade_core::broker::BrokerPort;
use autotrade_core::clock::Clock;
use autotrade_core::config::ExecutionConfig;
use autotrade_core::error::{Error, Result};
use autotrade_core::notify::Notifier;
use autotrade_core::store::{SignalRecord, TradeRecord, TradeStore};
use autotrade_core::tick::round_down_to_tick;
use autotrade_core::types::{
    Market, OrderIntent, OrderResult, OrderSide, Position, Signal, StrategyResult,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use risk_engine::RiskEngine;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::pending::{entry_key, take_profit_key, PendingLimitOrder, PendingOrderBook};
use crate::stages::{PositionStage, StageBook};

/// Strategy labels recorded for risk-driven orders.
const STOP_LOSS_STRATEGY: &str = "stop_loss";
const TAKE_PROFIT_STRATEGY: &str = "take_profit";
const SPLIT_BUY_STRATEGY: &str = "split_buy";
const SWEEP_STRATEGY: &str = "timeout_sweep";

/// How long a position snapshot stays fresh for the duplicate-signal guard.
const POSITION_TTL_SECS: i64 = 30;

/// Signal-driven order executor.
///
/// The pending-order and stage books are engine-private; all mutation goes
/// through these methods, and order placement for one symbol is serialized
/// by a per-symbol lock.
pub struct TradeExecutor {
    config: ExecutionConfig,
    broker: Arc<dyn BrokerPort>,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
    risk: Arc<RiskEngine>,
    clock: Arc<dyn Clock>,
    pending: PendingOrderBook,
    stages: StageBook,
    position_cache: DashMap<Market, (Vec<Position>, DateTime<Utc>)>,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TradeExecutor {
    pub fn new(
        config: ExecutionConfig,
        broker: Arc<dyn BrokerPort>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
        risk: Arc<RiskEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            broker,
            store,
            notifier,
            risk,
            clock,
            pending: PendingOrderBook::new(),
            stages: StageBook::new(),
            position_cache: DashMap::new(),
            symbol_locks: DashMap::new(),
        }
    }

    /// Execute one strategy signal.
    ///
    /// Returns the broker's answer when an order was attempted, `None` when
    /// the signal was ignored, suppressed, or denied.
    pub async fn execute_signal(
        &self,
        symbol: &str,
        market: Market,
        result: &StrategyResult,
    ) -> Option<OrderResult> {
        if result.signal == Signal::Hold {
            return None;
        }
        if !self.supports(symbol, market) {
            return None;
        }

        let _guard = self.lock_symbol(symbol).await;

        // Duplicate-signal guard on a bounded-staleness snapshot: a strategy
        // re-emitting across scheduler ticks must not stack orders.
        let held = match self.cached_positions(market).await {
            Ok(positions) => positions
                .iter()
                .any(|p| p.symbol == symbol && p.quantity > 0),
            Err(err) => {
                error!(
                    symbol = %symbol,
                    market = %market,
                    error = %err,
                    "position snapshot unavailable, skipping signal"
                );
                return None;
            }
        };
        match result.signal {
            Signal::Buy if held => {
                debug!(symbol = %symbol, "already held, ignoring duplicate buy signal");
                return None;
            }
            Signal::Sell if !held => {
                debug!(symbol = %symbol, "not held, ignoring sell signal");
                return None;
            }
            _ => {}
        }

        if let Err(denial) = self.risk.can_trade().await {
            warn!(symbol = %symbol, %denial, "trade denied");
            self.notifier
                .notify_error(&format!("trade denied: {denial}"))
                .await;
            return None;
        }

        self.record_signal(symbol, market, result).await;

        let outcome = match result.signal {
            Signal::Buy => self.try_buy(symbol, market, &result.strategy_name).await,
            Signal::Sell => self.try_sell(symbol, market, &result.strategy_name).await,
            Signal::Hold => Ok(None),
        };
        match outcome {
            Ok(order) => order,
            Err(err) => {
                error!(symbol = %symbol, market = %market, error = %err, "order attempt failed");
                self.notifier
                    .notify_error(&format!("order failed for {symbol}: {err}"))
                    .await;
                None
            }
        }
    }

    /// Full-quantity market exit for a stop-loss. Risk exits never wait on
    /// price negotiation, so the limit-order machinery is bypassed.
    pub async fn execute_stop_loss(
        &self,
        symbol: &str,
        market: Market,
        quantity: i64,
    ) -> Option<OrderResult> {
        if quantity <= 0 || !self.supports(symbol, market) {
            return None;
        }
        let _guard = self.lock_symbol(symbol).await;

        warn!(symbol = %symbol, market = %market, quantity, "executing stop-loss sell");
        let intent =
            OrderIntent::market_order(symbol, market, OrderSide::Sell, quantity, self.clock.now());
        let order = match self.submit(&intent).await {
            Ok(order) => order,
            Err(err) => {
                error!(symbol = %symbol, error = %err, "stop-loss sell failed");
                self.notifier
                    .notify_error(&format!("stop-loss sell failed for {symbol}: {err}"))
                    .await;
                return None;
            }
        };
        self.log_order(&order, market, STOP_LOSS_STRATEGY).await;

        if order.success {
            self.invalidate_positions(market);
            self.risk.record_stop_loss().await;
            self.stages.remove(symbol);
        }
        Some(order)
    }

    /// Take-profit exit, split into two legs when split-sell is enabled.
    pub async fn execute_take_profit(
        &self,
        symbol: &str,
        market: Market,
        quantity: i64,
    ) -> Option<OrderResult> {
        if quantity <= 0 || !self.supports(symbol, market) {
            return None;
        }
        let _guard = self.lock_symbol(symbol).await;

        let stage = self.stages.get(symbol);
        let partial = self.config.split_sell_enabled
            && stage.as_ref().map(|s| !s.partial_exit_done).unwrap_or(false);
        let sell_quantity = if partial {
            first_tranche(quantity, self.config.split_sell_first_ratio)
        } else {
            quantity
        };

        let order = match self.place_take_profit_sell(symbol, market, sell_quantity).await {
            Ok(Some(order)) => order,
            Ok(None) => return None,
            Err(err) => {
                error!(symbol = %symbol, error = %err, "take-profit sell failed");
                self.notifier
                    .notify_error(&format!("take-profit sell failed for {symbol}: {err}"))
                    .await;
                return None;
            }
        };

        if order.success {
            self.invalidate_positions(market);
            self.risk.record_profit().await;
            if partial {
                self.stages.mark_partial_exit(symbol);
            } else {
                self.stages.remove(symbol);
            }
        }
        Some(order)
    }

    /// Second-tranche entry on a dip below the first entry price.
    ///
    /// The stage-number guard makes this the only 1 -> 2 transition and
    /// keeps the second tranche from firing twice.
    pub async fn check_split_buy(&self, symbol: &str, market: Market) -> Option<OrderResult> {
        if self.stages.get(symbol).map(|s| s.stage) != Some(1) || !self.supports(symbol, market) {
            return None;
        }

        let _guard = self.lock_symbol(symbol).await;
        // Re-read under the lock; a concurrent caller may have advanced it.
        let stage = self.stages.get(symbol)?;
        if stage.stage != 1 {
            return None;
        }

        match self.try_split_buy(symbol, market, &stage).await {
            Ok(order) => order,
            Err(err) => {
                error!(symbol = %symbol, error = %err, "split-buy attempt failed");
                self.notifier
                    .notify_error(&format!("split buy failed for {symbol}: {err}"))
                    .await;
                None
            }
        }
    }

    /// Cancel and forget limit orders older than the configured timeout.
    ///
    /// The cancel is best-effort: the broker may have filled the order
    /// already. Local tracking is cleared either way, and the next risk
    /// cycle observes the true broker-side position instead of a stale
    /// record. Returns how many records were cleared.
    pub async fn check_pending_orders(&self) -> usize {
        let now = self.clock.now();
        let expired = self.pending.expired(now, self.config.limit_order_timeout_sec);

        let mut cleared = 0;
        for (key, pending) in expired {
            let age_sec = (now - pending.placed_at).num_seconds();
            info!(
                key = %key,
                order_id = %pending.order_id,
                age_sec,
                "limit order timed out, canceling"
            );
            match self
                .broker
                .cancel(
                    pending.market,
                    &pending.order_id,
                    &pending.symbol,
                    pending.quantity,
                )
                .await
            {
                Ok(result) => self.log_order(&result, pending.market, SWEEP_STRATEGY).await,
                Err(err) => {
                    warn!(
                        key = %key,
                        order_id = %pending.order_id,
                        error = %err,
                        "cancel failed, clearing local tracking anyway"
                    );
                }
            }
            self.pending.remove(&key);
            self.invalidate_positions(pending.market);
            cleared += 1;
        }
        cleared
    }

    /// Pending limit order currently tracked under the entry key, if any.
    pub fn pending_entry(&self, symbol: &str) -> Option<PendingLimitOrder> {
        self.pending.get(&entry_key(symbol))
    }

    /// Pending limit order currently tracked under the take-profit key.
    pub fn pending_take_profit(&self, symbol: &str) -> Option<PendingLimitOrder> {
        self.pending.get(&take_profit_key(symbol))
    }

    /// Split-entry stage record for a symbol, if one exists.
    pub fn position_stage(&self, symbol: &str) -> Option<PositionStage> {
        self.stages.get(symbol)
    }

    // Private methods

    /// Capability check before dispatch; an unsupported market is a logged
    /// skip, never a venue-side failure.
    fn supports(&self, symbol: &str, market: Market) -> bool {
        if self.broker.supports_market(market) {
            true
        } else {
            warn!(symbol = %symbol, market = %market, "market not supported by broker, skipping");
            false
        }
    }

    async fn lock_symbol(&self, symbol: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .symbol_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    async fn cached_positions(&self, market: Market) -> Result<Vec<Position>> {
        let now = self.clock.now();
        if let Some(entry) = self.position_cache.get(&market) {
            let (positions, fetched_at) = entry.value();
            if now - *fetched_at < Duration::seconds(POSITION_TTL_SECS) {
                return Ok(positions.clone());
            }
        }
        let positions = self.broker.positions(market).await?;
        self.position_cache.insert(market, (positions.clone(), now));
        Ok(positions)
    }

    fn invalidate_positions(&self, market: Market) {
        self.position_cache.remove(&market);
    }

    async fn record_signal(&self, symbol: &str, market: Market, result: &StrategyResult) {
        let record = SignalRecord {
            symbol: symbol.to_string(),
            market,
            strategy: result.strategy_name.clone(),
            signal: result.signal,
            strength: result.strength,
            detail: result.detail.clone(),
            emitted_at: self.clock.now(),
        };
        if let Err(err) = self.store.save_signal(&record).await {
            error!(symbol = %symbol, error = %err, "failed to persist signal");
        }
        self.notifier
            .notify_signal(symbol, market, &result.strategy_name, result.signal, &result.detail)
            .await;
    }

    async fn try_buy(
        &self,
        symbol: &str,
        market: Market,
        strategy: &str,
    ) -> Result<Option<OrderResult>> {
        if self.pending.contains(&entry_key(symbol)) {
            warn!(symbol = %symbol, "entry order already pending, skipping buy");
            return Ok(None);
        }

        let quote = self.broker.quote(market, symbol).await?;
        if quote.price <= Decimal::ZERO {
            debug!(symbol = %symbol, "no usable quote, skipping buy");
            return Ok(None);
        }

        let full_quantity = self.risk.buy_quantity(symbol, quote.price, market).await;
        if full_quantity <= 0 {
            info!(symbol = %symbol, "sized to zero, skipping buy");
            return Ok(None);
        }

        let quantity = if self.config.split_buy_enabled {
            first_tranche(full_quantity, self.config.split_buy_first_ratio)
        } else {
            full_quantity
        };

        let order = self
            .place_buy(symbol, market, quantity, quote.price, strategy)
            .await?;
        if order.success && self.config.split_buy_enabled {
            self.stages
                .enter_stage1(symbol, market, quote.price, quantity);
        }
        Ok(Some(order))
    }

    async fn try_sell(
        &self,
        symbol: &str,
        market: Market,
        strategy: &str,
    ) -> Result<Option<OrderResult>> {
        let positions = self.cached_positions(market).await?;
        let Some(held) = positions
            .iter()
            .find(|p| p.symbol == symbol && p.quantity > 0)
        else {
            info!(symbol = %symbol, "not held, skipping sell");
            return Ok(None);
        };

        // A strategy sell is always a complete market exit.
        let intent = OrderIntent::market_order(
            symbol,
            market,
            OrderSide::Sell,
            held.quantity,
            self.clock.now(),
        );
        let order = self.submit(&intent).await?;
        self.log_order(&order, market, strategy).await;

        if order.success {
            self.invalidate_positions(market);
            self.stages.remove(symbol);
        }
        Ok(Some(order))
    }

    /// Place a buy in the configured order mode and record the outcome.
    ///
    /// Limit mode prices at a discount below the reference, tick-rounded
    /// down. With limit orders disabled the order goes out at market unless
    /// the venue takes no market orders in this mode, in which case a
    /// zero-offset limit stands in.
    async fn place_buy(
        &self,
        symbol: &str,
        market: Market,
        quantity: i64,
        reference_price: Decimal,
        strategy: &str,
    ) -> Result<OrderResult> {
        let now = self.clock.now();
        let intent = if self.config.limit_order_enabled {
            let discount = Decimal::ONE - self.config.limit_buy_offset_pct / Decimal::ONE_HUNDRED;
            let limit = round_down_to_tick(market, reference_price * discount);
            OrderIntent::new(symbol, market, OrderSide::Buy, quantity, limit, now)
        } else if self.broker.supports_market_orders(market) {
            OrderIntent::market_order(symbol, market, OrderSide::Buy, quantity, now)
        } else {
            let limit = round_down_to_tick(market, reference_price);
            OrderIntent::new(symbol, market, OrderSide::Buy, quantity, limit, now)
        };

        let order = self.submit(&intent).await?;
        self.log_order(&order, market, strategy).await;

        if order.success {
            self.invalidate_positions(market);
            if !intent.is_market() {
                self.track_pending(entry_key(symbol), &intent, &order, strategy);
            }
        }
        Ok(order)
    }

    async fn place_take_profit_sell(
        &self,
        symbol: &str,
        market: Market,
        quantity: i64,
    ) -> Result<Option<OrderResult>> {
        let now = self.clock.now();
        let intent = if market == Market::Kr && self.config.limit_order_enabled {
            let key = take_profit_key(symbol);
            if self.pending.contains(&key) {
                warn!(symbol = %symbol, "take-profit order already pending, skipping");
                return Ok(None);
            }
            let quote = self.broker.quote(market, symbol).await?;
            if quote.price <= Decimal::ZERO {
                debug!(symbol = %symbol, "no usable quote, skipping take-profit");
                return Ok(None);
            }
            let premium = Decimal::ONE + self.config.limit_tp_offset_pct / Decimal::ONE_HUNDRED;
            let limit = round_down_to_tick(market, quote.price * premium);
            OrderIntent::new(symbol, market, OrderSide::Sell, quantity, limit, now)
        } else {
            OrderIntent::market_order(symbol, market, OrderSide::Sell, quantity, now)
        };

        info!(
            symbol = %symbol,
            market = %market,
            quantity,
            limit = %intent.price,
            "executing take-profit sell"
        );
        let order = self.submit(&intent).await?;
        self.log_order(&order, market, TAKE_PROFIT_STRATEGY).await;

        if order.success && !intent.is_market() {
            self.track_pending(take_profit_key(symbol), &intent, &order, TAKE_PROFIT_STRATEGY);
        }
        Ok(Some(order))
    }

    async fn try_split_buy(
        &self,
        symbol: &str,
        market: Market,
        stage: &PositionStage,
    ) -> Result<Option<OrderResult>> {
        let quote = self.broker.quote(market, symbol).await?;
        if quote.price <= Decimal::ZERO {
            return Ok(None);
        }

        let dip_floor = stage.first_price
            * (Decimal::ONE - self.config.split_buy_dip_pct / Decimal::ONE_HUNDRED);
        if quote.price > dip_floor {
            return Ok(None);
        }

        let full_quantity = self.risk.buy_quantity(symbol, quote.price, market).await;
        let remaining = remaining_tranche(full_quantity, self.config.split_buy_first_ratio);
        if remaining <= 0 {
            info!(symbol = %symbol, "second tranche sized to zero, skipping");
            return Ok(None);
        }

        if self.pending.contains(&entry_key(symbol)) {
            warn!(symbol = %symbol, "entry order already pending, skipping second tranche");
            return Ok(None);
        }

        info!(
            symbol = %symbol,
            first_price = %stage.first_price,
            price = %quote.price,
            remaining,
            "dip reached, buying second tranche"
        );
        let order = self
            .place_buy(symbol, market, remaining, quote.price, SPLIT_BUY_STRATEGY)
            .await?;
        if order.success {
            self.stages.advance_to_stage2(symbol);
        }
        Ok(Some(order))
    }

    /// Hand an intent to the broker, folding business rejections into a
    /// failed [`OrderResult`] so they get persisted and notified like any
    /// other attempt. Transport errors propagate for the caller to skip.
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderResult> {
        let outcome = match intent.side {
            OrderSide::Buy => self.broker.buy(intent).await,
            _ => self.broker.sell(intent).await,
        };
        match outcome {
            Ok(order) => Ok(order),
            Err(Error::Rejected { message }) => Ok(OrderResult::rejected(
                intent.symbol.clone(),
                intent.side,
                intent.quantity,
                intent.price,
                message,
            )),
            Err(err) => Err(err),
        }
    }

    fn track_pending(&self, key: String, intent: &OrderIntent, order: &OrderResult, strategy: &str) {
        let pending = PendingLimitOrder {
            order_id: order.order_id.clone(),
            symbol: intent.symbol.clone(),
            market: intent.market,
            side: intent.side,
            quantity: intent.quantity,
            limit_price: intent.price,
            placed_at: intent.created_at,
            strategy: strategy.to_string(),
        };
        if !self.pending.register(key.clone(), pending) {
            warn!(key = %key, "pending order slot already occupied");
        }
    }

    /// Persist and broadcast one order outcome: exactly one trade record and
    /// one notification per realized attempt, success or not.
    async fn log_order(&self, order: &OrderResult, market: Market, strategy: &str) {
        let record = TradeRecord {
            symbol: order.symbol.clone(),
            name: String::new(),
            market,
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            order_id: order.order_id.clone(),
            strategy: strategy.to_string(),
            success: order.success,
            message: order.message.clone(),
            executed_at: self.clock.now(),
        };
        if let Err(err) = self.store.save_trade(&record).await {
            error!(symbol = %order.symbol, error = %err, "failed to persist trade record");
        }
        self.notifier.notify_order(order).await;

        if order.success {
            info!(
                symbol = %order.symbol,
                side = order.side.as_str(),
                quantity = order.quantity,
                price = %order.price,
                strategy = %strategy,
                "order accepted"
            );
        } else {
            error!(
                symbol = %order.symbol,
                side = order.side.as_str(),
                message = %order.message,
                "order rejected"
            );
        }
    }
}

/// First tranche of a split: floor(quantity x ratio), at least one share.
fn first_tranche(quantity: i64, ratio: Decimal) -> i64 {
    if quantity <= 0 {
        return 0;
    }
    let first = (Decimal::from(quantity) * ratio)
        .floor()
        .to_i64()
        .unwrap_or(0);
    first.clamp(1, quantity)
}

/// Second-tranche size out of a freshly sized full quantity.
fn remaining_tranche(full_quantity: i64, first_ratio: Decimal) -> i64 {
    if full_quantity <= 0 {
        return 0;
    }
    full_quantity - first_tranche(full_quantity, first_ratio)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use autotrade_core::clock::ManualClock;
    use autotrade_core::config::RiskConfig;
    use autotrade_core::notify::NullNotifier;
    use autotrade_core::types::{CashBalance, Quote};
    use chrono::Utc;

    use super::*;

    struct FakeBroker {
        quotes: DashMap<String, Decimal>,
        positions: StdMutex<Vec<Position>>,
        balance: StdMutex<CashBalance>,
        buys: StdMutex<Vec<OrderIntent>>,
        sells: StdMutex<Vec<OrderIntent>>,
        cancels: StdMutex<Vec<String>>,
        reject_orders: AtomicBool,
        next_order_no: AtomicU32,
    }

    impl FakeBroker {
        fn new() -> Self {
            Self {
                quotes: DashMap::new(),
                positions: StdMutex::new(Vec::new()),
                balance: StdMutex::new(CashBalance {
                    total_eval: Decimal::new(100_000_000, 0),
                    cash: Decimal::new(100_000_000, 0),
                    stock_eval: Decimal::ZERO,
                    total_pnl: Decimal::ZERO,
                }),
                buys: StdMutex::new(Vec::new()),
                sells: StdMutex::new(Vec::new()),
                cancels: StdMutex::new(Vec::new()),
                reject_orders: AtomicBool::new(false),
                next_order_no: AtomicU32::new(1),
            }
        }

        fn set_quote(&self, symbol: &str, price: Decimal) {
            self.quotes.insert(symbol.to_string(), price);
        }

        fn hold(&self, symbol: &str, market: Market, quantity: i64, avg: Decimal, current: Decimal) {
            let pnl_pct = if avg > Decimal::ZERO {
                (current - avg) / avg * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            };
            self.positions.lock().unwrap().push(Position {
                symbol: symbol.to_string(),
                name: String::new(),
                market,
                quantity,
                avg_price: avg,
                current_price: current,
                pnl_amount: (current - avg) * Decimal::from(quantity),
                pnl_pct,
            });
        }

        fn reject_next_orders(&self) {
            self.reject_orders.store(true, Ordering::SeqCst);
        }

        fn buy_count(&self) -> usize {
            self.buys.lock().unwrap().len()
        }

        fn sell_count(&self) -> usize {
            self.sells.lock().unwrap().len()
        }

        fn last_buy(&self) -> OrderIntent {
            self.buys.lock().unwrap().last().unwrap().clone()
        }

        fn last_sell(&self) -> OrderIntent {
            self.sells.lock().unwrap().last().unwrap().clone()
        }

        fn answer(&self, intent: &OrderIntent) -> Result<OrderResult> {
            if self.reject_orders.load(Ordering::SeqCst) {
                return Err(Error::Rejected {
                    message: "insufficient funds".into(),
                });
            }
            let no = self.next_order_no.fetch_add(1, Ordering::SeqCst);
            Ok(OrderResult::accepted(
                format!("ORD-{no}"),
                intent.symbol.clone(),
                intent.side,
                intent.quantity,
                intent.price,
            ))
        }
    }

    #[async_trait]
    impl BrokerPort for FakeBroker {
        fn supports_market(&self, _market: Market) -> bool {
            true
        }

        async fn quote(&self, _market: Market, symbol: &str) -> Result<Quote> {
            let price = self
                .quotes
                .get(symbol)
                .map(|entry| *entry)
                .ok_or_else(|| Error::Transport {
                    message: format!("no quote for {symbol}"),
                })?;
            Ok(Quote {
                symbol: symbol.to_string(),
                name: String::new(),
                price,
                change_pct: Decimal::ZERO,
            })
        }

        async fn positions(&self, market: Market) -> Result<Vec<Position>> {
            Ok(self
                .positions
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.market == market)
                .cloned()
                .collect())
        }

        async fn cash_balance(&self) -> Result<CashBalance> {
            Ok(self.balance.lock().unwrap().clone())
        }

        async fn buy(&self, order: &OrderIntent) -> Result<OrderResult> {
            self.buys.lock().unwrap().push(order.clone());
            self.answer(order)
        }

        async fn sell(&self, order: &OrderIntent) -> Result<OrderResult> {
            self.sells.lock().unwrap().push(order.clone());
            self.answer(order)
        }

        async fn cancel(
            &self,
            _market: Market,
            order_id: &str,
            symbol: &str,
            quantity: i64,
        ) -> Result<OrderResult> {
            self.cancels.lock().unwrap().push(order_id.to_string());
            Ok(OrderResult::accepted(
                order_id,
                symbol,
                OrderSide::Cancel,
                quantity,
                Decimal::ZERO,
            ))
        }
    }

    struct MemoryStore {
        trades: StdMutex<Vec<TradeRecord>>,
        signals: StdMutex<Vec<SignalRecord>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                trades: StdMutex::new(Vec::new()),
                signals: StdMutex::new(Vec::new()),
            }
        }

        fn trade_count(&self) -> usize {
            self.trades.lock().unwrap().len()
        }

        fn last_trade(&self) -> TradeRecord {
            self.trades.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl TradeStore for MemoryStore {
        async fn save_trade(&self, trade: &TradeRecord) -> Result<()> {
            self.trades.lock().unwrap().push(trade.clone());
            Ok(())
        }

        async fn save_signal(&self, signal: &SignalRecord) -> Result<()> {
            self.signals.lock().unwrap().push(signal.clone());
            Ok(())
        }

        async fn trade_count_today(&self) -> Result<u32> {
            Ok(self
                .trades
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.success)
                .count() as u32)
        }

        async fn trades_today(&self) -> Result<Vec<TradeRecord>> {
            Ok(self.trades.lock().unwrap().clone())
        }
    }

    struct Harness {
        broker: Arc<FakeBroker>,
        store: Arc<MemoryStore>,
        risk: Arc<RiskEngine>,
        clock: ManualClock,
        executor: TradeExecutor,
    }

    fn harness(config: ExecutionConfig) -> Harness {
        let risk_config = RiskConfig {
            total_budget: Decimal::new(10_000_000, 0), // 3 slots
            ..RiskConfig::default()
        };
        harness_with(config, risk_config)
    }

    fn harness_with(config: ExecutionConfig, risk_config: RiskConfig) -> Harness {
        let broker = Arc::new(FakeBroker::new());
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let broker_port: Arc<dyn BrokerPort> = broker.clone();
        let store_port: Arc<dyn TradeStore> = store.clone();

        let risk = Arc::new(RiskEngine::new(
            risk_config,
            Arc::clone(&broker_port),
            Arc::clone(&store_port),
            Arc::clone(&clock_arc),
        ));
        let executor = TradeExecutor::new(
            config,
            broker_port,
            store_port,
            Arc::new(NullNotifier),
            Arc::clone(&risk),
            clock_arc,
        );
        Harness {
            broker,
            store,
            risk,
            clock,
            executor,
        }
    }

    fn buy_signal() -> StrategyResult {
        StrategyResult::new(Signal::Buy, 0.8, "ma_cross", "golden cross")
    }

    fn sell_signal() -> StrategyResult {
        StrategyResult::new(Signal::Sell, 0.8, "ma_cross", "dead cross")
    }

    #[tokio::test]
    async fn buy_places_tick_rounded_limit_and_tracks_pending() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(20_100, 0));

        let order = h
            .executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await
            .unwrap();
        assert!(order.success);

        // 10,000,000 / 3 slots = 3,333,333 at 20,100 -> 165 shares, halved
        // to 82 by the split first leg.
        let intent = h.broker.last_buy();
        assert_eq!(intent.quantity, 82);
        // 20,100 * 0.997 = 20,039.7, tick-rounded down to 20,030.
        assert_eq!(intent.price, Decimal::new(20_030, 0));

        let pending = h.executor.pending_entry("005930").unwrap();
        assert_eq!(pending.limit_price, Decimal::new(20_030, 0));
        let stage = h.executor.position_stage("005930").unwrap();
        assert_eq!(stage.stage, 1);
        assert_eq!(stage.first_quantity, 82);
    }

    #[tokio::test]
    async fn hold_signal_is_ignored() {
        let h = harness(ExecutionConfig::default());
        let result = h
            .executor
            .execute_signal("005930", Market::Kr, &StrategyResult::hold("ma_cross"))
            .await;
        assert!(result.is_none());
        assert_eq!(h.broker.buy_count(), 0);
    }

    #[tokio::test]
    async fn buy_suppressed_while_held() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(20_100, 0));
        h.broker.hold(
            "005930",
            Market::Kr,
            10,
            Decimal::new(20_000, 0),
            Decimal::new(20_100, 0),
        );

        let result = h
            .executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await;
        assert!(result.is_none());
        assert_eq!(h.broker.buy_count(), 0);
        assert_eq!(h.store.trade_count(), 0);
    }

    #[tokio::test]
    async fn sell_suppressed_while_not_held() {
        let h = harness(ExecutionConfig::default());

        let result = h
            .executor
            .execute_signal("005930", Market::Kr, &sell_signal())
            .await;
        assert!(result.is_none());
        assert_eq!(h.broker.sell_count(), 0);
    }

    #[tokio::test]
    async fn sell_exits_full_quantity_at_market() {
        let h = harness(ExecutionConfig::default());
        h.broker.hold(
            "005930",
            Market::Kr,
            37,
            Decimal::new(20_000, 0),
            Decimal::new(20_100, 0),
        );

        let order = h
            .executor
            .execute_signal("005930", Market::Kr, &sell_signal())
            .await
            .unwrap();
        assert!(order.success);

        let intent = h.broker.last_sell();
        assert_eq!(intent.quantity, 37);
        assert!(intent.is_market());
    }

    #[tokio::test]
    async fn denied_by_breaker_places_no_order() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(20_100, 0));

        h.risk.record_stop_loss().await;
        h.risk.record_stop_loss().await;
        h.risk.record_stop_loss().await;
        assert!(h.risk.is_halted().await);

        let result = h
            .executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await;
        assert!(result.is_none());
        assert_eq!(h.broker.buy_count(), 0);
        assert_eq!(h.store.trade_count(), 0);
    }

    #[tokio::test]
    async fn rejection_is_persisted_as_failed_trade() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(20_100, 0));
        h.broker.reject_next_orders();

        let order = h
            .executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await
            .unwrap();
        assert!(!order.success);

        let record = h.store.last_trade();
        assert!(!record.success);
        assert_eq!(record.message, "insufficient funds");
        // A failed entry must leave no tracking behind.
        assert!(h.executor.pending_entry("005930").is_none());
        assert!(h.executor.position_stage("005930").is_none());
    }

    #[tokio::test]
    async fn timeout_sweep_cancels_only_stale_orders() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(20_100, 0));

        h.executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await
            .unwrap();
        assert!(h.executor.pending_entry("005930").is_some());

        h.clock.advance(Duration::seconds(299));
        assert_eq!(h.executor.check_pending_orders().await, 0);
        assert!(h.executor.pending_entry("005930").is_some());

        h.clock.advance(Duration::seconds(2));
        assert_eq!(h.executor.check_pending_orders().await, 1);
        assert!(h.executor.pending_entry("005930").is_none());
        assert_eq!(h.broker.cancels.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn split_buy_advances_stage_once() {
        let h = harness(ExecutionConfig {
            // Market entries so no pending entry blocks the second tranche.
            limit_order_enabled: false,
            ..ExecutionConfig::default()
        });
        h.broker.set_quote("005930", Decimal::new(20_000, 0));

        h.executor
            .execute_signal("005930", Market::Kr, &buy_signal())
            .await
            .unwrap();
        assert_eq!(h.executor.position_stage("005930").unwrap().stage, 1);

        // Above the dip floor: nothing happens.
        h.broker.set_quote("005930", Decimal::new(19_700, 0));
        assert!(h.executor.check_split_buy("005930", Market::Kr).await.is_none());

        // At a 2% dip (19,600) the second tranche goes out.
        h.broker.set_quote("005930", Decimal::new(19_600, 0));
        let order = h
            .executor
            .check_split_buy("005930", Market::Kr)
            .await
            .unwrap();
        assert!(order.success);
        assert_eq!(h.executor.position_stage("005930").unwrap().stage, 2);
        let buys = h.broker.buy_count();

        // Stage 2 never fires again.
        assert!(h.executor.check_split_buy("005930", Market::Kr).await.is_none());
        assert_eq!(h.broker.buy_count(), buys);
    }

    #[tokio::test]
    async fn stop_loss_sells_at_market_and_records_loss() {
        let h = harness(ExecutionConfig::default());
        h.broker.hold(
            "005930",
            Market::Kr,
            50,
            Decimal::new(20_000, 0),
            Decimal::new(18_900, 0),
        );
        h.executor
            .stages
            .enter_stage1("005930", Market::Kr, Decimal::new(20_000, 0), 50);

        let order = h
            .executor
            .execute_stop_loss("005930", Market::Kr, 50)
            .await
            .unwrap();
        assert!(order.success);

        let intent = h.broker.last_sell();
        assert!(intent.is_market());
        assert_eq!(intent.quantity, 50);
        assert!(h.executor.position_stage("005930").is_none());
        assert_eq!(h.risk.is_halted().await, false);

        let record = h.store.last_trade();
        assert_eq!(record.strategy, "stop_loss");
    }

    #[tokio::test]
    async fn take_profit_splits_then_closes() {
        let h = harness(ExecutionConfig::default());
        h.broker.set_quote("005930", Decimal::new(22_000, 0));
        h.executor
            .stages
            .enter_stage1("005930", Market::Kr, Decimal::new(20_000, 0), 40);

        // First leg: half the quantity, premium limit, tracked under the
        // take-profit key.
        let order = h
            .executor
            .execute_take_profit("005930", Market::Kr, 40)
            .await
            .unwrap();
        assert!(order.success);
        let intent = h.broker.last_sell();
        assert_eq!(intent.quantity, 20);
        // 22,000 * 1.003 = 22,066, tick-rounded down to 22,060.
        assert_eq!(intent.price, Decimal::new(22_060, 0));
        assert!(h.executor.pending_take_profit("005930").is_some());
        assert!(h.executor.pending_entry("005930").is_none());

        let stage = h.executor.position_stage("005930").unwrap();
        assert!(stage.partial_exit_done);

        // Second leg while one is still pending is refused outright.
        assert!(h
            .executor
            .execute_take_profit("005930", Market::Kr, 20)
            .await
            .is_none());

        // Once the pending leg is gone, the rest exits and the stage
        // record goes with it.
        h.executor.pending.remove(&take_profit_key("005930"));
        let order = h
            .executor
            .execute_take_profit("005930", Market::Kr, 20)
            .await
            .unwrap();
        assert!(order.success);
        assert_eq!(h.broker.last_sell().quantity, 20);
        assert!(h.executor.position_stage("005930").is_none());
    }

    #[tokio::test]
    async fn take_profit_on_foreign_market_exits_at_market() {
        let h = harness(ExecutionConfig::default());

        let order = h
            .executor
            .execute_take_profit("AAPL", Market::Us, 8)
            .await
            .unwrap();
        assert!(order.success);
        let intent = h.broker.last_sell();
        assert!(intent.is_market());
        assert_eq!(intent.quantity, 8);
        assert!(h.executor.pending_take_profit("AAPL").is_none());
    }

    #[tokio::test]
    async fn market_mode_falls_back_to_zero_offset_limit_when_unsupported() {
        struct NoMarketOrders(FakeBroker);

        #[async_trait]
        impl BrokerPort for NoMarketOrders {
            fn supports_market(&self, market: Market) -> bool {
                self.0.supports_market(market)
            }
            fn supports_market_orders(&self, _market: Market) -> bool {
                false
            }
            async fn quote(&self, market: Market, symbol: &str) -> Result<Quote> {
                self.0.quote(market, symbol).await
            }
            async fn positions(&self, market: Market) -> Result<Vec<Position>> {
                self.0.positions(market).await
            }
            async fn cash_balance(&self) -> Result<CashBalance> {
                self.0.cash_balance().await
            }
            async fn buy(&self, order: &OrderIntent) -> Result<OrderResult> {
                self.0.buy(order).await
            }
            async fn sell(&self, order: &OrderIntent) -> Result<OrderResult> {
                self.0.sell(order).await
            }
            async fn cancel(
                &self,
                market: Market,
                order_id: &str,
                symbol: &str,
                quantity: i64,
            ) -> Result<OrderResult> {
                self.0.cancel(market, order_id, symbol, quantity).await
            }
        }

        let inner = FakeBroker::new();
        inner.set_quote("AAPL", Decimal::new(190, 0));
        let broker = Arc::new(NoMarketOrders(inner));
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let broker_port: Arc<dyn BrokerPort> = broker.clone();
        let store_port: Arc<dyn TradeStore> = store;
        let risk = Arc::new(RiskEngine::new(
            RiskConfig {
                total_budget: Decimal::new(10_000_000, 0),
                ..RiskConfig::default()
            },
            Arc::clone(&broker_port),
            Arc::clone(&store_port),
            Arc::clone(&clock),
        ));
        let executor = TradeExecutor::new(
            ExecutionConfig {
                limit_order_enabled: false,
                split_buy_enabled: false,
                ..ExecutionConfig::default()
            },
            broker_port,
            store_port,
            Arc::new(NullNotifier),
            risk,
            clock,
        );

        let order = executor
            .execute_signal("AAPL", Market::Us, &buy_signal())
            .await
            .unwrap();
        assert!(order.success);

        // No market orders on this venue: a zero-offset limit stands in.
        let intent = broker.0.last_buy();
        assert!(!intent.is_market());
        assert_eq!(intent.price, Decimal::new(190, 0));
    }
}
