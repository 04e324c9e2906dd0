//! Exchange: continuous double auction for the crypto unit.
//!
//! Orders rest with their collateral locked; the matching loop pairs the
//! best bid and ask with price-time priority and executes at the resting
//! sell's price. Each trade is one atomic store command, and the loop
//! re-reads the book after every trade because concurrent submissions may
//! have changed it.

use crate::error::{EngineError, EngineResult};
use crate::events::EventBus;
use crate::ledger::Ledger;
use chrono::Utc;
use racket_domain::{
    round_crypto, AccountId, BookLevel, EconomyConfig, GameEvent, Order, OrderId, OrderSide,
    Trade,
};
use racket_store::{MatchResult, Store};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Order book aggregated by price level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderBookView {
    /// Buy levels, best (highest) price first
    pub bids: Vec<BookLevel>,
    /// Sell levels, best (lowest) price first
    pub asks: Vec<BookLevel>,
}

/// Exchange service.
pub struct Exchange<S> {
    store: Arc<S>,
    config: Arc<EconomyConfig>,
    ledger: Ledger<S>,
    bus: EventBus,
}

impl<S> Clone for Exchange<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<S: Store> Exchange<S> {
    /// Create an exchange over the given store.
    pub fn new(store: Arc<S>, config: Arc<EconomyConfig>, bus: EventBus) -> Self {
        let ledger = Ledger::new(store.clone(), config.clone(), bus.clone());
        Self { store, config, ledger, bus }
    }

    /// Submit a limit order: validate, lock collateral, rest it on the
    /// book, then run the matching loop.
    ///
    /// A buy locks `amount * price` cash strictly (a shortfall is
    /// `InsufficientFunds`, never debt); a sell locks `amount` crypto.
    pub async fn submit_order(
        &self,
        owner: AccountId,
        side: OrderSide,
        amount: Decimal,
        price: i64,
    ) -> EngineResult<OrderId> {
        let amount = round_crypto(amount);
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("amount must be positive".to_string()));
        }
        self.check_price(price)?;

        self.ledger.touch(owner).await?;
        let order = Order::new(owner, side, amount, price);
        self.store.orders().insert_with_collateral(&order).await?;
        info!(order = %order.id, owner, %side, price, %amount, "order submitted");

        self.run_matching().await?;
        Ok(order.id)
    }

    /// Fill against resting orders at exactly one price level, in time
    /// priority. A request beyond the level's depth is rejected whole.
    /// Returns the filled amount.
    pub async fn take_at_price(
        &self,
        taker: AccountId,
        side: OrderSide,
        price: i64,
        amount: Decimal,
    ) -> EngineResult<Decimal> {
        let amount = round_crypto(amount);
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("amount must be positive".to_string()));
        }
        self.check_price(price)?;

        self.ledger.touch(taker).await?;
        let result = self.store.orders().take_at_level(taker, side, price, amount).await?;
        info!(taker, %side, price, filled = %result.filled, "level taken");

        for trade in &result.trades {
            self.announce_trade(trade);
        }
        for (order, owner) in &result.completed {
            self.announce_completed(*order, *owner);
        }
        Ok(result.filled)
    }

    /// Cancel an active order; only the owner may do this. The remaining
    /// collateral is refunded in full.
    pub async fn cancel_order(&self, id: OrderId, requester: AccountId) -> EngineResult<Order> {
        let order = self.store.orders().cancel(id, requester).await?;
        info!(order = %id, owner = requester, "order cancelled");
        Ok(order)
    }

    /// The book aggregated by price level: bids descending, asks ascending.
    pub async fn order_book(&self) -> EngineResult<OrderBookView> {
        let active = self.store.orders().find_active().await?;
        let mut bids: BTreeMap<i64, (Decimal, usize)> = BTreeMap::new();
        let mut asks: BTreeMap<i64, (Decimal, usize)> = BTreeMap::new();
        for order in &active {
            let side = match order.side {
                OrderSide::Buy => &mut bids,
                OrderSide::Sell => &mut asks,
            };
            let level = side.entry(order.price).or_insert((Decimal::ZERO, 0));
            level.0 += order.remaining;
            level.1 += 1;
        }
        Ok(OrderBookView {
            bids: bids
                .into_iter()
                .rev()
                .map(|(price, (amount, orders))| BookLevel { price, amount, orders })
                .collect(),
            asks: asks
                .into_iter()
                .map(|(price, (amount, orders))| BookLevel { price, amount, orders })
                .collect(),
        })
    }

    /// Active orders owned by one account, oldest first.
    pub async fn list_active_orders(&self, owner: AccountId) -> EngineResult<Vec<Order>> {
        Ok(self.store.orders().find_active_by_owner(owner).await?)
    }

    /// Most recent trades, newest first.
    pub async fn recent_trades(&self, limit: usize) -> EngineResult<Vec<Trade>> {
        Ok(self.store.trades().recent(limit).await?)
    }

    /// Run the matching loop until no crossing pair remains.
    ///
    /// The best pair is re-read before every trade: a concurrent
    /// submission or cancellation elsewhere may have changed the book, and
    /// the per-trade command itself no-ops on a stale pair.
    async fn run_matching(&self) -> EngineResult<()> {
        loop {
            let (Some(bid), Some(ask)) =
                (self.store.orders().best_bid().await?, self.store.orders().best_ask().await?)
            else {
                break;
            };
            if bid.price < ask.price {
                break;
            }
            match self.store.orders().execute_match(bid.id, ask.id).await? {
                Some(result) => self.announce_match(&result),
                None => {
                    // Lost a race against another caller; the next pass
                    // reads the book as it is now.
                    debug!(buy = %bid.id, sell = %ask.id, "match raced, re-reading book");
                    continue;
                },
            }
        }
        Ok(())
    }

    fn check_price(&self, price: i64) -> EngineResult<()> {
        let exchange = &self.config.exchange;
        if price < exchange.min_price || price > exchange.max_price {
            return Err(EngineError::Validation(format!(
                "price {} outside allowed band {}..={}",
                price, exchange.min_price, exchange.max_price
            )));
        }
        Ok(())
    }

    fn announce_match(&self, result: &MatchResult) {
        self.announce_trade(&result.trade);
        if result.buy_completed {
            self.announce_completed(result.trade.buy_order, result.trade.buyer);
        }
        if result.sell_completed {
            self.announce_completed(result.trade.sell_order, result.trade.seller);
        }
    }

    fn announce_trade(&self, trade: &Trade) {
        debug!(trade = %trade.id, amount = %trade.amount, price = trade.price, "trade executed");
        self.bus.send(GameEvent::TradeExecuted {
            trade: trade.id,
            buyer: trade.buyer,
            seller: trade.seller,
            amount: trade.amount,
            price: trade.price,
            timestamp: trade.executed_at,
        });
    }

    fn announce_completed(&self, order: OrderId, owner: AccountId) {
        self.bus.send(GameEvent::OrderCompleted { order, owner, timestamp: Utc::now() });
    }
}
