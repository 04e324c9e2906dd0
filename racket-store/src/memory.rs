//! In-memory store implementation
//!
//! Used for testing and development without a database. The whole state
//! sits behind one `RwLock`, so every compound command of the repository
//! ports is genuinely atomic here, the same way a database transaction
//! makes it atomic in the PostgreSQL adapter.

use crate::error::StoreError;
use crate::repository::{
    AccountRepository, CooldownRepository, HeistRepository, JoinClose, MatchResult,
    OrderRepository, SettingsRepository, Store, TakeResult, TradeRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use racket_domain::{
    apply_betrayal_outcome, plan_trade, reconcile_shares, round_cash, round_crypto, Account,
    AccountId, AccountMutation, ActionKind, BetrayalRecord, BetrayalTuning, ExperienceGrant,
    Heist, HeistId, HeistPayout, HeistPhase, LevelUpSummary, Order, OrderId, OrderSide,
    OrderStatus, Participant, RoomId, Trade, TradePlan,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store for testing and development
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    heists: HashMap<HeistId, Heist>,
    participants: HashMap<HeistId, Vec<Participant>>,
    betrayals: Vec<BetrayalRecord>,
    cooldowns: HashMap<(AccountId, ActionKind), DateTime<Utc>>,
    settings: HashMap<String, String>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Number of accounts (test helper)
    pub fn account_count(&self) -> usize {
        self.inner.read().unwrap().accounts.len()
    }

    /// Number of recorded trades (test helper)
    pub fn trade_count(&self) -> usize {
        self.inner.read().unwrap().trades.len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::default();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Account row for settlement credits; participants and counterparties
    /// always have accounts by the time money reaches them, but direct
    /// store use should not lose a credit over a missing row.
    fn account_mut(&mut self, id: AccountId) -> &mut Account {
        self.accounts.entry(id).or_insert_with(|| Account::new(id, Decimal::ZERO))
    }

    /// Apply a planned trade: update both orders, settle both balances,
    /// record the trade. Caller verified the plan against fresh rows.
    fn apply_trade(&mut self, buy_id: OrderId, sell_id: OrderId, plan: &TradePlan, trade: &Trade) {
        if let Some(buy) = self.orders.get_mut(&buy_id) {
            buy.remaining = plan.buy_after.remaining;
            buy.collateral = plan.buy_after.collateral;
            if plan.buy_after.completed {
                buy.status = OrderStatus::Completed;
            }
        }
        if let Some(sell) = self.orders.get_mut(&sell_id) {
            sell.remaining = plan.sell_after.remaining;
            sell.collateral = plan.sell_after.collateral;
            if plan.sell_after.completed {
                sell.status = OrderStatus::Completed;
            }
        }

        let buyer = self.account_mut(trade.buyer);
        buyer.credit_crypto(plan.buyer_crypto);
        buyer.credit_cash(plan.buyer_cash_refund);

        let seller = self.account_mut(trade.seller);
        seller.credit_cash(plan.seller_cash);
        seller.credit_crypto(plan.seller_crypto_refund);

        self.trades.push(trade.clone());
    }

    /// Active contra orders resting at exactly `price`, time priority.
    fn resting_at(&self, side: OrderSide, price: i64) -> Vec<Order> {
        let contra = side.contra();
        let mut resting: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.is_active() && o.side == contra && o.price == price)
            .cloned()
            .collect();
        resting.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        resting
    }
}

// =============================================================================
// Account Repository Implementation
// =============================================================================

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn get_or_create(
        &self,
        id: AccountId,
        starting_cash: Decimal,
    ) -> Result<(Account, bool), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(account) = inner.accounts.get(&id) {
            return Ok((account.clone(), false));
        }
        let account = Account::new(id, starting_cash);
        inner.accounts.insert(id, account.clone());
        Ok((account, true))
    }

    async fn find(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn apply(
        &self,
        id: AccountId,
        mutations: &[AccountMutation],
    ) -> Result<Account, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut account = inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))?;
        for mutation in mutations {
            account.apply(mutation)?;
        }
        inner.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn grant_experience(
        &self,
        id: AccountId,
        grant: &ExperienceGrant,
    ) -> Result<(Account, LevelUpSummary), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut account = inner
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))?;
        let summary = account.grant_experience(grant);
        inner.accounts.insert(id, account.clone());
        Ok((account, summary))
    }

    async fn transfer_cash(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Decimal, StoreError> {
        if from == to {
            return Err(StoreError::conflict("transfer to self"));
        }
        let mut inner = self.inner.write().unwrap();
        if !inner.accounts.contains_key(&to) {
            return Err(StoreError::not_found("account", to));
        }
        let source = inner
            .accounts
            .get(&from)
            .ok_or_else(|| StoreError::not_found("account", from))?;
        let moved = round_cash(amount).min(source.cash).max(Decimal::ZERO);
        if moved > Decimal::ZERO {
            // moved <= cash, so the strict debit cannot fail
            inner.account_mut(from).debit_cash_strict(moved)?;
            inner.account_mut(to).credit_cash(moved);
        }
        Ok(moved)
    }

    async fn claim_referral_reward(
        &self,
        id: AccountId,
        threshold: i64,
    ) -> Result<Option<AccountId>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("account", id))?;
        if account.referral_reward_given || account.counters.theft_successes < threshold {
            return Ok(None);
        }
        let Some(referrer) = account.referrer else {
            return Ok(None);
        };
        account.referral_reward_given = true;
        Ok(Some(referrer))
    }
}

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_with_collateral(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::duplicate("order", order.id));
        }
        let account = inner
            .accounts
            .get_mut(&order.owner)
            .ok_or_else(|| StoreError::not_found("account", order.owner))?;
        match order.side {
            OrderSide::Buy => account.debit_cash_strict(order.collateral)?,
            OrderSide::Sell => account.debit_crypto(order.collateral)?,
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.orders.get(&id).cloned())
    }

    async fn best_bid(&self) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| o.is_active() && o.side == OrderSide::Buy)
            .max_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned())
    }

    async fn best_ask(&self) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| o.is_active() && o.side == OrderSide::Sell)
            .min_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn execute_match(
        &self,
        buy: OrderId,
        sell: OrderId,
    ) -> Result<Option<MatchResult>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let (Some(buy_order), Some(sell_order)) =
            (inner.orders.get(&buy).cloned(), inner.orders.get(&sell).cloned())
        else {
            return Ok(None);
        };
        // Re-verified against the rows as they are now; a stale pair no-ops.
        let Some(plan) = plan_trade(&buy_order, &sell_order) else {
            return Ok(None);
        };
        let trade = Trade::from_plan(&buy_order, &sell_order, &plan);
        let result = MatchResult {
            trade: trade.clone(),
            buy_completed: plan.buy_after.completed,
            sell_completed: plan.sell_after.completed,
        };
        inner.apply_trade(buy, sell, &plan, &trade);
        Ok(Some(result))
    }

    async fn take_at_level(
        &self,
        taker: AccountId,
        side: OrderSide,
        price: i64,
        amount: Decimal,
    ) -> Result<TakeResult, StoreError> {
        let amount = round_crypto(amount);
        let mut inner = self.inner.write().unwrap();

        let resting = inner.resting_at(side, price);
        let depth: Decimal = resting.iter().map(|o| o.remaining).sum();
        if depth < amount {
            return Err(StoreError::InsufficientDepth { requested: amount, available: depth });
        }

        // The taker is a short-lived marketable order: collateral locked
        // strictly, fully consumed against the level, completed at the end.
        let taker_order = Order::new(taker, side, amount, price);
        {
            let account = inner
                .accounts
                .get_mut(&taker)
                .ok_or_else(|| StoreError::not_found("account", taker))?;
            match side {
                OrderSide::Buy => account.debit_cash_strict(taker_order.collateral)?,
                OrderSide::Sell => account.debit_crypto(taker_order.collateral)?,
            }
        }
        let taker_id = taker_order.id;
        inner.orders.insert(taker_id, taker_order);

        let mut trades = Vec::new();
        let mut completed = Vec::new();
        for rest in resting {
            let (buy_id, sell_id) = match side {
                OrderSide::Buy => (taker_id, rest.id),
                OrderSide::Sell => (rest.id, taker_id),
            };
            let (Some(buy_order), Some(sell_order)) =
                (inner.orders.get(&buy_id).cloned(), inner.orders.get(&sell_id).cloned())
            else {
                continue;
            };
            let Some(plan) = plan_trade(&buy_order, &sell_order) else {
                continue;
            };
            let rest_completed = match side {
                OrderSide::Buy => plan.sell_after.completed,
                OrderSide::Sell => plan.buy_after.completed,
            };
            let taker_done = match side {
                OrderSide::Buy => plan.buy_after.completed,
                OrderSide::Sell => plan.sell_after.completed,
            };
            let trade = Trade::from_plan(&buy_order, &sell_order, &plan);
            inner.apply_trade(buy_id, sell_id, &plan, &trade);
            trades.push(trade);
            if rest_completed {
                completed.push((rest.id, rest.owner));
            }
            if taker_done {
                break;
            }
        }

        Ok(TakeResult { filled: amount, trades, completed })
    }

    async fn cancel(&self, id: OrderId, requester: AccountId) -> Result<Order, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let order = inner
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))?;
        if order.owner != requester {
            return Err(StoreError::conflict("order not owned by requester"));
        }
        if !order.is_active() {
            return Err(StoreError::conflict("order is not active"));
        }

        match order.side {
            OrderSide::Buy => inner.account_mut(order.owner).credit_cash(order.collateral),
            OrderSide::Sell => inner.account_mut(order.owner).credit_crypto(order.collateral),
        }
        let stored = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        stored.status = OrderStatus::Cancelled;
        stored.collateral = Decimal::ZERO;
        Ok(stored.clone())
    }

    async fn find_active(&self) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.orders.values().filter(|o| o.is_active()).cloned().collect())
    }

    async fn find_active_by_owner(&self, owner: AccountId) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().unwrap();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.is_active() && o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }
}

// =============================================================================
// Trade Repository Implementation
// =============================================================================

#[async_trait]
impl TradeRepository for MemoryStore {
    async fn append(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.trades.push(trade.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.trades.iter().rev().take(limit).cloned().collect())
    }
}

// =============================================================================
// Heist Repository Implementation
// =============================================================================

#[async_trait]
impl HeistRepository for MemoryStore {
    async fn insert(&self, heist: &Heist) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        let busy = inner.heists.values().any(|h| h.room == heist.room && !h.is_finished());
        if busy {
            return Err(StoreError::duplicate("heist", heist.room));
        }
        inner.heists.insert(heist.id, heist.clone());
        Ok(())
    }

    async fn find(&self, id: HeistId) -> Result<Option<Heist>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.heists.get(&id).cloned())
    }

    async fn find_active_by_room(&self, room: RoomId) -> Result<Option<Heist>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.heists.values().find(|h| h.room == room && !h.is_finished()).cloned())
    }

    async fn find_unfinished(&self) -> Result<Vec<Heist>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.heists.values().filter(|h| !h.is_finished()).cloned().collect())
    }

    async fn add_participant(
        &self,
        heist: HeistId,
        account: AccountId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let row = inner
            .heists
            .get(&heist)
            .ok_or_else(|| StoreError::not_found("heist", heist))?;
        if row.phase != HeistPhase::Joining {
            return Err(StoreError::conflict("heist is not joining"));
        }
        if Utc::now() >= row.join_deadline {
            return Err(StoreError::conflict("join window closed"));
        }
        let participants = inner.participants.entry(heist).or_default();
        if participants.iter().any(|p| p.account == account) {
            return Ok(false);
        }
        participants.push(Participant::new(heist, account));
        Ok(true)
    }

    async fn participants(&self, heist: HeistId) -> Result<Vec<Participant>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.participants.get(&heist).cloned().unwrap_or_default())
    }

    async fn close_joining(&self, heist: HeistId) -> Result<JoinClose, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let row = inner
            .heists
            .get(&heist)
            .cloned()
            .ok_or_else(|| StoreError::not_found("heist", heist))?;
        if row.phase != HeistPhase::Joining {
            return Err(StoreError::conflict("heist already left the joining phase"));
        }

        let count = inner.participants.get(&heist).map(|p| p.len()).unwrap_or(0);
        if count == 0 {
            if let Some(h) = inner.heists.get_mut(&heist) {
                h.advance(HeistPhase::Finished)?;
            }
            inner.participants.remove(&heist);
            return Ok(JoinClose::Empty);
        }

        let base_share = row.base_share(count);
        let bonus_share =
            if row.bonus > Decimal::ZERO { row.bonus_share_for(count) } else { Decimal::ZERO };

        if count == 1 {
            // Sole participant: paid at once, the splitting phase is skipped.
            let account = inner
                .participants
                .get(&heist)
                .and_then(|p| p.first())
                .map(|p| p.account)
                .ok_or_else(|| StoreError::not_found("participant", heist))?;
            let payout =
                HeistPayout { account, cash: base_share, crypto: bonus_share };
            let target = inner.account_mut(account);
            target.credit_cash(payout.cash);
            target.credit_crypto(payout.crypto);
            target.counters.heist_earnings = round_cash(
                target.counters.heist_earnings + payout.cash,
            );
            if let Some(h) = inner.heists.get_mut(&heist) {
                h.bonus_share = bonus_share;
                h.advance(HeistPhase::Finished)?;
            }
            inner.participants.remove(&heist);
            return Ok(JoinClose::PaidSole(payout));
        }

        if let Some(participants) = inner.participants.get_mut(&heist) {
            for p in participants.iter_mut() {
                p.base_share = base_share;
                p.current_share = base_share;
            }
        }
        if let Some(h) = inner.heists.get_mut(&heist) {
            h.bonus_share = bonus_share;
            h.advance(HeistPhase::Splitting)?;
        }
        let participants = inner.participants.get(&heist).cloned().unwrap_or_default();
        Ok(JoinClose::Split { participants, base_share, bonus_share })
    }

    async fn apply_betrayal(
        &self,
        heist: HeistId,
        attacker: AccountId,
        target: AccountId,
        success: bool,
        tuning: &BetrayalTuning,
    ) -> Result<BetrayalRecord, StoreError> {
        if attacker == target {
            return Err(StoreError::conflict("cannot betray yourself"));
        }
        let mut inner = self.inner.write().unwrap();
        let row = inner
            .heists
            .get(&heist)
            .ok_or_else(|| StoreError::not_found("heist", heist))?;
        if row.phase != HeistPhase::Splitting {
            return Err(StoreError::conflict("heist is not splitting"));
        }
        if Utc::now() >= row.split_deadline {
            return Err(StoreError::conflict("betrayal window closed"));
        }

        let participants = inner
            .participants
            .get_mut(&heist)
            .ok_or_else(|| StoreError::not_found("participant", heist))?;
        let attacker_idx = participants
            .iter()
            .position(|p| p.account == attacker)
            .ok_or_else(|| StoreError::not_found("participant", attacker))?;
        let target_idx = participants
            .iter()
            .position(|p| p.account == target)
            .ok_or_else(|| StoreError::not_found("participant", target))?;

        // Amounts come from the rows as they are right now, not from
        // anything the caller read earlier.
        let mut attacker_row = participants[attacker_idx].clone();
        let mut target_row = participants[target_idx].clone();
        let amount = apply_betrayal_outcome(&mut attacker_row, &mut target_row, success, tuning);
        participants[attacker_idx] = attacker_row;
        participants[target_idx] = target_row;

        let record = BetrayalRecord::new(heist, attacker, target, success, amount);
        inner.betrayals.push(record.clone());
        Ok(record)
    }

    async fn settle_split(&self, heist: HeistId) -> Result<Vec<HeistPayout>, StoreError> {
        let mut inner = self.inner.write().unwrap();
        let row = inner
            .heists
            .get(&heist)
            .cloned()
            .ok_or_else(|| StoreError::not_found("heist", heist))?;
        if row.phase != HeistPhase::Splitting {
            return Err(StoreError::conflict("heist is not splitting"));
        }

        let mut participants = inner.participants.remove(&heist).unwrap_or_default();
        reconcile_shares(row.pot, &mut participants);

        let payouts: Vec<HeistPayout> = participants
            .iter()
            .map(|p| HeistPayout {
                account: p.account,
                cash: p.current_share,
                crypto: row.bonus_share,
            })
            .collect();

        for payout in &payouts {
            let account = inner.account_mut(payout.account);
            account.credit_cash(payout.cash);
            account.credit_crypto(payout.crypto);
            account.counters.heist_earnings =
                round_cash(account.counters.heist_earnings + payout.cash);
        }
        if let Some(h) = inner.heists.get_mut(&heist) {
            h.advance(HeistPhase::Finished)?;
        }
        Ok(payouts)
    }

    async fn betrayals(&self, heist: HeistId) -> Result<Vec<BetrayalRecord>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.betrayals.iter().filter(|b| b.heist == heist).cloned().collect())
    }
}

// =============================================================================
// Cooldown Repository Implementation
// =============================================================================

#[async_trait]
impl CooldownRepository for MemoryStore {
    async fn last_attempt(
        &self,
        account: AccountId,
        action: ActionKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.cooldowns.get(&(account, action)).copied())
    }

    async fn stamp(
        &self,
        account: AccountId,
        action: ActionKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.cooldowns.insert((account, action), at);
        Ok(())
    }
}

// =============================================================================
// Settings Repository Implementation
// =============================================================================

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.settings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn accounts(&self) -> &dyn AccountRepository {
        self
    }

    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn trades(&self) -> &dyn TradeRepository {
        self
    }

    fn heists(&self) -> &dyn HeistRepository {
        self
    }

    fn cooldowns(&self) -> &dyn CooldownRepository {
        self
    }

    fn settings(&self) -> &dyn SettingsRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
