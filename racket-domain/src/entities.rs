//! Entities of the racket economy.
//!
//! Accounts, orders, trades, heists and their pure mutation logic. All the
//! arithmetic that stores must run inside a transaction lives here as plain
//! functions, so every store backend settles the same way.

use crate::value_objects::{
    round_cash, round_crypto, AccountId, CounterKind, DomainError, HeistId, HeistPhase, OrderId,
    OrderSide, OrderStatus, RoomId, SkillKind, TradeId, CRYPTO_EPSILON,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Account
// =============================================================================

/// Trainable skill levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skills {
    /// Payout-share skill level
    pub share: i64,
    /// Luck skill level
    pub luck: i64,
    /// Betrayal skill level
    pub betray: i64,
}

/// Combat stats granted by level-ups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Raw strength
    pub strength: i64,
    /// Agility
    pub agility: i64,
    /// Defense
    pub defense: i64,
}

/// Lifetime activity counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    /// Theft attempts started
    pub theft_attempts: i64,
    /// Thefts that paid out
    pub theft_successes: i64,
    /// Thefts that failed
    pub theft_failures: i64,
    /// Thefts repelled as the victim
    pub thefts_defended: i64,
    /// Heists joined
    pub heists_joined: i64,
    /// Betrayals attempted
    pub betrayal_attempts: i64,
    /// Betrayals that succeeded
    pub betrayal_successes: i64,
    /// Times successfully betrayed
    pub times_betrayed: i64,
    /// Total cash earned from heist payouts
    pub heist_earnings: Decimal,
}

/// One participant's ledger account.
///
/// Owned exclusively by the storage layer; everything else mutates accounts
/// through ledger operations. Created lazily on first interaction with a
/// starting cash grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// External account id
    pub id: AccountId,
    /// Display name, if the platform provided one
    pub username: Option<String>,
    /// Cash balance, >= 0, 2 decimal places
    pub cash: Decimal,
    /// Accumulated overdraft, >= 0
    pub debt: Decimal,
    /// Crypto balance, >= 0, 4 decimal places
    pub crypto: Decimal,
    /// Reputation, any sign
    pub reputation: i64,
    /// Skill levels
    pub skills: Skills,
    /// Experience toward the next level
    pub exp: i64,
    /// Current level, >= 1
    pub level: i64,
    /// Stats granted by level-ups
    pub stats: Stats,
    /// Activity counters
    pub counters: Counters,
    /// Account that referred this one, if any
    pub referrer: Option<AccountId>,
    /// Set once the one-time referral reward has been paid out
    pub referral_reward_given: bool,
    /// When the account was first seen
    pub created_at: DateTime<Utc>,
}

/// Result of a debt-absorbing cash debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashDebit {
    /// Amount actually removed from the cash balance
    pub taken: Decimal,
    /// Shortfall converted into debt
    pub debt_added: Decimal,
}

impl Account {
    /// Create a fresh account with the configured starting cash grant.
    pub fn new(id: AccountId, starting_cash: Decimal) -> Self {
        Self {
            id,
            username: None,
            cash: round_cash(starting_cash),
            debt: Decimal::ZERO,
            crypto: Decimal::ZERO,
            reputation: 0,
            skills: Skills::default(),
            exp: 0,
            level: 1,
            stats: Stats::default(),
            counters: Counters::default(),
            referrer: None,
            referral_reward_given: false,
            created_at: Utc::now(),
        }
    }

    /// Add cash to the balance. Amount is rounded to 2 decimal places.
    pub fn credit_cash(&mut self, amount: Decimal) {
        self.cash = round_cash(self.cash + round_cash(amount));
    }

    /// Remove cash from the balance.
    ///
    /// Never fails: a shortfall is converted into debt and the balance
    /// clamps to zero. This is a business rule, not an error path.
    pub fn debit_cash(&mut self, amount: Decimal) -> CashDebit {
        let amount = round_cash(amount);
        if amount <= self.cash {
            self.cash = round_cash(self.cash - amount);
            CashDebit { taken: amount, debt_added: Decimal::ZERO }
        } else {
            let taken = self.cash;
            let shortfall = round_cash(amount - self.cash);
            self.cash = Decimal::ZERO;
            self.debt = round_cash(self.debt + shortfall);
            CashDebit { taken, debt_added: shortfall }
        }
    }

    /// Remove cash that must be fully covered (collateral, upfront costs).
    ///
    /// # Errors
    /// Returns `DomainError::InsufficientCash` without touching the balance
    /// if cash would go negative.
    pub fn debit_cash_strict(&mut self, amount: Decimal) -> Result<(), DomainError> {
        let amount = round_cash(amount);
        if amount > self.cash {
            return Err(DomainError::InsufficientCash {
                requested: amount,
                available: self.cash,
            });
        }
        self.cash = round_cash(self.cash - amount);
        Ok(())
    }

    /// Add crypto to the balance. Amount is rounded to 4 decimal places.
    pub fn credit_crypto(&mut self, amount: Decimal) {
        self.crypto = round_crypto(self.crypto + round_crypto(amount));
    }

    /// Remove crypto from the balance.
    ///
    /// # Errors
    /// Returns `DomainError::InsufficientCrypto` without touching the
    /// balance if crypto would go negative.
    pub fn debit_crypto(&mut self, amount: Decimal) -> Result<(), DomainError> {
        let amount = round_crypto(amount);
        if amount > self.crypto {
            return Err(DomainError::InsufficientCrypto {
                requested: amount,
                available: self.crypto,
            });
        }
        self.crypto = round_crypto(self.crypto - amount);
        Ok(())
    }

    /// Shift reputation by `delta` (either sign).
    pub fn adjust_reputation(&mut self, delta: i64) {
        self.reputation += delta;
    }

    /// Shift a skill by `delta`, clamped to `0..=max`. Returns the new level.
    pub fn adjust_skill(&mut self, kind: SkillKind, delta: i64, max: i64) -> i64 {
        let slot = match kind {
            SkillKind::Share => &mut self.skills.share,
            SkillKind::Luck => &mut self.skills.luck,
            SkillKind::Betray => &mut self.skills.betray,
        };
        *slot = (*slot + delta).clamp(0, max);
        *slot
    }

    /// Read a skill level.
    pub fn skill(&self, kind: SkillKind) -> i64 {
        match kind {
            SkillKind::Share => self.skills.share,
            SkillKind::Luck => self.skills.luck,
            SkillKind::Betray => self.skills.betray,
        }
    }

    /// Increment one activity counter.
    pub fn increment_counter(&mut self, kind: CounterKind) {
        match kind {
            CounterKind::TheftAttempts => self.counters.theft_attempts += 1,
            CounterKind::TheftSuccesses => self.counters.theft_successes += 1,
            CounterKind::TheftFailures => self.counters.theft_failures += 1,
            CounterKind::TheftsDefended => self.counters.thefts_defended += 1,
            CounterKind::HeistsJoined => self.counters.heists_joined += 1,
            CounterKind::BetrayalAttempts => self.counters.betrayal_attempts += 1,
            CounterKind::BetrayalSuccesses => self.counters.betrayal_successes += 1,
            CounterKind::TimesBetrayed => self.counters.times_betrayed += 1,
        }
    }

    /// Read one activity counter.
    pub fn counter(&self, kind: CounterKind) -> i64 {
        match kind {
            CounterKind::TheftAttempts => self.counters.theft_attempts,
            CounterKind::TheftSuccesses => self.counters.theft_successes,
            CounterKind::TheftFailures => self.counters.theft_failures,
            CounterKind::TheftsDefended => self.counters.thefts_defended,
            CounterKind::HeistsJoined => self.counters.heists_joined,
            CounterKind::BetrayalAttempts => self.counters.betrayal_attempts,
            CounterKind::BetrayalSuccesses => self.counters.betrayal_successes,
            CounterKind::TimesBetrayed => self.counters.times_betrayed,
        }
    }

    /// Apply an experience grant and run the level-up cascade.
    ///
    /// While `exp >= level * multiplier`, the threshold is consumed and the
    /// level rises. Stat increments apply once for all levels gained; the
    /// per-level cash and reputation rewards accumulate per level crossed.
    /// Granting a non-positive amount is a no-op.
    pub fn grant_experience(&mut self, grant: &ExperienceGrant) -> LevelUpSummary {
        let mut summary = LevelUpSummary::default();
        if grant.amount <= 0 {
            return summary;
        }
        self.exp += grant.amount;
        while self.exp >= self.level * grant.level_multiplier {
            self.exp -= self.level * grant.level_multiplier;
            self.level += 1;
            summary.levels.push(self.level);
        }
        let gained = summary.levels.len() as i64;
        if gained > 0 {
            let stat_inc = grant.stat_per_level * gained;
            self.stats.strength += stat_inc;
            self.stats.agility += stat_inc;
            self.stats.defense += stat_inc;

            summary.cash_awarded = round_cash(grant.cash_per_level * Decimal::from(gained));
            summary.reputation_awarded = grant.reputation_per_level * gained;
            self.credit_cash(summary.cash_awarded);
            self.adjust_reputation(summary.reputation_awarded);
        }
        summary
    }
}

/// One atomic mutation of a single account.
///
/// A batch of these is applied by the store inside one transaction;
/// precondition checks (strict debits) run against the row as read there.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountMutation {
    /// Add cash
    CreditCash(Decimal),
    /// Remove cash, shortfall becomes debt
    DebitCash(Decimal),
    /// Remove cash that must be fully covered
    DebitCashStrict(Decimal),
    /// Add crypto
    CreditCrypto(Decimal),
    /// Remove crypto, fails on shortfall
    DebitCrypto(Decimal),
    /// Shift reputation
    AdjustReputation(i64),
    /// Shift a skill, clamped to `0..=max`
    AdjustSkill {
        /// Which skill
        kind: SkillKind,
        /// Signed change
        delta: i64,
        /// Upper clamp
        max: i64,
    },
    /// Increment an activity counter
    IncrementCounter(CounterKind),
    /// Set the display name
    SetUsername(String),
    /// Record who referred this account (first write wins)
    SetReferrer(AccountId),
}

impl Account {
    /// Apply one mutation in place.
    ///
    /// # Errors
    /// Strict debits surface their `DomainError` and leave the account
    /// untouched; every other variant is infallible.
    pub fn apply(&mut self, mutation: &AccountMutation) -> Result<(), DomainError> {
        match mutation {
            AccountMutation::CreditCash(amount) => self.credit_cash(*amount),
            AccountMutation::DebitCash(amount) => {
                self.debit_cash(*amount);
            },
            AccountMutation::DebitCashStrict(amount) => self.debit_cash_strict(*amount)?,
            AccountMutation::CreditCrypto(amount) => self.credit_crypto(*amount),
            AccountMutation::DebitCrypto(amount) => self.debit_crypto(*amount)?,
            AccountMutation::AdjustReputation(delta) => self.adjust_reputation(*delta),
            AccountMutation::AdjustSkill { kind, delta, max } => {
                self.adjust_skill(*kind, *delta, *max);
            },
            AccountMutation::IncrementCounter(kind) => self.increment_counter(*kind),
            AccountMutation::SetUsername(name) => self.username = Some(name.clone()),
            AccountMutation::SetReferrer(id) => {
                if self.referrer.is_none() && *id != self.id {
                    self.referrer = Some(*id);
                }
            },
        }
        Ok(())
    }
}

/// Parameters of one experience grant, resolved from config by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExperienceGrant {
    /// Experience points to add
    pub amount: i64,
    /// Threshold factor: level N requires `N * level_multiplier` exp
    pub level_multiplier: i64,
    /// Stat points granted per level crossed
    pub stat_per_level: i64,
    /// Cash reward per level crossed
    pub cash_per_level: Decimal,
    /// Reputation reward per level crossed
    pub reputation_per_level: i64,
}

/// What a level-up cascade produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelUpSummary {
    /// Every level reached, in increasing order (empty if none)
    pub levels: Vec<i64>,
    /// Total cash reward credited
    pub cash_awarded: Decimal,
    /// Total reputation credited
    pub reputation_awarded: i64,
}

impl LevelUpSummary {
    /// Number of levels gained by the grant.
    pub fn levels_gained(&self) -> i64 {
        self.levels.len() as i64
    }
}

// =============================================================================
// Order
// =============================================================================

/// A resting exchange order.
///
/// While active, locked collateral always equals `remaining * price` (buy,
/// in cash) or `remaining` (sell, in crypto).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Owning account
    pub owner: AccountId,
    /// Buy or sell
    pub side: OrderSide,
    /// Integer unit price in cash
    pub price: i64,
    /// Unfilled amount of crypto, 4 decimal places
    pub remaining: Decimal,
    /// Locked collateral backing the remainder
    pub collateral: Decimal,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Submission time (time priority key)
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new active order with its collateral computed.
    pub fn new(owner: AccountId, side: OrderSide, amount: Decimal, price: i64) -> Self {
        let remaining = round_crypto(amount);
        Self {
            id: Uuid::now_v7(),
            owner,
            side,
            price,
            remaining,
            collateral: Self::collateral_for(side, remaining, price),
            status: OrderStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Collateral required to back `amount` at `price` on `side`.
    pub fn collateral_for(side: OrderSide, amount: Decimal, price: i64) -> Decimal {
        match side {
            OrderSide::Buy => round_cash(amount * Decimal::from(price)),
            OrderSide::Sell => round_crypto(amount),
        }
    }

    /// Whether the order is still on the book.
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }
}

/// Post-fill state of one order inside a [`TradePlan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderFill {
    /// Remaining amount after the fill
    pub remaining: Decimal,
    /// Locked collateral after the fill
    pub collateral: Decimal,
    /// Whether the order completed (remainder at or under epsilon)
    pub completed: bool,
}

/// Everything one trade moves, computed before any state is touched.
///
/// Produced by [`plan_trade`] from two fresh order rows and applied by the
/// store in the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    /// Crypto amount traded
    pub amount: Decimal,
    /// Execution price (the sell order's price)
    pub price: i64,
    /// Crypto credited to the buyer
    pub buyer_crypto: Decimal,
    /// Cash credited to the seller out of the buyer's collateral
    pub seller_cash: Decimal,
    /// Cash returned to the buyer (price improvement and completion dust)
    pub buyer_cash_refund: Decimal,
    /// Crypto returned to the seller (completion dust)
    pub seller_crypto_refund: Decimal,
    /// Buy order after the fill
    pub buy_after: OrderFill,
    /// Sell order after the fill
    pub sell_after: OrderFill,
}

/// Plan the trade between a crossing buy/sell pair.
///
/// Returns `None` when the pair no longer crosses or either order left the
/// book; callers treat that as "re-read and retry". The execution price is
/// the resting sell's price; a buy filled below its limit gets the price
/// difference refunded out of its cash collateral. Collateral released on
/// either side is split exactly between the counterparty leg and the
/// owner's refund, so cash and crypto are conserved to the cent.
pub fn plan_trade(buy: &Order, sell: &Order) -> Option<TradePlan> {
    if !buy.is_active() || !sell.is_active() {
        return None;
    }
    if buy.side != OrderSide::Buy || sell.side != OrderSide::Sell {
        return None;
    }
    if buy.price < sell.price {
        return None;
    }
    let amount = buy.remaining.min(sell.remaining);
    if amount <= Decimal::ZERO {
        return None;
    }
    let price = sell.price;

    // Buy side: consumed collateral covers the seller's cash plus any refund.
    let buy_remaining = round_crypto(buy.remaining - amount);
    let buy_completed = buy_remaining <= CRYPTO_EPSILON;
    let buy_collateral = if buy_completed {
        Decimal::ZERO
    } else {
        Order::collateral_for(OrderSide::Buy, buy_remaining, buy.price)
    };
    let consumed = round_cash(buy.collateral - buy_collateral);
    let seller_cash = round_cash(amount * Decimal::from(price)).min(consumed);
    let buyer_cash_refund = round_cash(consumed - seller_cash);

    // Sell side: released collateral covers the buyer's crypto plus dust.
    let sell_remaining = round_crypto(sell.remaining - amount);
    let sell_completed = sell_remaining <= CRYPTO_EPSILON;
    let sell_collateral = if sell_completed { Decimal::ZERO } else { sell_remaining };
    let released = round_crypto(sell.collateral - sell_collateral);
    let seller_crypto_refund = round_crypto(released - amount).max(Decimal::ZERO);

    Some(TradePlan {
        amount,
        price,
        buyer_crypto: amount,
        seller_cash,
        buyer_cash_refund,
        seller_crypto_refund,
        buy_after: OrderFill {
            remaining: buy_remaining,
            collateral: buy_collateral,
            completed: buy_completed,
        },
        sell_after: OrderFill {
            remaining: sell_remaining,
            collateral: sell_collateral,
            completed: sell_completed,
        },
    })
}

/// Immutable record of one executed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade id
    pub id: TradeId,
    /// Buy order involved
    pub buy_order: OrderId,
    /// Sell order involved
    pub sell_order: OrderId,
    /// Buying account
    pub buyer: AccountId,
    /// Selling account
    pub seller: AccountId,
    /// Crypto amount traded
    pub amount: Decimal,
    /// Execution price
    pub price: i64,
    /// Execution time
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Build a trade record from the matched orders and the planned fill.
    pub fn from_plan(buy: &Order, sell: &Order, plan: &TradePlan) -> Self {
        Self {
            id: Uuid::now_v7(),
            buy_order: buy.id,
            sell_order: sell.id,
            buyer: buy.owner,
            seller: sell.owner,
            amount: plan.amount,
            price: plan.price,
            executed_at: Utc::now(),
        }
    }
}

/// One aggregated price level of the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price of the level
    pub price: i64,
    /// Summed remaining amount across orders at this price
    pub amount: Decimal,
    /// Number of resting orders at this price
    pub orders: usize,
}

// =============================================================================
// Heist
// =============================================================================

/// A timed per-room event distributing a pot among participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heist {
    /// Heist id
    pub id: HeistId,
    /// Room the heist runs in
    pub room: RoomId,
    /// Template keyword the heist was drawn from
    pub template: String,
    /// Total cash pot, integer
    pub pot: i64,
    /// Optional crypto bonus (zero when the bonus roll failed)
    pub bonus: Decimal,
    /// Per-head crypto bonus, fixed at the join close
    pub bonus_share: Decimal,
    /// Current phase
    pub phase: HeistPhase,
    /// End of the join window
    pub join_deadline: DateTime<Utc>,
    /// End of the betrayal window
    pub split_deadline: DateTime<Utc>,
    /// When the heist spawned
    pub created_at: DateTime<Utc>,
}

impl Heist {
    /// Create a heist in the joining phase.
    pub fn new(
        room: RoomId,
        template: impl Into<String>,
        pot: i64,
        bonus: Decimal,
        join_deadline: DateTime<Utc>,
        split_deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            room,
            template: template.into(),
            pot,
            bonus: round_crypto(bonus),
            bonus_share: Decimal::ZERO,
            phase: HeistPhase::Joining,
            join_deadline,
            split_deadline,
            created_at: Utc::now(),
        }
    }

    /// Even cash share of the pot for `participants` heads, 2 decimals.
    pub fn base_share(&self, participants: usize) -> Decimal {
        round_cash(Decimal::from(self.pot) / Decimal::from(participants as i64))
    }

    /// Even crypto share of the bonus for `participants` heads, 4 decimals.
    pub fn bonus_share_for(&self, participants: usize) -> Decimal {
        round_crypto(self.bonus / Decimal::from(participants as i64))
    }

    /// Advance the phase.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPhaseTransition` for anything that is
    /// not a legal forward move.
    pub fn advance(&mut self, to: HeistPhase) -> Result<(), DomainError> {
        if !self.phase.can_advance_to(to) {
            return Err(DomainError::InvalidPhaseTransition { from: self.phase, to });
        }
        self.phase = to;
        Ok(())
    }

    /// Whether the heist reached its terminal phase.
    pub fn is_finished(&self) -> bool {
        self.phase == HeistPhase::Finished
    }
}

/// One account's stake in a heist's splitting phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Heist this stake belongs to
    pub heist: HeistId,
    /// Staking account
    pub account: AccountId,
    /// Share assigned at the join close
    pub base_share: Decimal,
    /// Current claim, mutated only by betrayals
    pub current_share: Decimal,
    /// Temporary defense built up by surviving failed betrayals
    pub defense_bonus: i64,
    /// When the account joined
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Register a participant during the joining phase (shares unset).
    pub fn new(heist: HeistId, account: AccountId) -> Self {
        Self {
            heist,
            account,
            base_share: Decimal::ZERO,
            current_share: Decimal::ZERO,
            defense_bonus: 0,
            joined_at: Utc::now(),
        }
    }
}

/// Tuning knobs for one betrayal resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetrayalTuning {
    /// Percent of the target's share stolen on success
    pub steal_pct: Decimal,
    /// Percent of the attacker's share forfeited on failure
    pub fail_pct: Decimal,
    /// Defense bonus the target gains per failed betrayal against them
    pub defense_increment: i64,
    /// Upper bound on the defense bonus
    pub defense_cap: i64,
}

/// Move share between two participants according to the roll outcome.
///
/// On success the steal moves target -> attacker and the target's defense
/// resets; on failure the penalty moves attacker -> target and the target's
/// defense grows (capped). Returns the cash amount moved. Both shares are
/// re-rounded, so the pair's sum is preserved exactly.
pub fn apply_betrayal_outcome(
    attacker: &mut Participant,
    target: &mut Participant,
    success: bool,
    tuning: &BetrayalTuning,
) -> Decimal {
    if success {
        let steal = round_cash(target.current_share * tuning.steal_pct / Decimal::ONE_HUNDRED);
        target.current_share = round_cash(target.current_share - steal);
        attacker.current_share = round_cash(attacker.current_share + steal);
        target.defense_bonus = 0;
        steal
    } else {
        let penalty = round_cash(attacker.current_share * tuning.fail_pct / Decimal::ONE_HUNDRED);
        attacker.current_share = round_cash(attacker.current_share - penalty);
        target.current_share = round_cash(target.current_share + penalty);
        target.defense_bonus = (target.defense_bonus + tuning.defense_increment).min(tuning.defense_cap);
        penalty
    }
}

/// Fold any rounding drift between the pot and the share sum into one
/// participant's share.
///
/// The participant with the lowest account id absorbs the remainder, which
/// keeps the reconciliation deterministic regardless of fetch order.
/// Returns the drift applied (zero when the sum already matched).
pub fn reconcile_shares(pot: i64, participants: &mut [Participant]) -> Decimal {
    let total: Decimal = participants.iter().map(|p| p.current_share).sum();
    let drift = round_cash(Decimal::from(pot) - total);
    if drift != Decimal::ZERO {
        if let Some(anchor) = participants.iter_mut().min_by_key(|p| p.account) {
            anchor.current_share = round_cash(anchor.current_share + drift);
        }
    }
    drift
}

/// One participant's payout at heist settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeistPayout {
    /// Receiving account
    pub account: AccountId,
    /// Cash credited
    pub cash: Decimal,
    /// Crypto bonus credited
    pub crypto: Decimal,
}

/// Append-only record of one betrayal attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetrayalRecord {
    /// Record id
    pub id: Uuid,
    /// Heist the betrayal happened in
    pub heist: HeistId,
    /// Attacking participant
    pub attacker: AccountId,
    /// Targeted participant
    pub target: AccountId,
    /// Whether the attacker's roll succeeded
    pub success: bool,
    /// Cash share moved (steal on success, penalty on failure)
    pub amount: Decimal,
    /// When the betrayal resolved
    pub occurred_at: DateTime<Utc>,
}

impl BetrayalRecord {
    /// Build a record for a resolved betrayal.
    pub fn new(
        heist: HeistId,
        attacker: AccountId,
        target: AccountId,
        success: bool,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            heist,
            attacker,
            target,
            success,
            amount,
            occurred_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account::new(7, dec!(100.00))
    }

    // Ledger invariants

    #[test]
    fn test_debit_cash_never_goes_negative() {
        let mut acc = account();
        let debit = acc.debit_cash(dec!(150));
        assert_eq!(acc.cash, dec!(0));
        assert_eq!(acc.debt, dec!(50.00));
        assert_eq!(debit.taken, dec!(100.00));
        assert_eq!(debit.debt_added, dec!(50.00));
    }

    #[test]
    fn test_debit_cash_accumulates_shortfalls() {
        let mut acc = account();
        acc.debit_cash(dec!(120));
        acc.debit_cash(dec!(30));
        assert_eq!(acc.cash, dec!(0));
        assert_eq!(acc.debt, dec!(50.00));
    }

    #[test]
    fn test_debit_cash_strict_rejects_shortfall() {
        let mut acc = account();
        let err = acc.debit_cash_strict(dec!(100.01)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientCash { .. }));
        assert_eq!(acc.cash, dec!(100.00));
    }

    #[test]
    fn test_debit_crypto_fails_whole() {
        let mut acc = account();
        acc.credit_crypto(dec!(0.5));
        assert!(acc.debit_crypto(dec!(0.6)).is_err());
        assert_eq!(acc.crypto, dec!(0.5000));
        assert!(acc.debit_crypto(dec!(0.5)).is_ok());
        assert_eq!(acc.crypto, dec!(0));
    }

    #[test]
    fn test_skill_clamped_to_range() {
        let mut acc = account();
        assert_eq!(acc.adjust_skill(SkillKind::Betray, 3, 10), 3);
        assert_eq!(acc.adjust_skill(SkillKind::Betray, 20, 10), 10);
        assert_eq!(acc.adjust_skill(SkillKind::Betray, -99, 10), 0);
        assert_eq!(acc.skill(SkillKind::Share), 0);
    }

    // Progression

    fn grant(amount: i64) -> ExperienceGrant {
        ExperienceGrant {
            amount,
            level_multiplier: 100,
            stat_per_level: 2,
            cash_per_level: dec!(50),
            reputation_per_level: 1,
        }
    }

    #[test]
    fn test_grant_experience_no_level() {
        let mut acc = account();
        let summary = acc.grant_experience(&grant(50));
        assert_eq!(acc.exp, 50);
        assert_eq!(acc.level, 1);
        assert!(summary.levels.is_empty());
        assert_eq!(acc.cash, dec!(100.00));
    }

    #[test]
    fn test_grant_experience_cascades_levels() {
        let mut acc = account();
        // 100 (level 1) + 200 (level 2) thresholds, 30 left over
        let summary = acc.grant_experience(&grant(330));
        assert_eq!(acc.level, 3);
        assert_eq!(acc.exp, 30);
        assert_eq!(summary.levels, vec![2, 3]);
        assert_eq!(summary.cash_awarded, dec!(100));
        assert_eq!(summary.reputation_awarded, 2);
        assert_eq!(acc.stats.strength, 4);
        assert_eq!(acc.cash, dec!(200.00));
        assert_eq!(acc.reputation, 2);
    }

    #[test]
    fn test_grant_experience_non_positive_is_noop() {
        let mut acc = account();
        let before = acc.clone();
        acc.grant_experience(&grant(0));
        acc.grant_experience(&grant(-5));
        assert_eq!(acc, before);
    }

    // Orders and trade planning

    #[test]
    fn test_order_collateral() {
        let buy = Order::new(1, OrderSide::Buy, dec!(2), 100);
        assert_eq!(buy.collateral, dec!(200.00));
        let sell = Order::new(2, OrderSide::Sell, dec!(1.5), 90);
        assert_eq!(sell.collateral, dec!(1.5000));
    }

    #[test]
    fn test_plan_trade_partial_fill_price_improvement() {
        // Scenario: buy 2 @ 100 against a resting sell 1 @ 90.
        let buy = Order::new(1, OrderSide::Buy, dec!(2), 100);
        let sell = Order::new(2, OrderSide::Sell, dec!(1), 90);
        let plan = plan_trade(&buy, &sell).unwrap();

        assert_eq!(plan.amount, dec!(1));
        assert_eq!(plan.price, 90);
        assert_eq!(plan.seller_cash, dec!(90.00));
        // Buyer locked 1 x 100 for this slice, pays 90, 10 back.
        assert_eq!(plan.buyer_cash_refund, dec!(10.00));
        assert_eq!(plan.buy_after.remaining, dec!(1));
        assert_eq!(plan.buy_after.collateral, dec!(100.00));
        assert!(!plan.buy_after.completed);
        assert!(plan.sell_after.completed);
        assert_eq!(plan.sell_after.collateral, dec!(0));
    }

    #[test]
    fn test_plan_trade_conserves_collateral() {
        let buy = Order::new(1, OrderSide::Buy, dec!(0.7531), 103);
        let sell = Order::new(2, OrderSide::Sell, dec!(0.5), 97);
        let plan = plan_trade(&buy, &sell).unwrap();

        let consumed = buy.collateral - plan.buy_after.collateral;
        assert_eq!(consumed, plan.seller_cash + plan.buyer_cash_refund);

        let released = sell.collateral - plan.sell_after.collateral;
        assert_eq!(released, plan.buyer_crypto + plan.seller_crypto_refund);
    }

    #[test]
    fn test_plan_trade_rejects_non_crossing() {
        let buy = Order::new(1, OrderSide::Buy, dec!(1), 80);
        let sell = Order::new(2, OrderSide::Sell, dec!(1), 90);
        assert!(plan_trade(&buy, &sell).is_none());
    }

    #[test]
    fn test_plan_trade_rejects_inactive() {
        let mut buy = Order::new(1, OrderSide::Buy, dec!(1), 100);
        let sell = Order::new(2, OrderSide::Sell, dec!(1), 90);
        buy.status = OrderStatus::Cancelled;
        assert!(plan_trade(&buy, &sell).is_none());
    }

    #[test]
    fn test_plan_trade_epsilon_dust_completes_order() {
        let buy = Order::new(1, OrderSide::Buy, dec!(1.0001), 100);
        let sell = Order::new(2, OrderSide::Sell, dec!(1), 100);
        let plan = plan_trade(&buy, &sell).unwrap();
        // 0.0001 left is within epsilon: completed, collateral zeroed,
        // residual value refunded to the buyer.
        assert!(plan.buy_after.completed);
        assert_eq!(plan.buy_after.collateral, dec!(0));
        let consumed = buy.collateral - plan.buy_after.collateral;
        assert_eq!(consumed, plan.seller_cash + plan.buyer_cash_refund);
    }

    // Heist

    #[test]
    fn test_heist_shares() {
        let heist = Heist::new(1, "vault", 100, dec!(0.01), Utc::now(), Utc::now());
        assert_eq!(heist.base_share(4), dec!(25.00));
        assert_eq!(heist.base_share(3), dec!(33.33));
        assert_eq!(heist.bonus_share_for(3), dec!(0.0033));
    }

    #[test]
    fn test_heist_phase_is_monotonic() {
        let mut heist = Heist::new(1, "vault", 100, dec!(0), Utc::now(), Utc::now());
        heist.advance(HeistPhase::Splitting).unwrap();
        assert!(heist.advance(HeistPhase::Joining).is_err());
        heist.advance(HeistPhase::Finished).unwrap();
        assert!(heist.advance(HeistPhase::Splitting).is_err());
        assert!(heist.is_finished());
    }

    fn participant(heist: HeistId, account: AccountId, share: Decimal) -> Participant {
        let mut p = Participant::new(heist, account);
        p.base_share = share;
        p.current_share = share;
        p
    }

    #[test]
    fn test_betrayal_success_moves_steal_and_resets_defense() {
        let heist = Uuid::now_v7();
        let mut attacker = participant(heist, 1, dec!(25.00));
        let mut target = participant(heist, 2, dec!(25.00));
        target.defense_bonus = 30;

        let tuning = BetrayalTuning {
            steal_pct: dec!(30),
            fail_pct: dec!(15),
            defense_increment: 10,
            defense_cap: 50,
        };
        let moved = apply_betrayal_outcome(&mut attacker, &mut target, true, &tuning);

        assert_eq!(moved, dec!(7.50));
        assert_eq!(attacker.current_share, dec!(32.50));
        assert_eq!(target.current_share, dec!(17.50));
        assert_eq!(target.defense_bonus, 0);
    }

    #[test]
    fn test_betrayal_failure_pays_penalty_and_raises_defense() {
        let heist = Uuid::now_v7();
        let mut attacker = participant(heist, 1, dec!(20.00));
        let mut target = participant(heist, 2, dec!(20.00));
        target.defense_bonus = 45;

        let tuning = BetrayalTuning {
            steal_pct: dec!(30),
            fail_pct: dec!(15),
            defense_increment: 10,
            defense_cap: 50,
        };
        let moved = apply_betrayal_outcome(&mut attacker, &mut target, false, &tuning);

        assert_eq!(moved, dec!(3.00));
        assert_eq!(attacker.current_share, dec!(17.00));
        assert_eq!(target.current_share, dec!(23.00));
        assert_eq!(target.defense_bonus, 50); // capped
    }

    #[test]
    fn test_betrayal_preserves_share_sum() {
        let heist = Uuid::now_v7();
        let mut attacker = participant(heist, 1, dec!(33.33));
        let mut target = participant(heist, 2, dec!(33.33));
        let tuning = BetrayalTuning {
            steal_pct: dec!(30),
            fail_pct: dec!(15),
            defense_increment: 10,
            defense_cap: 50,
        };
        let before = attacker.current_share + target.current_share;
        apply_betrayal_outcome(&mut attacker, &mut target, true, &tuning);
        assert_eq!(attacker.current_share + target.current_share, before);
    }

    #[test]
    fn test_reconcile_shares_assigns_drift_to_lowest_id() {
        let heist = Uuid::now_v7();
        // 100 / 3 = 33.33 each, 0.01 drift
        let mut participants = vec![
            participant(heist, 42, dec!(33.33)),
            participant(heist, 7, dec!(33.33)),
            participant(heist, 99, dec!(33.33)),
        ];
        let drift = reconcile_shares(100, &mut participants);
        assert_eq!(drift, dec!(0.01));
        let anchor = participants.iter().find(|p| p.account == 7).unwrap();
        assert_eq!(anchor.current_share, dec!(33.34));
        let total: Decimal = participants.iter().map(|p| p.current_share).sum();
        assert_eq!(total, dec!(100.00));
    }

    #[test]
    fn test_reconcile_shares_noop_when_exact() {
        let heist = Uuid::now_v7();
        let mut participants =
            vec![participant(heist, 1, dec!(50.00)), participant(heist, 2, dec!(50.00))];
        assert_eq!(reconcile_shares(100, &mut participants), dec!(0));
    }
}
