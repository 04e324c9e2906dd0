//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the economy core.
//! Implementations can be in-memory (tests, development) or PostgreSQL.
//!
//! The store's transaction mechanism is the only mutual-exclusion
//! primitive in the system, so every method here is an atomic command:
//! compound operations (collateral lock + order insert, one trade, a
//! betrayal spanning two participants, a heist phase transition) re-read
//! and re-verify their preconditions inside the command rather than
//! trusting values the caller read earlier.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use racket_domain::{
    Account, AccountId, AccountMutation, ActionKind, BetrayalRecord, BetrayalTuning,
    ExperienceGrant, Heist, HeistId, HeistPayout, LevelUpSummary, Order, OrderId, OrderSide,
    Participant, RoomId, Trade,
};
use rust_decimal::Decimal;

/// Repository for ledger accounts
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fetch an account, creating it with the starting grant on first
    /// contact. Returns the account and whether it was just created.
    async fn get_or_create(
        &self,
        id: AccountId,
        starting_cash: Decimal,
    ) -> Result<(Account, bool), StoreError>;

    /// Find an account by id
    async fn find(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Apply a batch of mutations to one account atomically.
    ///
    /// The whole batch commits or none of it does: a strict debit that
    /// cannot be covered fails the batch with `InsufficientFunds` and
    /// leaves the row untouched.
    async fn apply(
        &self,
        id: AccountId,
        mutations: &[AccountMutation],
    ) -> Result<Account, StoreError>;

    /// Run the experience grant and level-up cascade on one account.
    async fn grant_experience(
        &self,
        id: AccountId,
        grant: &ExperienceGrant,
    ) -> Result<(Account, LevelUpSummary), StoreError>;

    /// Move cash between two accounts, capped at the source's balance.
    ///
    /// Returns the amount actually moved (possibly zero). Never creates
    /// debt; both rows are updated in the same command.
    async fn transfer_cash(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Decimal, StoreError>;

    /// Claim the one-time referral reward for `id`.
    ///
    /// Returns the referrer to pay exactly once: when the account's
    /// lifetime theft successes reached `threshold`, a referrer is set
    /// and the reward flag was still clear. Sets the flag in the same
    /// command, so concurrent claims cannot double-pay.
    async fn claim_referral_reward(
        &self,
        id: AccountId,
        threshold: i64,
    ) -> Result<Option<AccountId>, StoreError>;
}

/// Result of one executed match
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The trade that was recorded
    pub trade: Trade,
    /// Whether the buy order left the book
    pub buy_completed: bool,
    /// Whether the sell order left the book
    pub sell_completed: bool,
}

/// Result of a taker sweep over one price level
#[derive(Debug, Clone)]
pub struct TakeResult {
    /// Total amount filled (equals the request when it succeeds)
    pub filled: Decimal,
    /// Trades recorded, in time priority of the resting orders
    pub trades: Vec<Trade>,
    /// Resting orders that completed, with their owners
    pub completed: Vec<(OrderId, AccountId)>,
}

/// Repository for exchange orders and trades
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Lock the owner's collateral and insert the order in one command.
    ///
    /// Buy orders lock cash strictly (a shortfall is `InsufficientFunds`,
    /// never debt); sell orders lock crypto.
    async fn insert_with_collateral(&self, order: &Order) -> Result<(), StoreError>;

    /// Find an order by id
    async fn find(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Highest-price active buy, ties broken by earliest submission
    async fn best_bid(&self) -> Result<Option<Order>, StoreError>;

    /// Lowest-price active sell, ties broken by earliest submission
    async fn best_ask(&self) -> Result<Option<Order>, StoreError>;

    /// Execute one trade between a crossing pair.
    ///
    /// Both orders are re-read inside the command; if the pair no longer
    /// crosses (either left the book or prices changed relative order),
    /// the command no-ops and returns `Ok(None)` so the matching loop can
    /// re-read the book.
    async fn execute_match(
        &self,
        buy: OrderId,
        sell: OrderId,
    ) -> Result<Option<MatchResult>, StoreError>;

    /// Fill a taker against resting orders at exactly one price level.
    ///
    /// `side` is the taker's side. The level's depth is checked inside the
    /// command: a request exceeding it fails whole with
    /// `InsufficientDepth` (no partial taker fill). The taker's funds are
    /// debited strictly in the same command.
    async fn take_at_level(
        &self,
        taker: AccountId,
        side: OrderSide,
        price: i64,
        amount: Decimal,
    ) -> Result<TakeResult, StoreError>;

    /// Cancel an active order and refund its remaining collateral.
    ///
    /// Fails with `Conflict` when the order is not active or the
    /// requester does not own it.
    async fn cancel(&self, id: OrderId, requester: AccountId) -> Result<Order, StoreError>;

    /// All active orders (book aggregation happens in the engine)
    async fn find_active(&self) -> Result<Vec<Order>, StoreError>;

    /// Active orders owned by one account
    async fn find_active_by_owner(&self, owner: AccountId) -> Result<Vec<Order>, StoreError>;
}

/// Repository for trade records (append-only)
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Append a trade record
    async fn append(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Most recent trades, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<Trade>, StoreError>;
}

/// Outcome of closing a heist's join window
#[derive(Debug, Clone)]
pub enum JoinClose {
    /// Nobody joined; the heist finished with no payout
    Empty,
    /// A single participant was paid immediately and the heist finished
    PaidSole(HeistPayout),
    /// Two or more participants: the splitting phase began
    Split {
        /// Participants with their shares assigned
        participants: Vec<Participant>,
        /// Even cash share each received
        base_share: Decimal,
        /// Even crypto bonus share fixed for the payout
        bonus_share: Decimal,
    },
}

/// Repository for heists, participants and betrayal records
#[async_trait]
pub trait HeistRepository: Send + Sync {
    /// Insert a new heist.
    ///
    /// Fails with `Duplicate` when the room already has a non-finished
    /// heist.
    async fn insert(&self, heist: &Heist) -> Result<(), StoreError>;

    /// Find a heist by id
    async fn find(&self, id: HeistId) -> Result<Option<Heist>, StoreError>;

    /// The room's non-finished heist, if any
    async fn find_active_by_room(&self, room: RoomId) -> Result<Option<Heist>, StoreError>;

    /// Every non-finished heist (deadline recovery at startup)
    async fn find_unfinished(&self) -> Result<Vec<Heist>, StoreError>;

    /// Register a participant while the join window is open.
    ///
    /// Idempotent: returns `false` when the account already joined.
    /// Fails with `Conflict` outside the joining phase or past the join
    /// deadline.
    async fn add_participant(&self, heist: HeistId, account: AccountId)
        -> Result<bool, StoreError>;

    /// Participants of a heist
    async fn participants(&self, heist: HeistId) -> Result<Vec<Participant>, StoreError>;

    /// Close the join window: the deadline-driven `joining` transition.
    ///
    /// The phase is checked inside the command; a heist that already
    /// moved on fails with `Conflict` so a late timer can no-op.
    async fn close_joining(&self, heist: HeistId) -> Result<JoinClose, StoreError>;

    /// Resolve one betrayal between two current participants.
    ///
    /// Spans exactly the attacker's and target's rows in one command; the
    /// amounts are computed from the rows as read there, so concurrent
    /// betrayals cannot break the share-sum invariant. Fails with
    /// `Conflict` outside the splitting phase or past the split deadline.
    async fn apply_betrayal(
        &self,
        heist: HeistId,
        attacker: AccountId,
        target: AccountId,
        success: bool,
        tuning: &BetrayalTuning,
    ) -> Result<BetrayalRecord, StoreError>;

    /// Settle the splitting phase: the deadline-driven final payout.
    ///
    /// Reconciles rounding drift to the lowest account id, credits every
    /// participant (cash share plus crypto bonus share), removes the
    /// participants and finishes the heist — all in one command. Fails
    /// with `Conflict` when the heist is not splitting.
    async fn settle_split(&self, heist: HeistId) -> Result<Vec<HeistPayout>, StoreError>;

    /// Betrayal records of a heist, oldest first
    async fn betrayals(&self, heist: HeistId) -> Result<Vec<BetrayalRecord>, StoreError>;
}

/// Repository for per-(account, action) cooldown stamps
#[async_trait]
pub trait CooldownRepository: Send + Sync {
    /// When the account last attempted the action, if ever
    async fn last_attempt(
        &self,
        account: AccountId,
        action: ActionKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Record an attempt time, replacing any previous stamp
    async fn stamp(
        &self,
        account: AccountId,
        action: ActionKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Repository for admin-tunable settings overrides
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Read a setting value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a setting value
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Combined store interface
#[async_trait]
pub trait Store: Send + Sync {
    /// Get account repository
    fn accounts(&self) -> &dyn AccountRepository;

    /// Get order repository
    fn orders(&self) -> &dyn OrderRepository;

    /// Get trade repository
    fn trades(&self) -> &dyn TradeRepository;

    /// Get heist repository
    fn heists(&self) -> &dyn HeistRepository;

    /// Get cooldown repository
    fn cooldowns(&self) -> &dyn CooldownRepository;

    /// Get settings repository
    fn settings(&self) -> &dyn SettingsRepository;
}
