//! Notification events emitted by the economy core.
//!
//! External collaborators (transport, rendering) subscribe to these and
//! translate them into user-facing messages. Events are immutable and
//! serializable for audit trails.

use crate::entities::HeistPayout;
use crate::value_objects::{AccountId, HeistId, OrderId, RoomId, TradeId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Notifications produced by ledger, exchange, heist and combat operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A new account was created with its starting grant
    AccountCreated {
        /// The new account
        account: AccountId,
        /// Starting cash granted
        starting_cash: Decimal,
        /// When the account appeared
        timestamp: DateTime<Utc>,
    },

    /// An account crossed a level threshold
    LevelUp {
        /// The levelling account
        account: AccountId,
        /// Level reached
        level: i64,
        /// Cash reward paid for this level
        cash_reward: Decimal,
        /// Reputation reward paid for this level
        reputation_reward: i64,
        /// When the level was crossed
        timestamp: DateTime<Utc>,
    },

    /// Two orders matched on the exchange
    TradeExecuted {
        /// Trade record id
        trade: TradeId,
        /// Buying account
        buyer: AccountId,
        /// Selling account
        seller: AccountId,
        /// Crypto amount traded
        amount: Decimal,
        /// Execution price
        price: i64,
        /// When the trade executed
        timestamp: DateTime<Utc>,
    },

    /// An order left the book fully filled
    OrderCompleted {
        /// The completed order
        order: OrderId,
        /// Its owner
        owner: AccountId,
        /// When the final fill landed
        timestamp: DateTime<Utc>,
    },

    /// A heist opened its join window
    HeistSpawned {
        /// The new heist
        heist: HeistId,
        /// Room it runs in
        room: RoomId,
        /// Template keyword drawn
        template: String,
        /// Cash pot at stake
        pot: i64,
        /// End of the join window
        join_deadline: DateTime<Utc>,
    },

    /// The join window closed and the splitting phase began
    HeistStarted {
        /// The heist
        heist: HeistId,
        /// Room it runs in
        room: RoomId,
        /// Number of participants locked in
        participants: usize,
        /// Even share assigned to each participant
        base_share: Decimal,
        /// End of the betrayal window
        split_deadline: DateTime<Utc>,
    },

    /// The heist settled (payout, sole-survivor fast path, or empty)
    HeistFinished {
        /// The heist
        heist: HeistId,
        /// Room it ran in
        room: RoomId,
        /// Final payouts, empty when nobody joined
        payouts: Vec<HeistPayout>,
        /// When settlement happened
        timestamp: DateTime<Utc>,
    },

    /// A betrayal resolved during a splitting phase
    BetrayalResolved {
        /// The heist
        heist: HeistId,
        /// Attacking participant
        attacker: AccountId,
        /// Targeted participant
        target: AccountId,
        /// Whether the attacker succeeded
        success: bool,
        /// Share moved between the two
        amount: Decimal,
        /// When the betrayal resolved
        timestamp: DateTime<Utc>,
    },

    /// A theft attempt resolved
    TheftResolved {
        /// Attacking account
        attacker: AccountId,
        /// Victim account
        victim: AccountId,
        /// What happened
        outcome: TheftOutcomeKind,
        /// Cash moved (steal or penalty, zero on a plain failure)
        amount: Decimal,
        /// When the attempt resolved
        timestamp: DateTime<Utc>,
    },

    /// A referrer received their one-time reward
    ReferralRewardPaid {
        /// The referring account being paid
        referrer: AccountId,
        /// The referred account that earned it
        referred: AccountId,
        /// Cash paid
        amount: Decimal,
        /// When the reward was paid
        timestamp: DateTime<Utc>,
    },
}

/// Outcome classes of a theft attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TheftOutcomeKind {
    /// The victim's defense roll stopped the attacker
    Defended,
    /// Cash moved to the attacker
    Success,
    /// The attacker's roll failed
    Failed,
}
