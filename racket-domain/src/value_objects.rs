//! Value objects and validated primitives for the racket economy.
//!
//! Monetary values use `rust_decimal::Decimal` throughout: cash is kept at
//! 2 decimal places, the crypto unit at 4. Rounding uses `round_dp`
//! (banker's rounding), so repeated settlement passes are stable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External account identifier (chat-platform user id).
pub type AccountId = i64;

/// External room identifier (chat-platform chat id).
pub type RoomId = i64;

/// Unique identifier for an exchange order.
pub type OrderId = uuid::Uuid;

/// Unique identifier for a trade record.
pub type TradeId = uuid::Uuid;

/// Unique identifier for a heist.
pub type HeistId = uuid::Uuid;

/// Decimal places kept for cash amounts.
pub const CASH_DP: u32 = 2;

/// Decimal places kept for crypto amounts.
pub const CRYPTO_DP: u32 = 4;

/// Order remainders at or below this are treated as fully filled.
pub const CRYPTO_EPSILON: Decimal = dec!(0.0001);

/// Round a cash amount to its canonical 2 decimal places.
pub fn round_cash(value: Decimal) -> Decimal {
    value.round_dp(CASH_DP)
}

/// Round a crypto amount to its canonical 4 decimal places.
pub fn round_crypto(value: Decimal) -> Decimal {
    value.round_dp(CRYPTO_DP)
}

/// Domain errors raised by entity invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Price outside the allowed band
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Cash debit that is not allowed to create debt
    #[error("Insufficient cash: requested {requested}, available {available}")]
    InsufficientCash {
        /// Amount the operation needed
        requested: Decimal,
        /// Cash balance at the time of the attempt
        available: Decimal,
    },

    /// Crypto debit exceeding the balance
    #[error("Insufficient crypto: requested {requested}, available {available}")]
    InsufficientCrypto {
        /// Amount the operation needed
        requested: Decimal,
        /// Crypto balance at the time of the attempt
        available: Decimal,
    },

    /// Heist phases only move forward
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidPhaseTransition {
        /// Phase the heist was in
        from: HeistPhase,
        /// Phase the transition asked for
        to: HeistPhase,
    },
}

// =============================================================================
// Order primitives
// =============================================================================

/// Side of an exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    /// Buys crypto with cash
    Buy,
    /// Sells crypto for cash
    Sell,
}

impl OrderSide {
    /// The side this side trades against.
    pub fn contra(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an exchange order.
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the book, collateral locked
    Active,
    /// Fully filled, collateral released
    Completed,
    /// Cancelled by the owner, collateral refunded
    Cancelled,
}

impl OrderStatus {
    /// Name of the status for display and persistence.
    pub fn name(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

// =============================================================================
// Heist primitives
// =============================================================================

/// Phase of a heist. Transitions are strictly monotonic:
/// `Joining -> Splitting -> Finished`, with `Joining -> Finished` allowed
/// for empty or single-participant heists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeistPhase {
    /// Accepting participants until the join deadline
    Joining,
    /// Pot divided into shares, betrayal window open
    Splitting,
    /// Paid out (or cancelled), immutable
    Finished,
}

impl HeistPhase {
    /// Name of the phase for display and persistence.
    pub fn name(&self) -> &'static str {
        match self {
            HeistPhase::Joining => "joining",
            HeistPhase::Splitting => "splitting",
            HeistPhase::Finished => "finished",
        }
    }

    /// Whether advancing from `self` to `to` is a legal forward transition.
    pub fn can_advance_to(self, to: HeistPhase) -> bool {
        matches!(
            (self, to),
            (HeistPhase::Joining, HeistPhase::Splitting)
                | (HeistPhase::Joining, HeistPhase::Finished)
                | (HeistPhase::Splitting, HeistPhase::Finished)
        )
    }
}

impl fmt::Display for HeistPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Account primitives
// =============================================================================

/// Trainable skill kinds.
///
/// A closed enum instead of free-form column names: every skill has an
/// explicit update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    /// Raises the owner's cut in shared payouts
    Share,
    /// Raises random-roll odds
    Luck,
    /// Raises betrayal success chance during heists
    Betray,
}

impl SkillKind {
    /// Name of the skill for display and persistence.
    pub fn name(&self) -> &'static str {
        match self {
            SkillKind::Share => "share",
            SkillKind::Luck => "luck",
            SkillKind::Betray => "betray",
        }
    }
}

/// Per-account activity counters, one explicit variant per counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    /// Theft attempts started (any outcome)
    TheftAttempts,
    /// Thefts that transferred cash to the attacker
    TheftSuccesses,
    /// Thefts that failed outright
    TheftFailures,
    /// Thefts this account repelled as the victim
    TheftsDefended,
    /// Heists this account joined
    HeistsJoined,
    /// Betrayals attempted during heists
    BetrayalAttempts,
    /// Betrayals that succeeded
    BetrayalSuccesses,
    /// Times this account was successfully betrayed
    TimesBetrayed,
}

impl CounterKind {
    /// Name of the counter for display and persistence.
    pub fn name(&self) -> &'static str {
        match self {
            CounterKind::TheftAttempts => "theft_attempts",
            CounterKind::TheftSuccesses => "theft_successes",
            CounterKind::TheftFailures => "theft_failures",
            CounterKind::TheftsDefended => "thefts_defended",
            CounterKind::HeistsJoined => "heists_joined",
            CounterKind::BetrayalAttempts => "betrayal_attempts",
            CounterKind::BetrayalSuccesses => "betrayal_successes",
            CounterKind::TimesBetrayed => "times_betrayed",
        }
    }
}

/// Actions gated by a per-account cooldown timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Cash theft attempts
    Theft,
}

impl ActionKind {
    /// Name of the action for display and persistence.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Theft => "theft",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cash_two_places() {
        assert_eq!(round_cash(dec!(10.005)), dec!(10.00)); // banker's
        assert_eq!(round_cash(dec!(10.015)), dec!(10.02));
        assert_eq!(round_cash(dec!(33.333333)), dec!(33.33));
    }

    #[test]
    fn test_round_crypto_four_places() {
        assert_eq!(round_crypto(dec!(0.00005)), dec!(0.0000));
        assert_eq!(round_crypto(dec!(0.00015)), dec!(0.0002));
        assert_eq!(round_crypto(dec!(1.23456)), dec!(1.2346));
    }

    #[test]
    fn test_phase_transitions_are_monotonic() {
        assert!(HeistPhase::Joining.can_advance_to(HeistPhase::Splitting));
        assert!(HeistPhase::Joining.can_advance_to(HeistPhase::Finished));
        assert!(HeistPhase::Splitting.can_advance_to(HeistPhase::Finished));

        assert!(!HeistPhase::Splitting.can_advance_to(HeistPhase::Joining));
        assert!(!HeistPhase::Finished.can_advance_to(HeistPhase::Joining));
        assert!(!HeistPhase::Finished.can_advance_to(HeistPhase::Splitting));
        assert!(!HeistPhase::Joining.can_advance_to(HeistPhase::Joining));
    }

    #[test]
    fn test_order_side_contra() {
        assert_eq!(OrderSide::Buy.contra(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.contra(), OrderSide::Buy);
    }

    #[test]
    fn test_names_are_stable() {
        assert_eq!(SkillKind::Betray.name(), "betray");
        assert_eq!(CounterKind::TheftAttempts.name(), "theft_attempts");
        assert_eq!(OrderStatus::Active.name(), "active");
        assert_eq!(HeistPhase::Splitting.name(), "splitting");
        assert_eq!(ActionKind::Theft.name(), "theft");
    }
}
