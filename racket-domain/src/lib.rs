//! Racket domain layer
//!
//! Pure domain logic with zero I/O dependencies: the account ledger model,
//! exchange orders and trade planning, the heist state machine, and the
//! economy tuning configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod entities;
pub mod events;
pub mod value_objects;

pub use config::{
    CombatConfig, EconomyConfig, ExchangeConfig, HeistConfig, HeistTemplate, LedgerConfig,
    ProgressionConfig,
};
pub use entities::{
    apply_betrayal_outcome, plan_trade, reconcile_shares, Account, AccountMutation, BetrayalRecord,
    BetrayalTuning, BookLevel, CashDebit, Counters, ExperienceGrant, Heist, HeistPayout,
    LevelUpSummary, Order, OrderFill, Participant, Skills, Stats, Trade, TradePlan,
};
pub use events::{GameEvent, TheftOutcomeKind};
pub use value_objects::{
    round_cash, round_crypto, AccountId, ActionKind, CounterKind, DomainError, HeistId, HeistPhase,
    OrderId, OrderSide, OrderStatus, RoomId, SkillKind, TradeId, CASH_DP, CRYPTO_DP,
    CRYPTO_EPSILON,
};
