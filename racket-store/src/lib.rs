//! Racket storage layer
//!
//! Repository ports over the shared relational state, a complete
//! thread-safe in-memory implementation, and a feature-gated PostgreSQL
//! adapter for durable snapshots and deadline recovery.
//!
//! Every port method is an atomic command: preconditions are re-verified
//! against the rows as read inside the command, never against values the
//! caller read earlier.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{
    AccountRepository, CooldownRepository, HeistRepository, JoinClose, MatchResult,
    OrderRepository, SettingsRepository, Store, TakeResult, TradeRepository,
};

#[cfg(feature = "postgres")]
pub use postgres::{DeadlineRecovery, PgRecoveryReader};
