//! Test helpers for the racket workspace.
//!
//! Seeding helpers over the in-memory store and a tracing initializer for
//! integration tests. Kept free of the engine crate so every layer can use
//! it.

#![warn(clippy::all)]

use chrono::{Duration, Utc};
use racket_domain::{Account, AccountId, AccountMutation, Heist, RoomId};
use racket_store::{AccountRepository, MemoryStore, StoreError};
use rust_decimal::Decimal;

/// Initialize tracing for tests; safe to call more than once.
///
/// Honors `RUST_LOG`, defaulting to warnings only so test output stays
/// readable.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Create an account holding exactly `cash`.
pub async fn seed_account(
    store: &MemoryStore,
    id: AccountId,
    cash: Decimal,
) -> Result<Account, StoreError> {
    let (account, _) = store.get_or_create(id, cash).await?;
    Ok(account)
}

/// Create an account holding `cash` and `crypto`.
pub async fn seed_funded_account(
    store: &MemoryStore,
    id: AccountId,
    cash: Decimal,
    crypto: Decimal,
) -> Result<Account, StoreError> {
    store.get_or_create(id, cash).await?;
    if crypto > Decimal::ZERO {
        return store.apply(id, &[AccountMutation::CreditCrypto(crypto)]).await;
    }
    AccountRepository::find(store, id)
        .await?
        .ok_or_else(|| StoreError::not_found("account", id))
}

/// A heist whose join window is open for `join_secs` more seconds.
pub fn open_heist(room: RoomId, pot: i64, bonus: Decimal, join_secs: i64) -> Heist {
    let join_deadline = Utc::now() + Duration::seconds(join_secs);
    Heist::new(room, "casino_vault", pot, bonus, join_deadline, join_deadline + Duration::seconds(join_secs))
}

/// A heist whose join deadline already passed (deadline-recovery tests).
pub fn expired_heist(room: RoomId, pot: i64) -> Heist {
    Heist::new(
        room,
        "armored_truck",
        pot,
        Decimal::ZERO,
        Utc::now() - Duration::seconds(5),
        Utc::now() + Duration::seconds(55),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seed_helpers() {
        init_tracing();
        let store = MemoryStore::new();
        let account = seed_account(&store, 1, dec!(42)).await.unwrap();
        assert_eq!(account.cash, dec!(42.00));

        let funded = seed_funded_account(&store, 2, dec!(10), dec!(0.5)).await.unwrap();
        assert_eq!(funded.cash, dec!(10.00));
        assert_eq!(funded.crypto, dec!(0.5000));
    }

    #[test]
    fn test_heist_builders() {
        let heist = open_heist(1, 100, dec!(0), 30);
        assert!(heist.join_deadline > Utc::now());
        let expired = expired_heist(1, 100);
        assert!(expired.join_deadline < Utc::now());
    }
}
