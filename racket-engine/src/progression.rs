//! Progression: the experience and level-up cascade.
//!
//! Every component that rewards experience ends up here. The cascade
//! itself (thresholds, stat grants, per-level rewards) is pure domain
//! logic executed inside one store command; this service resolves the
//! tuning and emits one notification per level crossed.

use crate::error::EngineResult;
use crate::events::EventBus;
use chrono::Utc;
use racket_domain::{AccountId, EconomyConfig, GameEvent, LevelUpSummary};
use racket_store::Store;
use std::sync::Arc;
use tracing::info;

/// Experience accrual service.
pub struct Progression<S> {
    store: Arc<S>,
    config: Arc<EconomyConfig>,
    bus: EventBus,
}

impl<S> Clone for Progression<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<S: Store> Progression<S> {
    /// Create a progression service over the given store.
    pub fn new(store: Arc<S>, config: Arc<EconomyConfig>, bus: EventBus) -> Self {
        Self { store, config, bus }
    }

    /// Grant experience and run the level-up cascade.
    ///
    /// Non-positive amounts are a no-op. Fire-and-forget from the caller's
    /// perspective: the summary is returned for interested callers, side
    /// effects (stats, rewards, notifications) are internal.
    pub async fn grant(&self, account: AccountId, amount: i64) -> EngineResult<LevelUpSummary> {
        if amount <= 0 {
            return Ok(LevelUpSummary::default());
        }
        let grant = self.config.experience_grant(amount);
        let (_, summary) = self.store.accounts().grant_experience(account, &grant).await?;

        for level in &summary.levels {
            info!(account, level, "level up");
            self.bus.send(GameEvent::LevelUp {
                account,
                level: *level,
                cash_reward: self.config.progression.cash_per_level,
                reputation_reward: self.config.progression.reputation_per_level,
                timestamp: Utc::now(),
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racket_store::{AccountRepository, MemoryStore};
    use rust_decimal_macros::dec;

    async fn progression() -> (Progression<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.get_or_create(1, dec!(0)).await.unwrap();
        let service = Progression::new(
            store.clone(),
            Arc::new(EconomyConfig::default()),
            EventBus::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_grant_applies_stats_and_rewards() {
        let (service, store) = progression().await;
        // Levels 1 and 2 cost 100 + 200.
        let summary = service.grant(1, 300).await.unwrap();
        assert_eq!(summary.levels_gained(), 2);

        let account = AccountRepository::find(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(account.level, 3);
        assert_eq!(account.exp, 0);
        assert_eq!(account.stats.strength, 2);
        assert_eq!(account.cash, dec!(100.00)); // 2 x 50 reward
        assert_eq!(account.reputation, 2);
    }

    #[tokio::test]
    async fn test_grant_zero_is_noop() {
        let (service, store) = progression().await;
        let summary = service.grant(1, 0).await.unwrap();
        assert!(summary.levels.is_empty());
        let account = AccountRepository::find(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(account.exp, 0);
    }
}
