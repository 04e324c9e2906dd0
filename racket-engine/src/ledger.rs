//! Ledger service: the only mutation path for account state.
//!
//! Accounts are created lazily on first interaction with the configured
//! starting grant. Every mutating call here is one atomic store command;
//! callers that need several ledger effects to land together use the
//! store's compound commands instead of sequencing calls.

use crate::error::{EngineError, EngineResult};
use crate::events::EventBus;
use crate::progression::Progression;
use chrono::Utc;
use racket_domain::{
    Account, AccountId, AccountMutation, EconomyConfig, GameEvent, LevelUpSummary, SkillKind,
    Skills,
};
use racket_store::Store;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Balance snapshot handed to external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceView {
    /// Cash balance
    pub cash: Decimal,
    /// Accumulated debt
    pub debt: Decimal,
    /// Crypto balance
    pub crypto: Decimal,
    /// Reputation
    pub reputation: i64,
    /// Skill levels
    pub skills: Skills,
    /// Experience toward the next level
    pub exp: i64,
    /// Current level
    pub level: i64,
}

impl From<&Account> for BalanceView {
    fn from(account: &Account) -> Self {
        Self {
            cash: account.cash,
            debt: account.debt,
            crypto: account.crypto,
            reputation: account.reputation,
            skills: account.skills,
            exp: account.exp,
            level: account.level,
        }
    }
}

/// Account ledger service.
pub struct Ledger<S> {
    store: Arc<S>,
    config: Arc<EconomyConfig>,
    bus: EventBus,
    progression: Progression<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            bus: self.bus.clone(),
            progression: self.progression.clone(),
        }
    }
}

impl<S: Store> Ledger<S> {
    /// Create a ledger over the given store.
    pub fn new(store: Arc<S>, config: Arc<EconomyConfig>, bus: EventBus) -> Self {
        let progression = Progression::new(store.clone(), config.clone(), bus.clone());
        Self { store, config, bus, progression }
    }

    /// Fetch the account, creating it with the starting grant if needed.
    pub async fn touch(&self, id: AccountId) -> EngineResult<Account> {
        let starting_cash = self.config.ledger.starting_cash;
        let (account, created) =
            self.store.accounts().get_or_create(id, starting_cash).await?;
        if created {
            info!(account = id, %starting_cash, "account created");
            self.bus.send(GameEvent::AccountCreated {
                account: id,
                starting_cash,
                timestamp: Utc::now(),
            });
        }
        Ok(account)
    }

    /// Balance snapshot, creating the account on first contact.
    pub async fn balance(&self, id: AccountId) -> EngineResult<BalanceView> {
        let account = self.touch(id).await?;
        Ok(BalanceView::from(&account))
    }

    /// Add cash.
    pub async fn credit_cash(&self, id: AccountId, amount: Decimal) -> EngineResult<Account> {
        self.mutate_positive(id, amount, AccountMutation::CreditCash(amount)).await
    }

    /// Remove cash; a shortfall becomes debt, never an error.
    pub async fn debit_cash(&self, id: AccountId, amount: Decimal) -> EngineResult<Account> {
        self.mutate_positive(id, amount, AccountMutation::DebitCash(amount)).await
    }

    /// Add crypto.
    pub async fn credit_crypto(&self, id: AccountId, amount: Decimal) -> EngineResult<Account> {
        self.mutate_positive(id, amount, AccountMutation::CreditCrypto(amount)).await
    }

    /// Remove crypto; fails with `InsufficientFunds` on a shortfall and
    /// leaves the balance unchanged.
    pub async fn debit_crypto(&self, id: AccountId, amount: Decimal) -> EngineResult<Account> {
        self.mutate_positive(id, amount, AccountMutation::DebitCrypto(amount)).await
    }

    /// Shift reputation by `delta` (either sign).
    pub async fn adjust_reputation(&self, id: AccountId, delta: i64) -> EngineResult<Account> {
        self.touch(id).await?;
        let account = self
            .store
            .accounts()
            .apply(id, &[AccountMutation::AdjustReputation(delta)])
            .await?;
        Ok(account)
    }

    /// Shift a skill by `delta`, clamped to the configured range.
    pub async fn adjust_skill(
        &self,
        id: AccountId,
        kind: SkillKind,
        delta: i64,
    ) -> EngineResult<Account> {
        self.touch(id).await?;
        let account = self
            .store
            .accounts()
            .apply(
                id,
                &[AccountMutation::AdjustSkill {
                    kind,
                    delta,
                    max: self.config.ledger.skill_max,
                }],
            )
            .await?;
        debug!(account = id, skill = kind.name(), level = account.skill(kind), "skill adjusted");
        Ok(account)
    }

    /// Record the platform display name, replacing any previous one.
    pub async fn set_username(&self, id: AccountId, name: &str) -> EngineResult<Account> {
        self.touch(id).await?;
        let account = self
            .store
            .accounts()
            .apply(id, &[AccountMutation::SetUsername(name.to_string())])
            .await?;
        Ok(account)
    }

    /// Record who referred this account; only the first referrer sticks,
    /// and self-referrals are ignored.
    pub async fn set_referrer(&self, id: AccountId, referrer: AccountId) -> EngineResult<Account> {
        self.touch(id).await?;
        self.touch(referrer).await?;
        let account = self
            .store
            .accounts()
            .apply(id, &[AccountMutation::SetReferrer(referrer)])
            .await?;
        Ok(account)
    }

    /// Grant experience; the level-up cascade runs in [`Progression`].
    pub async fn grant_experience(
        &self,
        id: AccountId,
        amount: i64,
    ) -> EngineResult<LevelUpSummary> {
        self.touch(id).await?;
        self.progression.grant(id, amount).await
    }

    async fn mutate_positive(
        &self,
        id: AccountId,
        amount: Decimal,
        mutation: AccountMutation,
    ) -> EngineResult<Account> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("amount must be positive".to_string()));
        }
        self.touch(id).await?;
        let account = self.store.accounts().apply(id, &[mutation]).await?;
        Ok(account)
    }
}
