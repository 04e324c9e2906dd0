//! Combat resolver: the attacker/defender cash-theft procedure.
//!
//! Stateless between calls apart from the per-attacker cooldown stamp.
//! The upfront cost is a strict debit batched with the attempt counter, so
//! a broke attacker is rejected before any state changes. The attempt time
//! is stamped at the end of every resolved attempt, success or not.

use crate::dice::Dice;
use crate::error::{EngineError, EngineResult};
use crate::events::EventBus;
use crate::ledger::Ledger;
use crate::progression::Progression;
use chrono::{Duration, Utc};
use racket_domain::{
    round_cash, AccountId, AccountMutation, ActionKind, CounterKind, EconomyConfig, GameEvent,
    TheftOutcomeKind,
};
use racket_store::Store;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// How one theft attempt resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum TheftOutcome {
    /// The victim repelled the attempt; the attacker paid a penalty
    Defended {
        /// Penalty paid to the victim (capped at the attacker's cash)
        penalty: Decimal,
    },
    /// Cash was stolen
    Success {
        /// Cash moved to the attacker
        amount: Decimal,
        /// Crypto reward credited on top, zero when not configured
        crypto_reward: Decimal,
    },
    /// The attempt failed outright
    Failed,
}

/// Theft resolution service.
pub struct CombatResolver<S> {
    store: Arc<S>,
    config: Arc<EconomyConfig>,
    ledger: Ledger<S>,
    progression: Progression<S>,
    bus: EventBus,
    dice: Arc<Dice>,
}

impl<S> Clone for CombatResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            progression: self.progression.clone(),
            bus: self.bus.clone(),
            dice: self.dice.clone(),
        }
    }
}

impl<S: Store> CombatResolver<S> {
    /// Create a combat resolver over the given store.
    pub fn new(store: Arc<S>, config: Arc<EconomyConfig>, bus: EventBus, dice: Arc<Dice>) -> Self {
        let ledger = Ledger::new(store.clone(), config.clone(), bus.clone());
        let progression = Progression::new(store.clone(), config.clone(), bus.clone());
        Self { store, config, ledger, progression, bus, dice }
    }

    /// Attempt to steal cash from `victim`.
    ///
    /// Order of resolution: cooldown gate, upfront cost (strict), the
    /// victim's defense roll, then the attacker's success roll. A steal
    /// that rounds to zero counts as a failure. The attacker's referrer is
    /// paid a one-time bonus when the lifetime success count crosses the
    /// configured threshold.
    pub async fn attempt_theft(
        &self,
        attacker: AccountId,
        victim: AccountId,
        upfront_cost: Decimal,
    ) -> EngineResult<TheftOutcome> {
        if attacker == victim {
            return Err(EngineError::Validation("cannot rob yourself".to_string()));
        }
        if upfront_cost < Decimal::ZERO {
            return Err(EngineError::Validation("upfront cost cannot be negative".to_string()));
        }

        self.ledger.touch(attacker).await?;
        let victim_account = self.ledger.touch(victim).await?;

        let combat = &self.config.combat;
        let now = Utc::now();
        if let Some(last) = self.store.cooldowns().last_attempt(attacker, ActionKind::Theft).await?
        {
            let ready_at = last + Duration::seconds(combat.cooldown_secs);
            if now < ready_at {
                return Err(EngineError::StateConflict(format!(
                    "theft on cooldown until {}",
                    ready_at
                )));
            }
        }

        // Strict debit batched with the attempt counter: a shortfall
        // aborts before any state changes, counters included.
        self.store
            .accounts()
            .apply(
                attacker,
                &[
                    AccountMutation::DebitCashStrict(round_cash(upfront_cost)),
                    AccountMutation::IncrementCounter(CounterKind::TheftAttempts),
                ],
            )
            .await?;

        let defense_chance = combat.defense_base_chance
            + (victim_account.reputation.max(0) / combat.defense_rep_divisor)
                .min(combat.defense_bonus_cap);

        let outcome = if self.dice.roll_percent() <= defense_chance {
            self.resolve_defended(attacker, victim).await?
        } else {
            self.resolve_attack(attacker, victim, &victim_account).await?
        };

        // Stamped last, whatever the outcome was.
        self.store.cooldowns().stamp(attacker, ActionKind::Theft, now).await?;

        let (kind, amount) = match &outcome {
            TheftOutcome::Defended { penalty } => (TheftOutcomeKind::Defended, *penalty),
            TheftOutcome::Success { amount, .. } => (TheftOutcomeKind::Success, *amount),
            TheftOutcome::Failed => (TheftOutcomeKind::Failed, Decimal::ZERO),
        };
        info!(attacker, victim, ?kind, %amount, "theft resolved");
        self.bus.send(GameEvent::TheftResolved {
            attacker,
            victim,
            outcome: kind,
            amount,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    async fn resolve_defended(
        &self,
        attacker: AccountId,
        victim: AccountId,
    ) -> EngineResult<TheftOutcome> {
        let combat = &self.config.combat;
        // Capped at the attacker's remaining cash inside the command.
        let penalty = self
            .store
            .accounts()
            .transfer_cash(attacker, victim, combat.defense_penalty)
            .await?;

        self.store
            .accounts()
            .apply(attacker, &[AccountMutation::IncrementCounter(CounterKind::TheftFailures)])
            .await?;
        self.store
            .accounts()
            .apply(victim, &[AccountMutation::IncrementCounter(CounterKind::TheftsDefended)])
            .await?;
        self.progression.grant(victim, combat.defense_exp).await?;
        self.progression.grant(attacker, combat.fail_exp).await?;

        debug!(attacker, victim, %penalty, "theft defended");
        Ok(TheftOutcome::Defended { penalty })
    }

    async fn resolve_attack(
        &self,
        attacker: AccountId,
        victim: AccountId,
        victim_account: &racket_domain::Account,
    ) -> EngineResult<TheftOutcome> {
        let combat = &self.config.combat;
        let attacker_account = self
            .store
            .accounts()
            .find(attacker)
            .await?
            .ok_or_else(|| EngineError::not_found("account", attacker))?;

        let success_chance = combat.success_base_chance
            + (attacker_account.reputation.max(0) / combat.success_rep_divisor)
                .min(combat.success_bonus_cap);
        let rolled = self.dice.roll_percent() <= success_chance;

        let mut stolen = Decimal::ZERO;
        if rolled && victim_account.cash > Decimal::ZERO {
            let draw = self.dice.range_cash(combat.steal_min, combat.steal_max);
            // Capped at the victim's balance inside the command; a draw
            // that caps (or rounds) to zero falls through to the failure
            // path below.
            stolen = self.store.accounts().transfer_cash(victim, attacker, draw).await?;
        }

        if stolen <= Decimal::ZERO {
            self.store
                .accounts()
                .apply(attacker, &[AccountMutation::IncrementCounter(CounterKind::TheftFailures)])
                .await?;
            self.progression.grant(attacker, combat.fail_exp).await?;
            return Ok(TheftOutcome::Failed);
        }

        let crypto_reward = combat.crypto_reward.unwrap_or(Decimal::ZERO);
        let mut mutations = vec![AccountMutation::IncrementCounter(CounterKind::TheftSuccesses)];
        if crypto_reward > Decimal::ZERO {
            mutations.push(AccountMutation::CreditCrypto(crypto_reward));
        }
        self.store.accounts().apply(attacker, &mutations).await?;
        self.progression.grant(attacker, combat.success_exp).await?;

        if let Some(referrer) = self
            .store
            .accounts()
            .claim_referral_reward(attacker, combat.referral_threshold)
            .await?
        {
            self.ledger.touch(referrer).await?;
            self.store
                .accounts()
                .apply(referrer, &[AccountMutation::CreditCash(combat.referral_bonus)])
                .await?;
            info!(referrer, referred = attacker, amount = %combat.referral_bonus, "referral reward paid");
            self.bus.send(GameEvent::ReferralRewardPaid {
                referrer,
                referred: attacker,
                amount: combat.referral_bonus,
                timestamp: Utc::now(),
            });
        }

        Ok(TheftOutcome::Success { amount: stolen, crypto_reward })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racket_store::MemoryStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        combat: CombatResolver<MemoryStore>,
        ledger: Ledger<MemoryStore>,
        store: Arc<MemoryStore>,
    }

    fn fixture_with(config: EconomyConfig, seed: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(config);
        let bus = EventBus::default();
        Fixture {
            combat: CombatResolver::new(
                store.clone(),
                config.clone(),
                bus.clone(),
                Arc::new(Dice::seeded(seed)),
            ),
            ledger: Ledger::new(store.clone(), config, bus),
            store,
        }
    }

    /// Config where the victim never defends and the attacker always
    /// succeeds, so a single path is exercised deterministically.
    fn always_succeeds() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.combat.defense_base_chance = 0;
        config.combat.defense_bonus_cap = 0;
        config.combat.success_base_chance = 100;
        config.combat.cooldown_secs = 0;
        config
    }

    /// Config where every attempt is repelled by the victim.
    fn always_defended() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.combat.defense_base_chance = 100;
        config.combat.cooldown_secs = 0;
        config
    }

    #[tokio::test]
    async fn test_upfront_cost_shortfall_rejected_without_state_change() {
        let f = fixture_with(always_succeeds(), 1);
        // Scenario: cost=10 against an attacker holding 5.
        f.ledger.touch(1).await.unwrap();
        f.ledger.debit_cash(1, dec!(495)).await.unwrap(); // leaves 5.00
        f.ledger.touch(2).await.unwrap();

        let err = f.combat.attempt_theft(1, 2, dec!(10)).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));

        let attacker = f.ledger.touch(1).await.unwrap();
        assert_eq!(attacker.counters.theft_attempts, 0);
        assert_eq!(attacker.cash, dec!(5.00));
        // No cooldown was stamped either.
        use racket_store::CooldownRepository;
        assert!(f
            .store
            .last_attempt(1, ActionKind::Theft)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_successful_theft_moves_cash_and_counters() {
        let f = fixture_with(always_succeeds(), 1);
        f.ledger.touch(2).await.unwrap();

        let outcome = f.combat.attempt_theft(1, 2, dec!(10)).await.unwrap();
        let TheftOutcome::Success { amount, crypto_reward } = outcome else {
            panic!("expected success");
        };
        assert!(amount >= dec!(10) && amount <= dec!(150));
        assert_eq!(crypto_reward, dec!(0.001));

        let attacker = f.ledger.touch(1).await.unwrap();
        assert_eq!(attacker.counters.theft_attempts, 1);
        assert_eq!(attacker.counters.theft_successes, 1);
        assert_eq!(attacker.crypto, dec!(0.0010));
        // 500 - 10 upfront + steal; 20 exp is below the first level
        // threshold, so no level reward lands here.
        assert_eq!(attacker.cash, dec!(500) - dec!(10) + amount);

        let victim = f.ledger.touch(2).await.unwrap();
        assert_eq!(victim.cash, dec!(500) - amount);
    }

    #[tokio::test]
    async fn test_steal_capped_at_victim_balance() {
        let f = fixture_with(always_succeeds(), 1);
        f.ledger.touch(2).await.unwrap();
        f.ledger.debit_cash(2, dec!(498)).await.unwrap(); // leaves 2.00

        let outcome = f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        let TheftOutcome::Success { amount, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(amount, dec!(2.00));
        assert_eq!(f.ledger.balance(2).await.unwrap().cash, dec!(0));
    }

    #[tokio::test]
    async fn test_broke_victim_is_a_failure() {
        let f = fixture_with(always_succeeds(), 1);
        f.ledger.touch(2).await.unwrap();
        f.ledger.debit_cash(2, dec!(500)).await.unwrap(); // cash 0

        let outcome = f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        assert_eq!(outcome, TheftOutcome::Failed);
        let attacker = f.ledger.touch(1).await.unwrap();
        assert_eq!(attacker.counters.theft_failures, 1);
        assert_eq!(attacker.counters.theft_successes, 0);
    }

    #[tokio::test]
    async fn test_defended_theft_pays_penalty_to_victim() {
        let f = fixture_with(always_defended(), 1);
        f.ledger.touch(2).await.unwrap();

        let outcome = f.combat.attempt_theft(1, 2, dec!(10)).await.unwrap();
        let TheftOutcome::Defended { penalty } = outcome else {
            panic!("expected defense");
        };
        assert_eq!(penalty, dec!(50.00));

        let attacker = f.ledger.touch(1).await.unwrap();
        assert_eq!(attacker.counters.theft_failures, 1);
        let victim = f.ledger.touch(2).await.unwrap();
        assert_eq!(victim.counters.thefts_defended, 1);
        assert_eq!(victim.cash, dec!(550.00));
        // Defense experience went to the victim.
        assert!(victim.exp > 0);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_attempt() {
        let mut config = always_succeeds();
        config.combat.cooldown_secs = 3600;
        let f = fixture_with(config, 1);
        f.ledger.touch(2).await.unwrap();

        f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        let err = f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_referral_reward_paid_once_at_threshold() {
        let mut config = always_succeeds();
        config.combat.referral_threshold = 2;
        config.combat.referral_bonus = dec!(200);
        let f = fixture_with(config, 1);

        f.ledger.touch(1).await.unwrap();
        f.ledger.touch(9).await.unwrap();
        f.store
            .accounts()
            .apply(1, &[AccountMutation::SetReferrer(9)])
            .await
            .unwrap();
        // A rich victim so every steal succeeds.
        f.ledger.touch(2).await.unwrap();
        f.ledger.credit_cash(2, dec!(10000)).await.unwrap();

        let referrer_before = f.ledger.balance(9).await.unwrap().cash;
        f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        assert_eq!(f.ledger.balance(9).await.unwrap().cash, referrer_before);

        f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        assert_eq!(f.ledger.balance(9).await.unwrap().cash, referrer_before + dec!(200));

        // Crossing the threshold again never pays twice.
        f.combat.attempt_theft(1, 2, dec!(0)).await.unwrap();
        assert_eq!(f.ledger.balance(9).await.unwrap().cash, referrer_before + dec!(200));
    }

    #[tokio::test]
    async fn test_self_theft_rejected() {
        let f = fixture_with(always_succeeds(), 1);
        let err = f.combat.attempt_theft(1, 1, dec!(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
