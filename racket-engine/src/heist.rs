//! Heist engine: per-room timed events with a betrayal sub-game.
//!
//! A heist moves `joining -> splitting -> finished`, driven by two
//! wall-clock deadlines racing against live player actions. Both
//! transitions run as compare-and-set store commands fired by deadline
//! tasks; a task that loses the race no-ops. Betrayals move share between
//! two participants inside one command spanning exactly their rows, which
//! keeps the pot's share sum intact under concurrent attempts.

use crate::dice::Dice;
use crate::error::{EngineError, EngineResult};
use crate::events::EventBus;
use crate::ledger::Ledger;
use crate::progression::Progression;
use crate::scheduler::spawn_deadline;
use crate::settings::SettingsService;
use chrono::{Duration, Utc};
use racket_domain::{
    AccountId, AccountMutation, CounterKind, EconomyConfig, GameEvent, Heist, HeistId,
    HeistPayout, HeistPhase, Participant, RoomId,
};
use racket_store::{JoinClose, Store};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Settings key overriding the join window length.
pub const JOIN_WINDOW_KEY: &str = "heist.join_window_secs";
/// Settings key overriding the split window length.
pub const SPLIT_WINDOW_KEY: &str = "heist.split_window_secs";

/// Outcome of one betrayal attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct BetrayalReport {
    /// Whether the attacker's roll succeeded
    pub success: bool,
    /// Share moved (steal on success, penalty on failure)
    pub amount: Decimal,
    /// Effective success chance the roll was made against
    pub chance: i64,
}

/// Heist engine service.
pub struct HeistEngine<S> {
    store: Arc<S>,
    config: Arc<EconomyConfig>,
    ledger: Ledger<S>,
    progression: Progression<S>,
    settings: Arc<SettingsService<S>>,
    bus: EventBus,
    dice: Arc<Dice>,
}

impl<S> Clone for HeistEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            progression: self.progression.clone(),
            settings: self.settings.clone(),
            bus: self.bus.clone(),
            dice: self.dice.clone(),
        }
    }
}

impl<S: Store + 'static> HeistEngine<S> {
    /// Create a heist engine over the given store.
    pub fn new(
        store: Arc<S>,
        config: Arc<EconomyConfig>,
        settings: Arc<SettingsService<S>>,
        bus: EventBus,
        dice: Arc<Dice>,
    ) -> Self {
        let ledger = Ledger::new(store.clone(), config.clone(), bus.clone());
        let progression = Progression::new(store.clone(), config.clone(), bus.clone());
        Self { store, config, ledger, progression, settings, bus, dice }
    }

    /// Spawn a heist in a room: draw a template, roll the pot and bonus,
    /// open the join window and arm its deadline task.
    ///
    /// A room with a non-finished heist rejects the spawn as a conflict.
    pub async fn spawn(&self, room: RoomId) -> EngineResult<Heist> {
        let template = self
            .dice
            .pick(&self.config.heist.templates)
            .ok_or_else(|| EngineError::Validation("no heist templates configured".to_string()))?;

        let pot = self.dice.range_i64(template.pot_min, template.pot_max);
        let bonus = if self.dice.roll_percent() <= template.bonus_chance {
            self.dice.range_crypto(template.bonus_min, template.bonus_max)
        } else {
            Decimal::ZERO
        };

        let join_secs = self
            .settings
            .get_i64(JOIN_WINDOW_KEY)
            .await?
            .unwrap_or(self.config.heist.join_window_secs)
            .max(1);
        let split_secs = self
            .settings
            .get_i64(SPLIT_WINDOW_KEY)
            .await?
            .unwrap_or(self.config.heist.split_window_secs)
            .max(1);

        let join_deadline = Utc::now() + Duration::seconds(join_secs);
        let split_deadline = join_deadline + Duration::seconds(split_secs);
        let heist =
            Heist::new(room, template.keyword.clone(), pot, bonus, join_deadline, split_deadline);
        self.store.heists().insert(&heist).await?;

        info!(heist = %heist.id, room, template = %heist.template, pot, %bonus, "heist spawned");
        self.bus.send(GameEvent::HeistSpawned {
            heist: heist.id,
            room,
            template: heist.template.clone(),
            pot,
            join_deadline,
        });

        self.arm_join_deadline(&heist);
        Ok(heist)
    }

    /// Join a heist during its join window. Idempotent per account:
    /// returns `false` when the account already joined.
    pub async fn join(&self, heist: HeistId, account: AccountId) -> EngineResult<bool> {
        self.ledger.touch(account).await?;
        let joined = self.store.heists().add_participant(heist, account).await?;
        if joined {
            self.store
                .accounts()
                .apply(account, &[AccountMutation::IncrementCounter(CounterKind::HeistsJoined)])
                .await?;
            debug!(%heist, account, "participant joined");
        }
        Ok(joined)
    }

    /// Betray another participant during the splitting phase.
    ///
    /// The success chance uses the attacker's betray skill against the
    /// target's built-up defense; the share movement itself is computed
    /// inside the store command from the rows as they are then. Attempts
    /// outside the splitting window are state conflicts, not retried.
    pub async fn betray(
        &self,
        heist_id: HeistId,
        attacker: AccountId,
        target: AccountId,
    ) -> EngineResult<BetrayalReport> {
        if attacker == target {
            return Err(EngineError::Validation("cannot betray yourself".to_string()));
        }

        let participants = self.store.heists().participants(heist_id).await?;
        if !participants.iter().any(|p| p.account == attacker) {
            return Err(EngineError::not_found("participant", attacker));
        }
        let target_row = participants
            .iter()
            .find(|p| p.account == target)
            .ok_or_else(|| EngineError::not_found("participant", target))?;
        let attacker_account = self
            .store
            .accounts()
            .find(attacker)
            .await?
            .ok_or_else(|| EngineError::not_found("account", attacker))?;

        let tuning = &self.config.heist;
        let chance = (tuning.betray_base_chance
            + attacker_account.skill(racket_domain::SkillKind::Betray) * tuning.betray_skill_bonus)
            .min(tuning.betray_max_chance)
            - target_row.defense_bonus;
        let success = self.dice.roll_percent() <= chance;

        // The command re-verifies phase and deadline and computes the
        // moved amount from fresh participant rows.
        let record = self
            .store
            .heists()
            .apply_betrayal(heist_id, attacker, target, success, &self.config.betrayal_tuning())
            .await?;

        let mut attacker_counters =
            vec![AccountMutation::IncrementCounter(CounterKind::BetrayalAttempts)];
        if success {
            attacker_counters
                .push(AccountMutation::IncrementCounter(CounterKind::BetrayalSuccesses));
            self.store
                .accounts()
                .apply(target, &[AccountMutation::IncrementCounter(CounterKind::TimesBetrayed)])
                .await?;
        }
        self.store.accounts().apply(attacker, &attacker_counters).await?;

        let exp = if success { tuning.betray_success_exp } else { tuning.betray_fail_exp };
        self.progression.grant(attacker, exp).await?;

        info!(
            heist = %heist_id,
            attacker,
            target,
            success,
            amount = %record.amount,
            "betrayal resolved"
        );
        self.bus.send(GameEvent::BetrayalResolved {
            heist: heist_id,
            attacker,
            target,
            success,
            amount: record.amount,
            timestamp: record.occurred_at,
        });

        Ok(BetrayalReport { success, amount: record.amount, chance })
    }

    /// Snapshot of a heist.
    pub async fn status(&self, id: HeistId) -> EngineResult<Heist> {
        self.store
            .heists()
            .find(id)
            .await?
            .ok_or_else(|| EngineError::not_found("heist", id))
    }

    /// Current participants of a heist.
    pub async fn participants(&self, id: HeistId) -> EngineResult<Vec<Participant>> {
        Ok(self.store.heists().participants(id).await?)
    }

    /// Re-arm deadline tasks for every non-finished heist.
    ///
    /// Run once at startup; past-due deadlines fire immediately and their
    /// transitions still no-op if the rows already moved on.
    pub async fn recover(&self) -> EngineResult<usize> {
        let pending = self.store.heists().find_unfinished().await?;
        for heist in &pending {
            match heist.phase {
                HeistPhase::Joining => self.arm_join_deadline(heist),
                HeistPhase::Splitting => self.arm_split_deadline(heist.id, heist.split_deadline),
                HeistPhase::Finished => {},
            }
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "re-armed heist deadline tasks");
        }
        Ok(pending.len())
    }

    /// Close the join window: the `joining` deadline transition.
    ///
    /// Zero participants finishes the heist with no payout; one is paid
    /// the whole pot immediately, skipping the splitting phase; otherwise
    /// shares are assigned and the split deadline is armed.
    pub async fn close_join_window(&self, heist_id: HeistId) -> EngineResult<()> {
        let heist = self.status(heist_id).await?;
        let close = self.store.heists().close_joining(heist_id).await?;
        match close {
            JoinClose::Empty => {
                info!(heist = %heist_id, room = heist.room, "heist expired with no participants");
                self.finish_event(heist_id, heist.room, Vec::new());
            },
            JoinClose::PaidSole(payout) => {
                info!(
                    heist = %heist_id,
                    room = heist.room,
                    account = payout.account,
                    cash = %payout.cash,
                    "sole participant paid out"
                );
                self.finish_event(heist_id, heist.room, vec![payout]);
            },
            JoinClose::Split { participants, base_share, .. } => {
                info!(
                    heist = %heist_id,
                    room = heist.room,
                    participants = participants.len(),
                    %base_share,
                    "splitting phase started"
                );
                self.bus.send(GameEvent::HeistStarted {
                    heist: heist_id,
                    room: heist.room,
                    participants: participants.len(),
                    base_share,
                    split_deadline: heist.split_deadline,
                });
                self.arm_split_deadline(heist_id, heist.split_deadline);
            },
        }
        Ok(())
    }

    /// Settle the splitting phase: the `splitting` deadline transition.
    pub async fn settle(&self, heist_id: HeistId) -> EngineResult<Vec<HeistPayout>> {
        let heist = self.status(heist_id).await?;
        let payouts = self.store.heists().settle_split(heist_id).await?;
        let total: Decimal = payouts.iter().map(|p| p.cash).sum();
        info!(heist = %heist_id, room = heist.room, %total, "heist settled");
        self.finish_event(heist_id, heist.room, payouts.clone());
        Ok(payouts)
    }

    fn arm_join_deadline(&self, heist: &Heist) {
        let engine = self.clone();
        let id = heist.id;
        spawn_deadline("heist_join", heist.join_deadline, move || async move {
            engine.close_join_window(id).await
        });
    }

    fn arm_split_deadline(&self, heist_id: HeistId, at: chrono::DateTime<Utc>) {
        let engine = self.clone();
        spawn_deadline("heist_split", at, move || async move {
            engine.settle(heist_id).await.map(|_| ())
        });
    }

    fn finish_event(&self, heist: HeistId, room: RoomId, payouts: Vec<HeistPayout>) {
        self.bus.send(GameEvent::HeistFinished {
            heist,
            room,
            payouts,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racket_store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    struct Fixture {
        engine: HeistEngine<MemoryStore>,
        ledger: Ledger<MemoryStore>,
        store: Arc<MemoryStore>,
    }

    fn fixture_with(config: EconomyConfig, seed: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(config);
        let bus = EventBus::default();
        let settings = Arc::new(SettingsService::new(store.clone(), StdDuration::from_secs(60)));
        Fixture {
            engine: HeistEngine::new(
                store.clone(),
                config.clone(),
                settings,
                bus.clone(),
                Arc::new(Dice::seeded(seed)),
            ),
            ledger: Ledger::new(store.clone(), config, bus),
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EconomyConfig::default(), 42)
    }

    #[tokio::test]
    async fn test_spawn_rejects_second_heist_in_room() {
        let f = fixture();
        let heist = f.engine.spawn(10).await.unwrap();
        assert_eq!(heist.phase, HeistPhase::Joining);
        assert!(heist.pot > 0);

        let err = f.engine.spawn(10).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
        // A different room still works.
        f.engine.spawn(11).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_honors_settings_override() {
        let f = fixture();
        f.engine.settings.set(JOIN_WINDOW_KEY, "7").await.unwrap();
        let heist = f.engine.spawn(10).await.unwrap();
        let window = heist.join_deadline - heist.created_at;
        assert!(window <= Duration::seconds(8));
    }

    #[tokio::test]
    async fn test_join_is_idempotent_and_counts_once() {
        let f = fixture();
        let heist = f.engine.spawn(10).await.unwrap();

        assert!(f.engine.join(heist.id, 1).await.unwrap());
        assert!(!f.engine.join(heist.id, 1).await.unwrap());

        let account = f.ledger.touch(1).await.unwrap();
        assert_eq!(account.counters.heists_joined, 1);
        assert_eq!(f.engine.participants(heist.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_join_window_pays_sole_participant() {
        let f = fixture();
        let heist = f.engine.spawn(10).await.unwrap();
        f.engine.join(heist.id, 1).await.unwrap();
        let cash_before = f.ledger.balance(1).await.unwrap().cash;

        f.engine.close_join_window(heist.id).await.unwrap();

        let row = f.engine.status(heist.id).await.unwrap();
        assert!(row.is_finished());
        let cash_after = f.ledger.balance(1).await.unwrap().cash;
        assert_eq!(cash_after - cash_before, Decimal::from(heist.pot));
    }

    #[tokio::test]
    async fn test_close_join_window_twice_is_conflict() {
        let f = fixture();
        let heist = f.engine.spawn(10).await.unwrap();
        f.engine.close_join_window(heist.id).await.unwrap();
        let err = f.engine.close_join_window(heist.id).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    async fn start_split(f: &Fixture, accounts: &[AccountId]) -> Heist {
        let heist = f.engine.spawn(10).await.unwrap();
        for &id in accounts {
            f.engine.join(heist.id, id).await.unwrap();
        }
        f.engine.close_join_window(heist.id).await.unwrap();
        f.engine.status(heist.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_betray_preserves_pot_sum() {
        let f = fixture();
        let heist = start_split(&f, &[1, 2, 3, 4]).await;
        assert_eq!(heist.phase, HeistPhase::Splitting);

        let report = f.engine.betray(heist.id, 1, 2).await.unwrap();
        let participants = f.engine.participants(heist.id).await.unwrap();
        let total: Decimal = participants.iter().map(|p| p.current_share).sum();
        assert_eq!(total, Decimal::from(heist.pot));

        let attacker = f.ledger.touch(1).await.unwrap();
        assert_eq!(attacker.counters.betrayal_attempts, 1);
        // Experience was granted either way.
        assert!(attacker.exp > 0 || attacker.level > 1);
        if report.success {
            assert_eq!(attacker.counters.betrayal_successes, 1);
        }
    }

    #[tokio::test]
    async fn test_betray_requires_both_participants() {
        let f = fixture();
        let heist = start_split(&f, &[1, 2]).await;

        let err = f.engine.betray(heist.id, 1, 99).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        let err = f.engine.betray(heist.id, 99, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        let err = f.engine.betray(heist.id, 1, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_betray_after_settlement_is_conflict() {
        let f = fixture();
        let heist = start_split(&f, &[1, 2]).await;
        f.engine.settle(heist.id).await.unwrap();

        let err = f.engine.betray(heist.id, 1, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[tokio::test]
    async fn test_settle_conserves_pot_and_pays_bonus() {
        let f = fixture();
        let heist = start_split(&f, &[1, 2, 3]).await;
        let balances_before = [
            f.ledger.balance(1).await.unwrap().cash,
            f.ledger.balance(2).await.unwrap().cash,
            f.ledger.balance(3).await.unwrap().cash,
        ];

        let payouts = f.engine.settle(heist.id).await.unwrap();
        let total: Decimal = payouts.iter().map(|p| p.cash).sum();
        assert_eq!(total, Decimal::from(heist.pot));

        for (i, account) in [1i64, 2, 3].iter().enumerate() {
            let cash = f.ledger.balance(*account).await.unwrap().cash;
            let payout = payouts.iter().find(|p| p.account == *account).unwrap();
            assert_eq!(cash - balances_before[i], payout.cash);
        }
    }

    #[tokio::test]
    async fn test_recover_rearms_and_fires_past_due() {
        let f = fixture();
        // A heist whose join deadline is already in the past.
        let heist = Heist::new(
            10,
            "casino_vault",
            100,
            dec!(0),
            Utc::now() - Duration::seconds(5),
            Utc::now() + Duration::seconds(60),
        );
        use racket_store::HeistRepository;
        f.store.heists().insert(&heist).await.unwrap();

        let rearmed = f.engine.recover().await.unwrap();
        assert_eq!(rearmed, 1);

        // The past-due task fires immediately; nobody joined, so the heist
        // finishes with no payout.
        tokio::task::yield_now().await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let row = HeistRepository::find(f.store.as_ref(), heist.id).await.unwrap().unwrap();
        assert!(row.is_finished());
    }
}
