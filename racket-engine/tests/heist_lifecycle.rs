//! Deadline-driven heist lifecycle, end to end.
//!
//! The phase transitions here are fired by the armed timer tasks, not by
//! direct calls, so these tests use short real windows. They also cover
//! the restart path: recovery re-arms pending deadlines and past-due ones
//! fire immediately but no-op once the row has moved on.

use racket_domain::{EconomyConfig, HeistPhase, HeistTemplate};
use racket_engine::heist::{JOIN_WINDOW_KEY, SPLIT_WINDOW_KEY};
use racket_engine::{Dice, Economy, EngineError};
use racket_store::{HeistRepository, MemoryStore, Store};
use racket_testkit::{expired_heist, init_tracing};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn economy(seed: u64) -> (Economy<MemoryStore>, Arc<MemoryStore>) {
    init_tracing();
    let mut config = EconomyConfig::default();
    config.heist.templates = vec![HeistTemplate {
        keyword: "armored_truck".to_string(),
        pot_min: 100,
        pot_max: 100,
        bonus_chance: 0,
        bonus_min: dec!(0),
        bonus_max: dec!(0),
    }];
    let store = Arc::new(MemoryStore::new());
    (Economy::with_dice(store.clone(), config, Dice::seeded(seed)), store)
}

async fn use_short_windows(economy: &Economy<MemoryStore>) {
    economy.settings.set(JOIN_WINDOW_KEY, "1").await.unwrap();
    economy.settings.set(SPLIT_WINDOW_KEY, "1").await.unwrap();
}

#[tokio::test]
async fn test_timers_drive_joining_to_finished() {
    let (economy, _) = economy(17);
    use_short_windows(&economy).await;

    let heist = economy.heists.spawn(10).await.unwrap();
    economy.heists.join(heist.id, 1).await.unwrap();
    economy.heists.join(heist.id, 2).await.unwrap();

    // The join deadline fires on its own and opens the splitting phase.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let row = economy.heists.status(heist.id).await.unwrap();
    assert_eq!(row.phase, HeistPhase::Splitting);

    // The split deadline settles and pays the pot out exactly.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let row = economy.heists.status(heist.id).await.unwrap();
    assert!(row.is_finished());

    let paid = economy.ledger.balance(1).await.unwrap().cash
        + economy.ledger.balance(2).await.unwrap().cash;
    // Two starting grants plus the whole pot.
    assert_eq!(paid, dec!(1000) + Decimal::from(heist.pot));
}

#[tokio::test]
async fn test_join_after_deadline_is_rejected() {
    let (economy, _) = economy(17);
    use_short_windows(&economy).await;

    let heist = economy.heists.spawn(10).await.unwrap();
    economy.heists.join(heist.id, 1).await.unwrap();
    economy.heists.join(heist.id, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1300)).await;

    let err = economy.heists.join(heist.id, 3).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_)));
}

#[tokio::test]
async fn test_betrayal_loses_the_deadline_race() {
    let (economy, _) = economy(17);
    use_short_windows(&economy).await;

    let heist = economy.heists.spawn(10).await.unwrap();
    economy.heists.join(heist.id, 1).await.unwrap();
    economy.heists.join(heist.id, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert_eq!(economy.heists.status(heist.id).await.unwrap().phase, HeistPhase::Splitting);

    // Past the split deadline the heist has settled (or is settling);
    // a late betrayal is a conflict either way, never a retry.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let err = economy.heists.betray(heist.id, 1, 2).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_) | EngineError::NotFound { .. }));
}

#[tokio::test]
async fn test_room_frees_up_after_finish() {
    let (economy, _) = economy(17);
    use_short_windows(&economy).await;

    let heist = economy.heists.spawn(10).await.unwrap();
    assert!(matches!(
        economy.heists.spawn(10).await.unwrap_err(),
        EngineError::StateConflict(_)
    ));

    // Nobody joins; the join deadline finishes the heist and the room is
    // free again.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    assert!(economy.heists.status(heist.id).await.unwrap().is_finished());
    economy.heists.spawn(10).await.unwrap();
}

#[tokio::test]
async fn test_recovery_fires_past_due_deadline_exactly_once() {
    let (economy, store) = economy(17);

    // A heist left over from a previous run, join deadline in the past.
    let stale = expired_heist(10, 100);
    store.heists().insert(&stale).await.unwrap();

    let rearmed = economy.recover().await.unwrap();
    assert_eq!(rearmed, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let row = HeistRepository::find(store.as_ref(), stale.id).await.unwrap().unwrap();
    assert!(row.is_finished());

    // Recovering again finds nothing pending and re-firing is a no-op.
    let rearmed = economy.recover().await.unwrap();
    assert_eq!(rearmed, 0);
    let err = economy.heists.close_join_window(stale.id).await.unwrap_err();
    assert!(matches!(err, EngineError::StateConflict(_)));
}
