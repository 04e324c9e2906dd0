//! Economy: the assembled service bundle.
//!
//! Ties the ledger, exchange, heist engine and combat resolver together
//! over one store, one event bus and one dice source. External
//! collaborators construct this once, call `recover()` to re-arm pending
//! heist deadlines, and subscribe to the bus for notifications.

use crate::combat::CombatResolver;
use crate::dice::Dice;
use crate::error::EngineResult;
use crate::events::EventBus;
use crate::exchange::Exchange;
use crate::heist::HeistEngine;
use crate::ledger::Ledger;
use crate::settings::SettingsService;
use racket_domain::EconomyConfig;
use racket_store::Store;
use std::sync::Arc;
use std::time::Duration;

/// The assembled economy core.
pub struct Economy<S> {
    /// Account ledger
    pub ledger: Ledger<S>,
    /// Crypto/cash exchange
    pub exchange: Exchange<S>,
    /// Heist engine
    pub heists: HeistEngine<S>,
    /// Theft resolver
    pub combat: CombatResolver<S>,
    /// TTL-cached settings overrides
    pub settings: Arc<SettingsService<S>>,
    /// Notification bus
    pub bus: EventBus,
}

impl<S: Store + 'static> Economy<S> {
    /// Assemble the economy with entropy-seeded dice (production).
    pub fn new(store: Arc<S>, config: EconomyConfig) -> Self {
        Self::with_dice(store, config, Dice::from_entropy())
    }

    /// Assemble the economy with the given dice (deterministic tests).
    pub fn with_dice(store: Arc<S>, config: EconomyConfig, dice: Dice) -> Self {
        let config = Arc::new(config);
        let bus = EventBus::default();
        let dice = Arc::new(dice);
        let settings = Arc::new(SettingsService::new(
            store.clone(),
            Duration::from_secs(config.settings_ttl_secs),
        ));

        Self {
            ledger: Ledger::new(store.clone(), config.clone(), bus.clone()),
            exchange: Exchange::new(store.clone(), config.clone(), bus.clone()),
            heists: HeistEngine::new(
                store.clone(),
                config.clone(),
                settings.clone(),
                bus.clone(),
                dice.clone(),
            ),
            combat: CombatResolver::new(store, config, bus.clone(), dice),
            settings,
            bus,
        }
    }

    /// Re-arm deadline tasks for heists left unfinished by a previous run.
    /// Returns how many were re-armed.
    pub async fn recover(&self) -> EngineResult<usize> {
        self.heists.recover().await
    }
}
