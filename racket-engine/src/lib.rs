//! Racket engine layer
//!
//! The economy services: ledger, progression, exchange, heist engine and
//! combat resolver, plus the deadline scheduler, the notification bus and
//! the TTL-cached settings service. All state lives behind the store's
//! repository ports; the services validate, roll, orchestrate and notify.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod combat;
pub mod config;
pub mod dice;
pub mod economy;
pub mod error;
pub mod events;
pub mod exchange;
pub mod heist;
pub mod ledger;
pub mod progression;
pub mod scheduler;
pub mod settings;

pub use combat::{CombatResolver, TheftOutcome};
pub use config::{from_env, ConfigError};
pub use dice::Dice;
pub use economy::Economy;
pub use error::{EngineError, EngineResult};
pub use events::{EventBus, EventReceiver};
pub use exchange::{Exchange, OrderBookView};
pub use heist::{BetrayalReport, HeistEngine};
pub use ledger::{BalanceView, Ledger};
pub use progression::Progression;
pub use settings::{SettingsService, TtlCache};
