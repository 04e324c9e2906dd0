//! Economy tuning configuration.
//!
//! Pure data with documented defaults. Loading from the environment lives
//! in the engine crate; overrides stored in the settings table are read
//! through the engine's TTL-cached settings service.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Ledger tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Cash granted to every account on creation
    pub starting_cash: Decimal,
    /// Upper clamp for every skill level
    pub skill_max: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { starting_cash: dec!(500.00), skill_max: 10 }
    }
}

/// Progression tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Level N requires `N * level_multiplier` experience
    pub level_multiplier: i64,
    /// Stat points granted per level crossed
    pub stat_per_level: i64,
    /// Cash reward per level crossed
    pub cash_per_level: Decimal,
    /// Reputation reward per level crossed
    pub reputation_per_level: i64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            level_multiplier: 100,
            stat_per_level: 1,
            cash_per_level: dec!(50.00),
            reputation_per_level: 1,
        }
    }
}

/// Exchange tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Lowest accepted unit price
    pub min_price: i64,
    /// Highest accepted unit price
    pub max_price: i64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self { min_price: 1, max_price: 1_000_000 }
    }
}

/// One heist event template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeistTemplate {
    /// Keyword naming the job
    pub keyword: String,
    /// Smallest pot the template can draw
    pub pot_min: i64,
    /// Largest pot the template can draw
    pub pot_max: i64,
    /// Percent chance the pot carries a crypto bonus
    pub bonus_chance: i64,
    /// Smallest bonus when the roll hits
    pub bonus_min: Decimal,
    /// Largest bonus when the roll hits
    pub bonus_max: Decimal,
}

/// Heist engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeistConfig {
    /// Length of the join window, seconds
    pub join_window_secs: i64,
    /// Length of the betrayal window, seconds
    pub split_window_secs: i64,
    /// Templates a spawn draws from
    pub templates: Vec<HeistTemplate>,
    /// Base betrayal success chance, percent
    pub betray_base_chance: i64,
    /// Hard cap on the betrayal success chance before defense applies
    pub betray_max_chance: i64,
    /// Chance added per betray-skill level
    pub betray_skill_bonus: i64,
    /// Percent of the target's share stolen on success
    pub steal_pct: Decimal,
    /// Percent of the attacker's share forfeited on failure
    pub fail_pct: Decimal,
    /// Defense bonus granted to a target per failed betrayal
    pub defense_increment: i64,
    /// Upper bound on the defense bonus
    pub defense_cap: i64,
    /// Experience granted to the attacker on success
    pub betray_success_exp: i64,
    /// Experience granted to the attacker on failure
    pub betray_fail_exp: i64,
}

impl Default for HeistConfig {
    fn default() -> Self {
        Self {
            join_window_secs: 120,
            split_window_secs: 180,
            templates: default_templates(),
            betray_base_chance: 20,
            betray_max_chance: 80,
            betray_skill_bonus: 5,
            steal_pct: dec!(30),
            fail_pct: dec!(15),
            defense_increment: 10,
            defense_cap: 50,
            betray_success_exp: 25,
            betray_fail_exp: 10,
        }
    }
}

fn default_templates() -> Vec<HeistTemplate> {
    vec![
        HeistTemplate {
            keyword: "armored_truck".to_string(),
            pot_min: 50,
            pot_max: 300,
            bonus_chance: 10,
            bonus_min: dec!(0.001),
            bonus_max: dec!(0.01),
        },
        HeistTemplate {
            keyword: "casino_vault".to_string(),
            pot_min: 200,
            pot_max: 800,
            bonus_chance: 20,
            bonus_min: dec!(0.005),
            bonus_max: dec!(0.05),
        },
        HeistTemplate {
            keyword: "crypto_exchange".to_string(),
            pot_min: 100,
            pot_max: 500,
            bonus_chance: 60,
            bonus_min: dec!(0.01),
            bonus_max: dec!(0.1),
        },
    ]
}

/// Combat (theft) tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Seconds between theft attempts per attacker
    pub cooldown_secs: i64,
    /// Smallest possible steal draw
    pub steal_min: Decimal,
    /// Largest possible steal draw
    pub steal_max: Decimal,
    /// Fixed penalty paid to a defending victim (capped at attacker cash)
    pub defense_penalty: Decimal,
    /// Base chance the victim repels the attempt, percent
    pub defense_base_chance: i64,
    /// Reputation points per bonus percent point of defense
    pub defense_rep_divisor: i64,
    /// Cap on the reputation-scaled defense bonus
    pub defense_bonus_cap: i64,
    /// Base chance the attacker succeeds, percent
    pub success_base_chance: i64,
    /// Reputation points per bonus percent point of attack
    pub success_rep_divisor: i64,
    /// Cap on the reputation-scaled attack bonus
    pub success_bonus_cap: i64,
    /// Crypto credited to the attacker on success, if configured
    pub crypto_reward: Option<Decimal>,
    /// Experience for a successful theft
    pub success_exp: i64,
    /// Experience for a failed theft
    pub fail_exp: i64,
    /// Experience for the victim of a defended theft
    pub defense_exp: i64,
    /// Lifetime successes that trigger the one-time referral reward
    pub referral_threshold: i64,
    /// Cash paid to the referrer when the threshold is crossed
    pub referral_bonus: Decimal,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            steal_min: dec!(10.00),
            steal_max: dec!(150.00),
            defense_penalty: dec!(50.00),
            defense_base_chance: 25,
            defense_rep_divisor: 10,
            defense_bonus_cap: 25,
            success_base_chance: 40,
            success_rep_divisor: 10,
            success_bonus_cap: 25,
            crypto_reward: Some(dec!(0.001)),
            success_exp: 20,
            fail_exp: 5,
            defense_exp: 15,
            referral_threshold: 10,
            referral_bonus: dec!(200.00),
        }
    }
}

/// Full economy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Ledger tuning
    pub ledger: LedgerConfig,
    /// Progression tuning
    pub progression: ProgressionConfig,
    /// Exchange tuning
    pub exchange: ExchangeConfig,
    /// Heist tuning
    pub heist: HeistConfig,
    /// Combat tuning
    pub combat: CombatConfig,
    /// TTL for cached settings-table reads, seconds
    pub settings_ttl_secs: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            progression: ProgressionConfig::default(),
            exchange: ExchangeConfig::default(),
            heist: HeistConfig::default(),
            combat: CombatConfig::default(),
            settings_ttl_secs: 60,
        }
    }
}

impl EconomyConfig {
    /// The experience-grant parameters this config implies.
    pub fn experience_grant(&self, amount: i64) -> crate::entities::ExperienceGrant {
        crate::entities::ExperienceGrant {
            amount,
            level_multiplier: self.progression.level_multiplier,
            stat_per_level: self.progression.stat_per_level,
            cash_per_level: self.progression.cash_per_level,
            reputation_per_level: self.progression.reputation_per_level,
        }
    }

    /// The betrayal tuning this config implies.
    pub fn betrayal_tuning(&self) -> crate::entities::BetrayalTuning {
        crate::entities::BetrayalTuning {
            steal_pct: self.heist.steal_pct,
            fail_pct: self.heist.fail_pct,
            defense_increment: self.heist.defense_increment,
            defense_cap: self.heist.defense_cap,
        }
    }
}
