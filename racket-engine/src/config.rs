//! Configuration loading.
//!
//! Starts from the documented defaults and applies `RACKET_*` environment
//! overrides for the values operators actually tune. A `.env` file is
//! honored when present.

use racket_domain::EconomyConfig;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparsable value
    #[error("Invalid value for {var}: {value}")]
    Invalid {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },
}

/// Load the economy configuration from the environment.
///
/// Unset variables keep their defaults; set variables must parse.
pub fn from_env() -> Result<EconomyConfig, ConfigError> {
    // Load .env file if present (ignore errors)
    let _ = dotenvy::dotenv();

    let mut config = EconomyConfig::default();

    if let Some(value) = read_decimal("RACKET_STARTING_CASH")? {
        config.ledger.starting_cash = value;
    }
    if let Some(value) = read_i64("RACKET_SKILL_MAX")? {
        config.ledger.skill_max = value;
    }
    if let Some(value) = read_i64("RACKET_MIN_PRICE")? {
        config.exchange.min_price = value;
    }
    if let Some(value) = read_i64("RACKET_MAX_PRICE")? {
        config.exchange.max_price = value;
    }
    if let Some(value) = read_i64("RACKET_JOIN_WINDOW_SECS")? {
        config.heist.join_window_secs = value;
    }
    if let Some(value) = read_i64("RACKET_SPLIT_WINDOW_SECS")? {
        config.heist.split_window_secs = value;
    }
    if let Some(value) = read_i64("RACKET_THEFT_COOLDOWN_SECS")? {
        config.combat.cooldown_secs = value;
    }
    if let Some(value) = read_i64("RACKET_SETTINGS_TTL_SECS")? {
        config.settings_ttl_secs = value.max(0) as u64;
    }

    Ok(config)
}

fn read_i64(var: &str) -> Result<Option<i64>, ConfigError> {
    read_parsed::<i64>(var)
}

fn read_decimal(var: &str) -> Result<Option<Decimal>, ConfigError> {
    read_parsed::<Decimal>(var)
}

fn read_parsed<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var: var.to_string(), value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Env-var tests mutate process state; keep them in one test to avoid
    // interference under parallel execution.
    #[test]
    fn test_from_env_overrides_and_rejects_garbage() {
        env::remove_var("RACKET_STARTING_CASH");
        let config = from_env().unwrap();
        assert_eq!(config.ledger.starting_cash, dec!(500.00));

        env::set_var("RACKET_STARTING_CASH", "750.50");
        env::set_var("RACKET_JOIN_WINDOW_SECS", "45");
        let config = from_env().unwrap();
        assert_eq!(config.ledger.starting_cash, dec!(750.50));
        assert_eq!(config.heist.join_window_secs, 45);

        env::set_var("RACKET_STARTING_CASH", "a lot");
        assert!(from_env().is_err());

        env::remove_var("RACKET_STARTING_CASH");
        env::remove_var("RACKET_JOIN_WINDOW_SECS");
    }
}
