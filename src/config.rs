//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is honoured by the
//! binary). Every setting has a default, so an empty environment is valid.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `COUNSEL_DATABASE` | SQLite database file | `counsel.db` |
//! | `COUNSEL_MIN_WITHDRAWAL` | Smallest withdrawal a consultant may request | `100.00` |
//! | `COUNSEL_BALANCE_RETRIES` | Attempts for a version-guarded balance write | `3` |

use std::env;

use thiserror::Error;

use crate::domain::{Cents, parse_cents};

pub const DEFAULT_DATABASE: &str = "counsel.db";
pub const DEFAULT_MIN_WITHDRAWAL: Cents = 10_000;
pub const DEFAULT_BALANCE_RETRIES: u32 = 3;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Rules the settlement engine enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPolicy {
    /// Smallest amount a single withdrawal may request
    pub minimum_withdrawal: Cents,
    /// How many times to re-read and re-apply a balance mutation that lost a
    /// version race before giving up
    pub balance_retries: u32,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            minimum_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            balance_retries: DEFAULT_BALANCE_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub policy: SettlementPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE.to_string(),
            policy: SettlementPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` uses the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("COUNSEL_DATABASE") {
            config.database_path = path;
        }

        if let Some(raw) = lookup("COUNSEL_MIN_WITHDRAWAL") {
            let minimum = parse_cents(&raw)
                .map_err(|e| ConfigError::InvalidValue("COUNSEL_MIN_WITHDRAWAL", e.to_string()))?;
            if minimum <= 0 {
                return Err(ConfigError::InvalidValue(
                    "COUNSEL_MIN_WITHDRAWAL",
                    "must be positive".to_string(),
                ));
            }
            config.policy.minimum_withdrawal = minimum;
        }

        if let Some(raw) = lookup("COUNSEL_BALANCE_RETRIES") {
            let retries: u32 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("COUNSEL_BALANCE_RETRIES", raw.clone()))?;
            config.policy.balance_retries = retries.max(1);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, "counsel.db");
        assert_eq!(config.policy.minimum_withdrawal, 10_000);
        assert_eq!(config.policy.balance_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("COUNSEL_DATABASE", "/tmp/x.db"),
            ("COUNSEL_MIN_WITHDRAWAL", "25.50"),
            ("COUNSEL_BALANCE_RETRIES", "0"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, "/tmp/x.db");
        assert_eq!(config.policy.minimum_withdrawal, 2550);
        assert_eq!(config.policy.balance_retries, 1);
    }

    #[test]
    fn test_invalid_minimum() {
        assert!(Config::from_lookup(lookup(&[("COUNSEL_MIN_WITHDRAWAL", "ten")])).is_err());
        assert!(Config::from_lookup(lookup(&[("COUNSEL_MIN_WITHDRAWAL", "0")])).is_err());
    }
}
