use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};

pub const DEFAULT_LEDGER_PATH: &str = "expenses.csv";
pub const DEFAULT_CATEGORIES: [&str; 6] = ["Food", "Transport", "Rent", "Shopping", "Utility", "Other"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub enabled: bool,
    pub only_on_last_day: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        DigestConfig {
            enabled: false,
            only_on_last_day: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger_path: PathBuf,
    /// Labels offered for entry. The store accepts any non-empty label.
    pub categories: Vec<String>,
    pub currency_symbol: String,
    pub digest: DigestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            currency_symbol: "$".to_string(),
            digest: DigestConfig::default(),
        }
    }
}

impl DigestConfig {
    /// A disabled digest runs only when the caller forces it.
    pub fn should_run(&self, force: bool) -> bool {
        self.enabled || force
    }

    /// Whether the send ignores the last-day-of-period check.
    pub fn any_day(&self, force: bool) -> bool {
        force || !self.only_on_last_day
    }
}

impl Config {
    pub fn from_toml(data: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(data).map_err(|e| LedgerError::Config(e.to_string()))?;
        if cfg.ledger_path.as_os_str().is_empty() {
            return Err(LedgerError::Config("ledger_path is empty".to_string()));
        }
        Ok(cfg)
    }

    /// Reads the file at `path`, or returns defaults when no path was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let data = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&data)
    }

    pub fn is_known_category(&self, label: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(label.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_defaults_without_file() -> Result<()> {
        let cfg = Config::load(None)?;
        assert_eq!(cfg.ledger_path, PathBuf::from("expenses.csv"));
        assert_eq!(cfg.categories.len(), 6);
        assert!(!cfg.digest.enabled);
        assert!(cfg.digest.only_on_last_day);
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let cfg = Config::from_toml(
            r#"
            ledger_path = "/tmp/expenses.csv"
            currency_symbol = "€"

            [digest]
            enabled = true
            "#,
        )?;
        assert_eq!(cfg.ledger_path, PathBuf::from("/tmp/expenses.csv"));
        assert_eq!(cfg.currency_symbol, "€");
        assert!(cfg.digest.enabled);
        assert!(cfg.digest.only_on_last_day);
        assert!(cfg.is_known_category("food"));
        assert!(!cfg.is_known_category("Pets"));
        Ok(())
    }

    #[test]
    fn test_disabled_digest_ignores_day_setting() {
        let digest = DigestConfig {
            enabled: false,
            only_on_last_day: false,
        };
        assert!(!digest.should_run(false));
        assert!(digest.should_run(true));
        assert!(digest.any_day(false));

        let digest = DigestConfig {
            enabled: true,
            only_on_last_day: true,
        };
        assert!(digest.should_run(false));
        assert!(!digest.any_day(false));
        assert!(digest.any_day(true));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        assert!(matches!(
            Config::from_toml("ledger_path = 5"),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("ledger_path = \"\""),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let res = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(res, Err(LedgerError::Config(_))));
        Ok(())
    }
}
