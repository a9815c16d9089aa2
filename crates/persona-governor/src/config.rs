//! Governor configuration: persona policies, rebirth routing, and ledger location.
//!
//! Precedence: environment (`PERSONA_*`, nested keys with `__`) > TOML file > defaults.
//! The file path comes from `PERSONA_GOVERNOR_CONFIG`, else `config/governor.toml`.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | PERSONA_LEDGER_PATH | ./data/karma.log | Durable karma log. |
//! | PERSONA_CACHE_CAPACITY | 1024 | Max distinct personas cached by the ledger. |
//! | PERSONA_REBIRTH__KARMA_FLOOR_TARGET | guardian_64k | Relaunch persona after a karma-floor trip. |
//! | PERSONA_REBIRTH__SESSION_CAP_TARGET | lite_2k | Relaunch persona after a session-cap trip. |
//!
//! `rebirth.ladder` (file only) orders personas by tier; a trip that would relaunch the same
//! persona moves one rung up instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::governor::{LifecycleGovernor, RebirthTable};
use crate::ledger::{KarmaLedger, DEFAULT_CACHE_CAPACITY, DEFAULT_LEDGER_PATH};
use crate::policy::{builtin_policies, Policy, PolicyResolver};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "PERSONA_GOVERNOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/governor.toml";

fn default_ledger_path() -> String {
    DEFAULT_LEDGER_PATH.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Policy for unknown or empty persona ids.
    #[serde(default)]
    pub default_policy: Policy,
    /// Persona table. Empty = built-in catalogue.
    #[serde(default)]
    pub personas: Vec<Policy>,
    #[serde(default)]
    pub rebirth: RebirthTable,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            cache_capacity: default_cache_capacity(),
            default_policy: Policy::default(),
            personas: Vec::new(),
            rebirth: RebirthTable::default(),
        }
    }
}

impl GovernorConfig {
    /// Loads from the file named by `PERSONA_GOVERNOR_CONFIG` (or the default path) plus env.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Loads `path` if it exists, then applies `PERSONA_*` env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .set_default("ledger_path", DEFAULT_LEDGER_PATH)?
            .set_default("cache_capacity", DEFAULT_CACHE_CAPACITY as i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("PERSONA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rebirth.validate()
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.ledger_path)
    }

    pub fn policy_resolver(&self) -> PolicyResolver {
        let policies = if self.personas.is_empty() {
            builtin_policies()
        } else {
            self.personas.clone()
        };
        PolicyResolver::new(policies, self.default_policy.clone())
    }

    pub fn rebirth_table(&self) -> RebirthTable {
        self.rebirth.clone()
    }

    /// File-backed ledger; nothing is read until the first query.
    pub fn open_ledger(&self) -> KarmaLedger {
        KarmaLedger::open(self.ledger_path(), self.cache_capacity)
    }

    /// Governor on the system monotonic clock with this config's policies and rebirth table.
    pub fn governor(&self) -> LifecycleGovernor {
        LifecycleGovernor::new(Arc::new(self.policy_resolver()))
            .with_rebirth_table(self.rebirth_table())
    }
}
