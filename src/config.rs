//! Configuration file support.
//!
//! Loads the database location and the seed values of the variables table
//! from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::VARIABLES;

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Database file. `None` opens an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long SQLite waits on a locked database file.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Seed values for the variables table, keyed by variable name.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            variables: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text and validates the variables.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.seed_values()?;
        Ok(config)
    }

    /// Returns the configured seed values, rejecting unknown names and
    /// values that are not decimals.
    pub fn seed_values(&self) -> Result<BTreeMap<&'static str, Decimal>> {
        let mut values = BTreeMap::new();
        for (name, raw) in self.variables.iter() {
            let known = VARIABLES
                .iter()
                .find(|v| v.name == name.as_str())
                .ok_or(Error::Config(format!("unknown variable {}", name)))?;
            let value = Decimal::from_str(raw.trim())
                .map_err(|e| Error::Config(format!("variable {}: {}", name, e)))?;
            values.insert(known.name, value);
        }
        Ok(values)
    }
}
