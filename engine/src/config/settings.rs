//! Engine configuration.
//!
//! Values are read from environment variables:
//! - `EXPLORE_MAX_HISTORY`: history entries kept per datasource (default: 100)
//! - `EXPLORE_HISTORY_FILE`: JSON file for persisted history (default: in memory)
//! - `EXPLORE_GRAPH_INTERVAL_MS`: log volume bucket size (default: 1000)
//! - `EXPLORE_MAX_ROWS`: maximum number of query rows (default: 26)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use validator::Validate;

use crate::history::MAX_HISTORY_ITEMS;
use crate::time::DEFAULT_INTERVAL_MS;

/// Environment variable for the history cap.
pub const MAX_HISTORY_ENV: &str = "EXPLORE_MAX_HISTORY";
/// Environment variable for the history file.
pub const HISTORY_FILE_ENV: &str = "EXPLORE_HISTORY_FILE";
/// Environment variable for the graph interval.
pub const GRAPH_INTERVAL_ENV: &str = "EXPLORE_GRAPH_INTERVAL_MS";
/// Environment variable for the row limit.
pub const MAX_ROWS_ENV: &str = "EXPLORE_MAX_ROWS";

/// Default row limit, one row per letter.
pub const DEFAULT_MAX_ROWS: usize = 26;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value '{value}' for {name}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A parsed value is out of range.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// History entries kept per datasource.
    #[validate(range(min = 1, max = 10_000, message = "History size must be between 1 and 10000"))]
    pub max_history: usize,

    /// File backing persisted history; `None` keeps history in memory.
    pub history_file: Option<PathBuf>,

    /// Log volume bucket size in milliseconds.
    #[validate(range(min = 1, message = "Graph interval must be positive"))]
    pub graph_interval_ms: i64,

    /// Maximum number of query rows.
    #[validate(range(min = 1, max = 1_000, message = "Row limit must be between 1 and 1000"))]
    pub max_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY_ITEMS,
            history_file: None,
            graph_interval_ms: DEFAULT_INTERVAL_MS,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_history: parse_var(&lookup, MAX_HISTORY_ENV)?.unwrap_or(defaults.max_history),
            history_file: lookup(HISTORY_FILE_ENV)
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            graph_interval_ms: parse_var(&lookup, GRAPH_INTERVAL_ENV)?
                .unwrap_or(defaults.graph_interval_ms),
            max_rows: parse_var(&lookup, MAX_ROWS_ENV)?.unwrap_or(defaults.max_rows),
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_history, 100);
        assert_eq!(config.graph_interval_ms, 1000);
        assert!(config.history_file.is_none());
    }

    #[test]
    fn test_values_from_environment() {
        let config = load(&[
            (MAX_HISTORY_ENV, "20"),
            (HISTORY_FILE_ENV, "/tmp/explore-history.json"),
            (GRAPH_INTERVAL_ENV, "15000"),
            (MAX_ROWS_ENV, "5"),
        ])
        .unwrap();

        assert_eq!(config.max_history, 20);
        assert_eq!(
            config.history_file,
            Some(PathBuf::from("/tmp/explore-history.json"))
        );
        assert_eq!(config.graph_interval_ms, 15_000);
        assert_eq!(config.max_rows, 5);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = load(&[(MAX_HISTORY_ENV, "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: MAX_HISTORY_ENV,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_value_is_rejected() {
        assert!(matches!(
            load(&[(MAX_HISTORY_ENV, "0")]),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            load(&[(GRAPH_INTERVAL_ENV, "-5")]),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
