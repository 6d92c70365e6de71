//! Configuration module for the explore engine.

pub mod settings;

pub use settings::{
    ConfigError, EngineConfig, DEFAULT_MAX_ROWS, GRAPH_INTERVAL_ENV, HISTORY_FILE_ENV,
    MAX_HISTORY_ENV, MAX_ROWS_ENV,
};
