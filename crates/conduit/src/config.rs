//! Configuration for modules and logging.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration:
//!
//! ```
//! use conduit::config::Config;
//!
//! let config = Config::from_json(r#"{ "module": { "server_capacity": 64 } }"#).unwrap();
//! assert_eq!(config.module.server_capacity, 64);
//! assert_eq!(config.module.async_call_capacity, 10_000);
//! ```

use conduit_core::{Level, Logger, WriterSink};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Error returned when configuration cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    /// The contents are not valid configuration JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue sizes for each module.
    pub module: ModuleConfig,
    /// Where and how much to log.
    pub log: LogConfig,
}

impl Config {
    /// Parses and validates configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.module.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Queue sizes of one module's skeleton.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Capacity of the server's inbound call queue.
    pub server_capacity: usize,
    /// Cap on the skeleton client's asynchronous calls in flight.
    pub async_call_capacity: usize,
    /// Capacity of the dispatcher's completion channel.
    pub dispatcher_capacity: usize,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            server_capacity: 10_000,
            async_call_capacity: 10_000,
            dispatcher_capacity: 10_000,
        }
    }
}

impl ModuleConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server's inbound queue capacity.
    pub fn server_capacity(mut self, capacity: usize) -> Self {
        self.server_capacity = capacity;
        self
    }

    /// Sets the cap on asynchronous calls in flight.
    pub fn async_call_capacity(mut self, capacity: usize) -> Self {
        self.async_call_capacity = capacity;
        self
    }

    /// Sets the dispatcher's completion channel capacity.
    pub fn dispatcher_capacity(mut self, capacity: usize) -> Self {
        self.dispatcher_capacity = capacity;
        self
    }

    /// Checks that the queues can hold at least one entry.
    ///
    /// A zero `async_call_capacity` is allowed and disables asynchronous
    /// calls.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_capacity == 0 {
            return Err(ConfigError::Invalid("server_capacity must be at least 1".into()));
        }
        if self.dispatcher_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level written.
    pub level: Level,
    /// Directory for log files. Logs go to `tracing` when unset.
    pub path: Option<PathBuf>,
}

impl LogConfig {
    /// Builds the logger this configuration describes.
    ///
    /// With a `path`, a new timestamped file is created in that directory.
    pub fn build_logger(&self) -> io::Result<Logger> {
        match &self.path {
            Some(dir) => Ok(Logger::new(self.level, Arc::new(WriterSink::create_in(dir)?))),
            None => Ok(Logger::tracing(self.level)),
        }
    }
}
