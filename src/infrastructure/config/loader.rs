use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid worker_partitions: {0}. Must be between 1 and 64")]
    InvalidWorkerPartitions(usize),

    #[error("Invalid partition_queue_capacity: {0}. Must be at least 1")]
    InvalidQueueCapacity(usize),

    #[error("Invalid action_timeout_ms: {0}. Must be at least 100")]
    InvalidActionTimeout(u64),

    #[error("Invalid timezone in business_hours: {0}")]
    InvalidTimezone(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .meridian/config.yaml (project config)
    /// 3. .meridian/local.yaml (local overrides, optional)
    /// 4. Environment variables (MERIDIAN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".meridian/config.yaml"))
            .merge(Yaml::file(".meridian/local.yaml"))
            .merge(Env::prefixed("MERIDIAN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context("Failed to extract configuration from file")?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }

        if config.engine.worker_partitions == 0 || config.engine.worker_partitions > 64 {
            return Err(ConfigError::InvalidWorkerPartitions(
                config.engine.worker_partitions,
            ));
        }
        if config.engine.partition_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(
                config.engine.partition_queue_capacity,
            ));
        }
        if config.engine.action_timeout_ms < 100 {
            return Err(ConfigError::InvalidActionTimeout(
                config.engine.action_timeout_ms,
            ));
        }

        if let Some(hours) = &config.business_hours {
            if hours.timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(ConfigError::InvalidTimezone(hours.timezone.clone()));
            }
        }

        Ok(())
    }
}
