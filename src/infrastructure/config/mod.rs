//! Configuration loading (figment: defaults, YAML files, env overrides).

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
