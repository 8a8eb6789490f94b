//! Configuration error types.

use thiserror::Error;

/// Error while loading the desk configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("malformed .env file: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("cannot parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}
