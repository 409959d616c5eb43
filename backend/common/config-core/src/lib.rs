//! Environment-driven configuration shared by the outbox poller and the analytics sink
//!
//! This library provides:
//! - Kafka, ClickHouse and logging configuration read from environment variables
//! - `.env` loading for local development
//! - Validation of every loaded section before it reaches a client
//! - Secret wrapping for credentials so they never show up in logs
//!
//! Each section is read under its own prefix (`KAFKA_`, `CH_`) or unprefixed for
//! process-wide settings such as `LOG_LEVEL`.

use serde::de::DeserializeOwned;
use validator::Validate;

pub mod clickhouse;
pub mod kafka;
pub mod observability;

// Re-export commonly used types
pub use clickhouse::ClickHouseConfig;
pub use kafka::{Acks, KafkaConfig, OffsetReset};
pub use observability::{init_tracing, LogFormat, LogLevel, LoggingConfig};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was present but could not be parsed into the target type
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// Values parsed but violate a validation rule
    #[error("Configuration validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load a `.env` file from the working directory (or its parents) if one exists.
///
/// Variables already present in the process environment win.
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    dotenvy::dotenv().ok()
}

/// Read and validate a configuration section from the process environment.
///
/// `prefix` is stripped from variable names before they are matched against
/// field names, so `KAFKA_BOOTSTRAP` with prefix `KAFKA_` fills `bootstrap`.
/// Pass an empty prefix for unprefixed variables.
pub fn from_env<T>(prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned + Validate,
{
    from_vars(prefix, std::env::vars())
}

/// Same as [`from_env`] but reads from an explicit list of variables.
pub fn from_vars<T, I>(prefix: &str, vars: I) -> ConfigResult<T>
where
    T: DeserializeOwned + Validate,
    I: IntoIterator<Item = (String, String)>,
{
    let config: T = envy::prefixed(prefix).from_iter(vars)?;
    config.validate()?;
    Ok(config)
}

/// Check that a name is safe to splice into DDL/DML as an identifier.
pub fn validate_identifier(value: &str) -> Result<(), validator::ValidationError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid && value.len() <= 63 {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_identifier"))
    }
}
