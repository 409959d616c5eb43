//! ClickHouse configuration

use secrecy::SecretString;
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Connection and target table for the analytics sink, read from `CH_*`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClickHouseConfig {
    /// HTTP endpoint, e.g. `http://localhost:8123`
    #[validate(custom(function = "validate_http_url"))]
    #[serde(default = "default_url")]
    pub url: String,

    #[validate(custom(function = "crate::validate_identifier"))]
    #[serde(default = "default_database")]
    pub database: String,

    #[validate(custom(function = "crate::validate_identifier"))]
    #[serde(default = "default_table")]
    pub table: String,

    #[validate(length(min = 1))]
    #[serde(default = "default_user")]
    pub user: String,

    /// Password (secret)
    #[serde(default = "default_password")]
    pub password: SecretString,
}

fn default_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "analytics".to_string()
}

fn default_table() -> String {
    "user_logins".to_string()
}

fn default_user() -> String {
    "app".to_string()
}

fn default_password() -> SecretString {
    SecretString::from("app".to_string())
}

fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ValidationError::new("http_url")),
    }
}

impl ClickHouseConfig {
    /// Load from `CH_*` variables.
    pub fn from_env() -> crate::ConfigResult<Self> {
        crate::from_env("CH_")
    }

    /// `database.table`, both already validated as plain identifiers
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            table: default_table(),
            user: default_user(),
            password: default_password(),
        }
    }
}
