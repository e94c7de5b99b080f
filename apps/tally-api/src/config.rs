//! API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Log output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub db_max_connections: u32,

    /// HMAC secret for bearer tokens
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// Expected `iss` claim, if any
    pub jwt_issuer: Option<String>,

    pub log_format: LogFormat,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = ApiConfig {
            http_port: lookup("HTTP_PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HTTP_PORT".to_string()))?,

            database_path: lookup("DATABASE_PATH")
                .unwrap_or_else(|| "./tally.db".to_string())
                .into(),

            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,

            jwt_secret: lookup("JWT_SECRET")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingRequired("JWT_SECRET".to_string()))?,

            jwt_issuer: lookup("JWT_ISSUER").filter(|s| !s.trim().is_empty()),

            log_format: match lookup("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
                None | Some("pretty") => LogFormat::Pretty,
                Some("json") => LogFormat::Json,
                Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT".to_string())),
            },
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.database_path, PathBuf::from("./tally.db"));
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.jwt_issuer, None);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("HTTP_PORT", "9090"),
            ("DATABASE_PATH", "/var/lib/tally/tally.db"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("JWT_ISSUER", "tally-auth"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.db_max_connections, 12);
        assert_eq!(config.jwt_issuer.as_deref(), Some("tally-auth"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingRequired("JWT_SECRET".to_string())
        );
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("HTTP_PORT", "http")])).unwrap_err(),
            ConfigError::InvalidValue("HTTP_PORT".to_string())
        );
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("LOG_FORMAT", "xml")])).unwrap_err(),
            ConfigError::InvalidValue("LOG_FORMAT".to_string())
        );
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("DB_MAX_CONNECTIONS", "0")])).unwrap_err(),
            ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string())
        );
    }
}
