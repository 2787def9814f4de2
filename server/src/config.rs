use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

/// Configuration for the `cake` binary, usually read from a YAML file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("database path must not be empty")]
    EmptyDatabase,
}

pub struct ValidatedConfig {
    pub database: PathBuf,
    pub port: u16,
    pub log_level: Level,
    pub log_json: bool,
    pub busy_timeout: Duration,
    pub max_body_bytes: usize,
}

fn default_database() -> String {
    "cake.db".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            port: default_port(),
            log_level: default_log_level(),
            log_json: false,
            busy_timeout_ms: default_busy_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "busy_timeout_ms",
                value: self.busy_timeout_ms,
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "max_body_bytes",
                value: self.max_body_bytes as u64,
            });
        }

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            database: PathBuf::from(self.database),
            port: self.port,
            log_level,
            log_json: self.log_json,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_body_bytes: self.max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.database, PathBuf::from("cake.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, Level::INFO);
        assert!(!config.log_json);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert_eq!(config.max_body_bytes, 64 * 1024);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
database: /var/lib/cake/ledger.db
port: 9000
log_level: debug
log_json: true
busy_timeout_ms: 250
max_body_bytes: 1024
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/cake/ledger.db"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.log_json);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_invalid_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel { value }) if value == "loud"
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = Config {
            busy_timeout_ms: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "busy_timeout_ms",
                ..
            })
        ));

        let config = Config {
            max_body_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "max_body_bytes",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_database_rejected() {
        let config = Config {
            database: "  ".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyDatabase)));
    }
}
