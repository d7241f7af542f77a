//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the mandi rates service,
//! supporting multiple sources (files, environment variables) with
//! validation and type-safe access to all system settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (highest priority)
//! 2. Configuration files
//! 3. Default values (lowest priority)
//!
//! ## Usage
//! ```rust,no_run
//! use krishivedah_rates::config::Config;
//!
//! // Load from default locations
//! let config = Config::load().unwrap();
//!
//! // Access configuration
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{RatesError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server and API configuration
    pub server: ServerConfig,
    /// Remote price source settings
    pub source: PriceSourceConfig,
    /// Cache store settings
    pub storage: StorageConfig,
    /// Logging and monitoring
    pub logging: LoggingConfig,
}

/// Server and API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable CORS for the web frontend
    pub enable_cors: bool,
    /// Allowed CORS origins ("*" allows any)
    pub allowed_origins: Vec<String>,
}

/// Remote government price API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSourceConfig {
    /// API base URL
    pub base_url: String,
    /// API key sent as the `api-key` query parameter
    pub api_key: String,
    /// Fixed state filter applied to every query
    pub state: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Maximum records requested per query
    pub page_size: usize,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Tree name holding rate cache entries
    pub rates_tree: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                "Configuration file not found: {:?}, using defaults",
                path
            );
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| RatesError::Config {
                message: format!("Failed to read config file {:?}: {}", path, e),
            })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| RatesError::Config {
                message: format!("Failed to parse config file {:?}: {}", path, e),
            })?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("KV_RATES_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("KV_RATES_PORT") {
            self.server.port = port.parse().map_err(|_| RatesError::Config {
                message: "Invalid port number in KV_RATES_PORT".to_string(),
            })?;
        }
        if let Ok(api_key) = std::env::var("KV_RATES_SOURCE_API_KEY") {
            self.source.api_key = api_key;
        }
        if let Ok(base_url) = std::env::var("KV_RATES_SOURCE_URL") {
            self.source.base_url = base_url;
        }
        if let Ok(db_path) = std::env::var("KV_RATES_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RatesError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.source.base_url.is_empty() {
            return Err(RatesError::ValidationFailed {
                field: "source.base_url".to_string(),
                reason: "Price source URL cannot be empty".to_string(),
            });
        }

        if self.source.state.is_empty() {
            return Err(RatesError::ValidationFailed {
                field: "source.state".to_string(),
                reason: "Fixed state filter cannot be empty".to_string(),
            });
        }

        if self.source.timeout_seconds == 0 {
            return Err(RatesError::ValidationFailed {
                field: "source.timeout_seconds".to_string(),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }

        if self.storage.rates_tree.is_empty() {
            return Err(RatesError::ValidationFailed {
                field: "storage.rates_tree".to_string(),
                reason: "Tree name cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RatesError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                enable_cors: true,
                allowed_origins: vec!["*".to_string()],
            },
            source: PriceSourceConfig {
                base_url:
                    "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070"
                        .to_string(),
                api_key: String::new(),
                state: "Maharashtra".to_string(),
                timeout_seconds: 30,
                page_size: 100,
            },
            storage: StorageConfig {
                db_path: PathBuf::from("./data/rates.db"),
                rates_tree: "mandi_rates".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_state_rejected() {
        let mut config = Config::default();
        config.source.state = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.source.state, config.source.state);
    }
}
