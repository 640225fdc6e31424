//! Configuration management for the lot ledger service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::policy::AccessPolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Ledger behaviour
    pub ledger: LedgerSettings,

    /// Log output
    pub log: LogConfig,

    /// Role to permission grants, loaded once at start-up
    #[serde(default)]
    pub access: AccessPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,

    /// Run embedded migrations at start-up regardless of environment
    pub run_migrations: bool,
}

/// Settings read by the ledger services
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Days before expiry at which a lot is reported as near-expiry
    pub near_expiry_days: i64,

    /// Default number of movements returned by kardex queries
    pub kardex_limit: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            near_expiry_days: shared::DEFAULT_NEAR_EXPIRY_DAYS,
            kardex_limit: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let defaults = LedgerSettings::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.run_migrations", false)?
            .set_default("ledger.near_expiry_days", defaults.near_expiry_days)?
            .set_default("ledger.kardex_limit", defaults.kardex_limit)?
            .set_default("log.format", "pretty")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.ledger.near_expiry_days < 0 {
            return Err(ConfigError::Message(
                "ledger.near_expiry_days cannot be negative".to_string(),
            ));
        }
        if self.ledger.kardex_limit <= 0 {
            return Err(ConfigError::Message(
                "ledger.kardex_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Migrations run in development or when explicitly requested
    pub fn should_run_migrations(&self) -> bool {
        self.environment == "development" || self.database.run_migrations
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
