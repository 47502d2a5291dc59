//! Configuration management for the farm stock ledger
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with LEDGER_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{DEFAULT_BATCH_NUMBER_MIN_LEN, DEFAULT_REASON_MIN_LEN};

/// Main configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Locking and statement timeouts
    pub storage: StorageConfig,

    /// Business rules applied by the ledger
    pub ledger: LedgerRules,

    /// Log output
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Longest wait for a row lock before the operation fails as retryable
    pub lock_timeout_ms: u64,

    /// Longest single statement
    pub statement_timeout_ms: u64,
}

impl StorageConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            statement_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LedgerRules {
    /// Minimum characters in a batch number
    pub batch_number_min_len: usize,

    /// Minimum characters in an adjustment reason
    pub adjustment_reason_min_len: usize,

    /// Expiring within this many days is critical
    pub expiry_critical_days: i64,

    /// Expiring within this many days (after the critical tier) is a warning
    pub expiry_warning_days: i64,

    /// Horizon used when a caller does not pass one
    pub default_expiry_horizon_days: i64,
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            batch_number_min_len: DEFAULT_BATCH_NUMBER_MIN_LEN,
            adjustment_reason_min_len: DEFAULT_REASON_MIN_LEN,
            expiry_critical_days: 7,
            expiry_warning_days: 30,
            default_expiry_horizon_days: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "farm_stock_ledger=info,farm_ledger=info,sqlx=warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let rules = LedgerRules::default();
        let storage = StorageConfig::default();
        let logging = LoggingConfig::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.url", "postgres://localhost/farm_ledger")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("storage.lock_timeout_ms", storage.lock_timeout_ms as i64)?
            .set_default("storage.statement_timeout_ms", storage.statement_timeout_ms as i64)?
            .set_default("ledger.batch_number_min_len", rules.batch_number_min_len as i64)?
            .set_default(
                "ledger.adjustment_reason_min_len",
                rules.adjustment_reason_min_len as i64,
            )?
            .set_default("ledger.expiry_critical_days", rules.expiry_critical_days)?
            .set_default("ledger.expiry_warning_days", rules.expiry_warning_days)?
            .set_default(
                "ledger.default_expiry_horizon_days",
                rules.default_expiry_horizon_days,
            )?
            .set_default("logging.filter", logging.filter)?
            .set_default("logging.json", logging.json)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER_ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = LedgerRules::default();
        assert_eq!(rules.batch_number_min_len, 3);
        assert_eq!(rules.adjustment_reason_min_len, 10);
        assert_eq!(rules.expiry_critical_days, 7);
        assert_eq!(rules.expiry_warning_days, 30);
    }

    #[test]
    fn test_storage_durations() {
        let storage = StorageConfig {
            lock_timeout_ms: 250,
            statement_timeout_ms: 1_000,
        };
        assert_eq!(storage.lock_timeout(), Duration::from_millis(250));
        assert_eq!(storage.statement_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_uses_defaults() {
        let config = Config::load().unwrap();
        assert_eq!(config.ledger, LedgerRules::default());
        assert!(config.database.max_connections >= config.database.min_connections);
    }
}
