//! # Application Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command line (--db, --tenant)           (highest priority)         │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     KARDEX_DB_PATH=/data/kardex.db                                     │
//! │     KARDEX_DEFAULT_LOCATION=<location id>                              │
//! │                                                                         │
//! │  3. TOML Config File (--config, or)                                    │
//! │     ~/.config/kardex/kardex.toml (Linux)                               │
//! │     ~/Library/Application Support/com.kardex.kardex/kardex.toml (macOS)│
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/kardex/kardex.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [tenant]
//! id = "00000000-0000-0000-0000-000000000001"
//!
//! [stock]
//! default_location = "2b6f0cc9-..."   # receives count surplus for products with no stock
//! retry_attempts = 8
//! retry_initial_ms = 10
//! retry_max_ms = 500
//!
//! [reports]
//! abc_window_days = 90
//! dead_stock_days = 180
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use kardex_core::reports::{DEFAULT_ABC_WINDOW_DAYS, DEFAULT_DEAD_STOCK_DAYS};
use kardex_core::DEFAULT_TENANT_ID;
use kardex_db::{DbConfig, RetryPolicy};

const CONFIG_FILE: &str = "kardex.toml";
const DATABASE_FILE: &str = "kardex.db";

/// Longest report window accepted, about a century.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No database path configured and no platform data directory.
    #[error("could not determine a data directory; set KARDEX_DB_PATH or [database].path")]
    NoDataDir,
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSettings {
    pub id: String,
}

impl Default for TenantSettings {
    fn default() -> Self {
        TenantSettings {
            id: DEFAULT_TENANT_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StockSettings {
    /// Location that receives count surplus for products with no stock rows.
    pub default_location: Option<String>,
    pub retry_attempts: u32,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for StockSettings {
    fn default() -> Self {
        StockSettings {
            default_location: None,
            retry_attempts: 8,
            retry_initial_ms: 10,
            retry_max_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub abc_window_days: i64,
    pub dead_stock_days: i64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            abc_window_days: DEFAULT_ABC_WINDOW_DAYS,
            dead_stock_days: DEFAULT_DEAD_STOCK_DAYS,
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub tenant: TenantSettings,

    #[serde(default)]
    pub stock: StockSettings,

    #[serde(default)]
    pub reports: ReportSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, or kardex.toml in the config dir)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                config = Self::read(&path)?;
            }
            None => {
                if let Some(path) = Self::default_config_path() {
                    if path.exists() {
                        config = Self::read(&path)?;
                    } else {
                        debug!(?path, "Config file not found, using defaults");
                    }
                }
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn read(path: &std::path::Path) -> Result<Self, ConfigError> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenant.id.trim().is_empty() {
            return Err(ConfigError::Invalid("tenant.id must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.stock.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "stock.retry_attempts must be greater than 0".into(),
            ));
        }
        if self.stock.retry_initial_ms > self.stock.retry_max_ms {
            return Err(ConfigError::Invalid(
                "stock.retry_initial_ms must not exceed stock.retry_max_ms".into(),
            ));
        }
        let windows = [self.reports.abc_window_days, self.reports.dead_stock_days];
        if windows.iter().any(|days| !(1..=MAX_WINDOW_DAYS).contains(days)) {
            return Err(ConfigError::Invalid(format!(
                "report windows must be between 1 and {} days",
                MAX_WINDOW_DAYS
            )));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `KARDEX_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("KARDEX_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(id) = lookup("KARDEX_TENANT_ID") {
            self.tenant.id = id;
        }

        if let Some(location) = lookup("KARDEX_DEFAULT_LOCATION") {
            self.stock.default_location = Some(location);
        }

        parse_override(&lookup, "KARDEX_MAX_CONNECTIONS", &mut self.database.max_connections);
        parse_override(&lookup, "KARDEX_RETRY_ATTEMPTS", &mut self.stock.retry_attempts);
        parse_override(&lookup, "KARDEX_ABC_WINDOW_DAYS", &mut self.reports.abc_window_days);
        parse_override(&lookup, "KARDEX_DEAD_STOCK_DAYS", &mut self.reports.dead_stock_days);
    }

    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// The database file, creating the platform data directory if needed.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = project_dirs().ok_or(ConfigError::NoDataDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join(DATABASE_FILE))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.stock.retry_attempts,
            Duration::from_millis(self.stock.retry_initial_ms),
            Duration::from_millis(self.stock.retry_max_ms),
        )
    }

    /// Pool settings for [`kardex_db::Database::new`].
    pub fn db_config(&self) -> Result<DbConfig, ConfigError> {
        Ok(DbConfig::new(self.database_path()?)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .tenant_id(self.tenant.id.clone())
            .retry_policy(self.retry_policy()))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "kardex", "kardex")
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment override"),
        }
    }
}
