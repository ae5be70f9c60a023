//! # State Module
//!
//! Everything a command handler needs, built once per invocation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    AppState                                             │
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │   Database   │  │  AppConfig   │  │    Actor     │  │   Output   │  │
//! │  │              │  │              │  │              │  │            │  │
//! │  │  pool        │  │  tenant      │  │  --user      │  │  text or   │  │
//! │  │  engine()    │  │  default loc │  │  --user-name │  │  --json    │  │
//! │  │  repos       │  │  windows     │  │              │  │            │  │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘  │
//! │                                                                         │
//! │  Database handles are stateless over the pool; AppState is read-only.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;

pub use config::{
    AppConfig, ConfigError, DatabaseSettings, ReportSettings, StockSettings, MAX_WINDOW_DAYS,
};

use kardex_core::Actor;
use kardex_db::{Database, Reconciler, StockEngine};

use crate::error::ApiError;

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub actor: Actor,
    pub output: OutputFormat,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig, actor: Actor, output: OutputFormat) -> Self {
        AppState {
            db,
            config,
            actor,
            output,
        }
    }

    /// Opens the configured database and runs pending migrations.
    pub async fn open(config: AppConfig, actor: Actor, output: OutputFormat) -> Result<Self, ApiError> {
        let db_config = config.db_config()?;
        tracing::debug!(path = ?db_config.database_path, "Opening database");
        let db = Database::new(db_config).await?;
        Ok(AppState::new(db, config, actor, output))
    }

    pub fn engine(&self) -> StockEngine {
        self.db.engine()
    }

    pub fn reconciler(&self) -> Reconciler {
        self.db.reconciler(self.config.stock.default_location.clone())
    }

    pub fn is_json(&self) -> bool {
        self.output == OutputFormat::Json
    }
}
