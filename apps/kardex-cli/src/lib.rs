//! # Kardex CLI Library
//!
//! Operator front-end for the stock engine: argument parsing, configuration,
//! logging setup and the command handlers.
//!
//! ## Module Organization
//! ```text
//! kardex_cli/
//! ├── lib.rs          ◄─── You are here (Cli, tracing, run)
//! ├── state/
//! │   ├── mod.rs      ◄─── AppState (Database + config + actor)
//! │   └── config.rs   ◄─── kardex.toml + KARDEX_* environment
//! ├── commands/
//! │   ├── mod.rs      ◄─── Command enum and dispatch
//! │   ├── registry.rs ◄─── location / category / supplier
//! │   ├── product.rs  ◄─── product add/list/show/edit/delete/low-stock
//! │   ├── import.rs   ◄─── product import from CSV
//! │   ├── stock.rs    ◄─── entry / exit / transfer / adjust / replay-legacy
//! │   ├── ledger.rs   ◄─── kardex history
//! │   ├── count.rs    ◄─── count sessions
//! │   └── report.rs   ◄─── valuation / abc / dead-stock / verify
//! └── error.rs        ◄─── ApiError for every command
//! ```
//!
//! ## Invocation Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize Logging (stderr, RUST_LOG or info,kardex=debug)        │
//! │  2. Load AppConfig: file → KARDEX_* env → --db / --tenant flags        │
//! │  3. Open Database (WAL, migrations)                                    │
//! │  4. Dispatch subcommand                                                │
//! │  5. Print result (text or --json), exit 0; or print ApiError, exit 1  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kardex_core::Actor;

use commands::Command;
use error::ApiError;
use state::{AppConfig, AppState, OutputFormat};

/// Command line.
#[derive(Debug, Parser)]
#[command(name = "kardex", version, about = "Multi-location stock control with a movement ledger")]
pub struct Cli {
    /// Config file (default: kardex.toml in the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Tenant id, overrides the configuration
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    /// Acting user id recorded on ledger entries
    #[arg(long, global = true, default_value = "cli")]
    pub user: String,

    /// Display name recorded on ledger entries (defaults to --user)
    #[arg(long, global = true)]
    pub user_name: Option<String>,

    /// Print results and errors as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Runs one CLI invocation and maps the outcome to an exit status.
pub async fn run(cli: Cli) -> ExitCode {
    init_tracing();

    let json = cli.json;
    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, json);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<(), ApiError> {
    let mut config = AppConfig::load(cli.config)?;
    if let Some(path) = cli.db {
        config.database.path = Some(path);
    }
    if let Some(tenant) = cli.tenant {
        config.tenant.id = tenant;
    }
    config.validate()?;

    if let Command::Config = cli.command {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let output = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let actor = Actor::new(cli.user.clone(), cli.user_name.unwrap_or(cli.user));

    let state = AppState::open(config, actor, output).await?;
    debug!(tenant = %state.db.tenant_id(), user = %state.actor.user_id, "Database ready");

    let result = commands::execute(&state, cli.command).await;
    state.db.close().await;
    result
}

fn report_error(err: &ApiError, json: bool) {
    if json {
        match serde_json::to_string(err) {
            Ok(body) => println!("{}", body),
            Err(_) => eprintln!("error [{}]: {}", err.code.as_str(), err.message),
        }
    } else {
        eprintln!("error [{}]: {}", err.code.as_str(), err.message);
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kardex=trace` - Show trace for kardex crates only
/// - Default: `info,kardex=debug,sqlx=warn`
///
/// Logs go to stderr so `--json` output on stdout stays parseable.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kardex=debug,sqlx=warn"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        info!(version = env!("CARGO_PKG_VERSION"), "kardex starting");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
