//! # Commands Module
//!
//! One file per command group. Each handler takes the [`AppState`], calls
//! into `kardex-db`, and prints the result as text or JSON.
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Group      Subcommands                            Backed by            │
//! │  ─────────  ───────────────────────────────────    ──────────────────── │
//! │  location   add list rename delete                 RegistryRepository   │
//! │  category   add list rename delete                 RegistryRepository   │
//! │  supplier   add list rename delete                 RegistryRepository   │
//! │  product    add list show edit delete low-stock    StockEngine + repo   │
//! │             import                                 StockEngine + csv    │
//! │  stock      entry exit transfer adjust             StockEngine          │
//! │             replay-legacy                          kardex_core::legacy  │
//! │  ledger     <product>                              LedgerRepository     │
//! │  count      start record finalize apply show list  Reconciler           │
//! │  report     valuation abc dead-stock verify        kardex_core::reports │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod count;
pub mod import;
pub mod ledger;
pub mod product;
pub mod registry;
pub mod report;
pub mod stock;

use clap::Subcommand;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stock locations (shop floor, warehouse, ...)
    #[command(subcommand)]
    Location(registry::LocationCommand),

    /// Product categories
    #[command(subcommand)]
    Category(registry::CategoryCommand),

    /// Suppliers
    #[command(subcommand)]
    Supplier(registry::SupplierCommand),

    /// Products and their quantities
    #[command(subcommand)]
    Product(product::ProductCommand),

    /// Entries, exits, transfers and adjustments
    #[command(subcommand)]
    Stock(stock::StockCommand),

    /// Movement history (kardex) of one product
    Ledger(ledger::LedgerArgs),

    /// Physical count sessions
    #[command(subcommand)]
    Count(count::CountCommand),

    /// Valuation, ABC, dead stock and ledger verification
    #[command(subcommand)]
    Report(report::ReportCommand),

    /// Print the effective configuration
    Config,
}

/// Runs one command against an open database.
pub async fn execute(state: &AppState, command: Command) -> Result<(), ApiError> {
    match command {
        Command::Location(cmd) => registry::location(state, cmd).await,
        Command::Category(cmd) => registry::category(state, cmd).await,
        Command::Supplier(cmd) => registry::supplier(state, cmd).await,
        Command::Product(cmd) => product::run(state, cmd).await,
        Command::Stock(cmd) => stock::run(state, cmd).await,
        Command::Ledger(args) => ledger::run(state, args).await,
        Command::Count(cmd) => count::run(state, cmd).await,
        Command::Report(cmd) => report::run(state, cmd).await,
        Command::Config => {
            println!("{}", state.config.to_toml()?);
            Ok(())
        }
    }
}

/// Prints `value` as pretty JSON, or through `text` otherwise.
pub(crate) fn emit<T: Serialize + ?Sized>(
    state: &AppState,
    value: &T,
    text: impl FnOnce(&T),
) -> Result<(), ApiError> {
    if state.is_json() {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

/// Prints a one-line confirmation, or `{"ok": true, ...}` with `--json`.
pub(crate) fn done(state: &AppState, message: &str) -> Result<(), ApiError> {
    emit(state, &serde_json::json!({ "ok": true, "message": message }), |_| {
        println!("{}", message)
    })
}
