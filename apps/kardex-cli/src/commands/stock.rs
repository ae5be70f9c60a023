//! # Stock Commands
//!
//! Thin wrappers over [`kardex_db::StockEngine`]. Products resolve by id or
//! SKU, locations by id or name; the engine does the rest.
//!
//! `replay-legacy` reads a JSON export of movement records from an older
//! store and replays them in order, one engine transaction per movement.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

use kardex_core::legacy::{self, LegacyRecord};
use kardex_core::{Actor, CoreError, StockMutation};
use kardex_db::{MutationOutcome, RegistryRepository};

use super::emit;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum StockCommand {
    /// Receive stock at a location
    Entry {
        product: String,
        location: String,
        quantity: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove stock from a location (sale, loss, consumption)
    Exit {
        product: String,
        location: String,
        quantity: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Move stock between two locations
    Transfer {
        product: String,
        from: String,
        to: String,
        quantity: i64,
    },
    /// Set the quantity at a location
    Adjust {
        product: String,
        location: String,
        quantity: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Replay movement records exported from an older store (JSON array)
    ReplayLegacy {
        file: PathBuf,
        /// Location for records that name none (default from config)
        #[arg(long)]
        location: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    records: usize,
    replayed: usize,
    entries: usize,
}

pub async fn run(state: &AppState, cmd: StockCommand) -> Result<(), ApiError> {
    let products = state.db.products();
    let registry = state.db.registry();
    let engine = state.engine();
    let actor = &state.actor;

    let outcome = match cmd {
        StockCommand::Entry {
            product,
            location,
            quantity,
            reason,
        } => {
            let product = products.resolve(&product).await?;
            let location = registry.resolve_location(&location).await?;
            engine
                .apply_entry(&product.id, &location.id, quantity, reason.as_deref(), actor)
                .await?
        }
        StockCommand::Exit {
            product,
            location,
            quantity,
            reason,
        } => {
            let product = products.resolve(&product).await?;
            let location = registry.resolve_location(&location).await?;
            engine
                .apply_exit(&product.id, &location.id, quantity, reason.as_deref(), actor)
                .await?
        }
        StockCommand::Transfer {
            product,
            from,
            to,
            quantity,
        } => {
            let product = products.resolve(&product).await?;
            let from = registry.resolve_location(&from).await?;
            let to = registry.resolve_location(&to).await?;
            engine
                .apply_transfer(&product.id, &from.id, &to.id, quantity, actor)
                .await?
        }
        StockCommand::Adjust {
            product,
            location,
            quantity,
            reason,
        } => {
            let product = products.resolve(&product).await?;
            let location = registry.resolve_location(&location).await?;
            engine
                .apply_adjustment(&product.id, &location.id, quantity, reason.as_deref(), actor)
                .await?
        }
        StockCommand::ReplayLegacy { file, location } => {
            return replay_legacy(state, &file, location).await;
        }
    };

    emit(state, &outcome, print_outcome)
}

async fn replay_legacy(
    state: &AppState,
    file: &Path,
    location: Option<String>,
) -> Result<(), ApiError> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| ApiError::validation(format!("cannot read {}: {}", file.display(), e)))?;
    let records: Vec<LegacyRecord> = serde_json::from_str(&raw)
        .map_err(|e| ApiError::validation(format!("invalid legacy export: {}", e)))?;

    let default_location = location.or_else(|| state.config.stock.default_location.clone());
    let steps =
        legacy::plan_replay(&records, default_location.as_deref()).map_err(CoreError::from)?;

    let products = state.db.products();
    let registry = state.db.registry();
    let engine = state.engine();
    let mut summary = ReplaySummary {
        records: records.len(),
        replayed: 0,
        entries: 0,
    };

    for step in &steps {
        let applied: Result<MutationOutcome, ApiError> = async {
            let product = products.resolve(&step.product_id).await?;
            let mutation = resolve_locations(&registry, &step.mutation).await?;
            let actor = match &step.user {
                Some(user) => Actor::new(user.clone(), user.clone()),
                None => state.actor.clone(),
            };
            engine
                .apply(&product.id, &mutation, step.reason.as_deref(), &actor)
                .await
                .map_err(ApiError::from)
        }
        .await;

        match applied {
            Ok(outcome) => {
                summary.replayed += 1;
                summary.entries += outcome.entries.len();
            }
            Err(err) => {
                return Err(ApiError::new(
                    err.code,
                    format!(
                        "record {}: {} ({} of {} movements replayed before it)",
                        step.record + 1,
                        err.message,
                        summary.replayed,
                        steps.len()
                    ),
                ));
            }
        }
    }

    emit(state, &summary, |s| {
        println!(
            "Replayed {} movements from {} records, {} ledger entries written",
            s.replayed, s.records, s.entries
        )
    })
}

/// Maps location ids or names in a mutation to registry ids.
async fn resolve_locations(
    registry: &RegistryRepository,
    mutation: &StockMutation,
) -> Result<StockMutation, ApiError> {
    let id = |key: &str| {
        let key = key.to_string();
        async move { Ok::<String, ApiError>(registry.resolve_location(&key).await?.id) }
    };

    Ok(match mutation {
        StockMutation::Entry {
            location_id,
            quantity,
        } => StockMutation::Entry {
            location_id: id(location_id).await?,
            quantity: *quantity,
        },
        StockMutation::Exit {
            location_id,
            quantity,
        } => StockMutation::Exit {
            location_id: id(location_id).await?,
            quantity: *quantity,
        },
        StockMutation::Transfer { from, to, quantity } => StockMutation::Transfer {
            from: id(from).await?,
            to: id(to).await?,
            quantity: *quantity,
        },
        StockMutation::Adjustment {
            location_id,
            new_quantity,
        } => StockMutation::Adjustment {
            location_id: id(location_id).await?,
            new_quantity: *new_quantity,
        },
        StockMutation::Correction { location_id, delta } => StockMutation::Correction {
            location_id: id(location_id).await?,
            delta: *delta,
        },
    })
}

fn print_outcome(outcome: &MutationOutcome) {
    if outcome.entries.is_empty() {
        println!("No change: {} already at that quantity", outcome.product.name);
        return;
    }
    for e in &outcome.entries {
        println!(
            "{:<17} {:<24} {:>+6}  {} -> {}",
            e.kind.as_str(),
            e.location_name,
            e.delta,
            e.quantity_before,
            e.quantity_after
        );
    }
    println!(
        "{}: {} {} in stock",
        outcome.product.name,
        outcome.product.total_quantity(),
        outcome.product.unit
    );
}
