//! # Registry Commands
//!
//! Locations, categories and suppliers. Locations are addressed by id or
//! exact name; categories and suppliers likewise.

use clap::Subcommand;

use kardex_core::{Category, Supplier};
use kardex_db::NewSupplier;

use super::{done, emit};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum LocationCommand {
    /// Register a location
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List locations
    List,
    /// Rename a location (history keeps the old name)
    Rename { location: String, name: String },
    /// Delete a location that holds no stock rows
    Delete { location: String },
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Register a category
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List categories
    List,
    /// Rename a category
    Rename { category: String, name: String },
    /// Delete a category; its products keep existing uncategorized
    Delete { category: String },
}

#[derive(Debug, Subcommand)]
pub enum SupplierCommand {
    /// Register a supplier
    Add {
        name: String,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List suppliers
    List,
    /// Rename a supplier
    Rename { supplier: String, name: String },
    /// Delete a supplier; its products keep existing with no supplier
    Delete { supplier: String },
}

pub async fn location(state: &AppState, cmd: LocationCommand) -> Result<(), ApiError> {
    let registry = state.db.registry();

    match cmd {
        LocationCommand::Add { name, description } => {
            let location = registry
                .create_location(&name, description.as_deref())
                .await?;
            emit(state, &location, |l| println!("Created location {} ({})", l.name, l.id))
        }
        LocationCommand::List => {
            let locations = registry.list_locations().await?;
            emit(state, &locations, |list| {
                for l in list {
                    println!("{:<38} {}", l.id, l.name);
                }
            })
        }
        LocationCommand::Rename { location, name } => {
            let current = registry.resolve_location(&location).await?;
            registry.rename_location(&current.id, &name).await?;
            done(state, &format!("Renamed location {} to {}", current.name, name))
        }
        LocationCommand::Delete { location } => {
            let current = registry.resolve_location(&location).await?;
            registry.delete_location(&current.id).await?;
            done(state, &format!("Deleted location {}", current.name))
        }
    }
}

pub async fn category(state: &AppState, cmd: CategoryCommand) -> Result<(), ApiError> {
    let registry = state.db.registry();

    match cmd {
        CategoryCommand::Add { name, description } => {
            let category = registry
                .create_category(&name, description.as_deref())
                .await?;
            emit(state, &category, |c| println!("Created category {} ({})", c.name, c.id))
        }
        CategoryCommand::List => {
            let categories = registry.list_categories().await?;
            emit(state, &categories, |list| {
                for c in list {
                    println!("{:<38} {}", c.id, c.name);
                }
            })
        }
        CategoryCommand::Rename { category, name } => {
            let current = resolve_category(state, &category).await?;
            registry.rename_category(&current.id, &name).await?;
            done(state, &format!("Renamed category {} to {}", current.name, name))
        }
        CategoryCommand::Delete { category } => {
            let current = resolve_category(state, &category).await?;
            registry.delete_category(&current.id).await?;
            done(state, &format!("Deleted category {}", current.name))
        }
    }
}

pub async fn supplier(state: &AppState, cmd: SupplierCommand) -> Result<(), ApiError> {
    let registry = state.db.registry();

    match cmd {
        SupplierCommand::Add {
            name,
            contact,
            email,
            phone,
        } => {
            let supplier = registry
                .create_supplier(NewSupplier {
                    name,
                    contact,
                    email,
                    phone,
                })
                .await?;
            emit(state, &supplier, |s| println!("Created supplier {} ({})", s.name, s.id))
        }
        SupplierCommand::List => {
            let suppliers = registry.list_suppliers().await?;
            emit(state, &suppliers, |list| {
                for s in list {
                    println!(
                        "{:<38} {:<30} {}",
                        s.id,
                        s.name,
                        s.email.as_deref().or(s.phone.as_deref()).unwrap_or("")
                    );
                }
            })
        }
        SupplierCommand::Rename { supplier, name } => {
            let current = resolve_supplier(state, &supplier).await?;
            registry.rename_supplier(&current.id, &name).await?;
            done(state, &format!("Renamed supplier {} to {}", current.name, name))
        }
        SupplierCommand::Delete { supplier } => {
            let current = resolve_supplier(state, &supplier).await?;
            registry.delete_supplier(&current.id).await?;
            done(state, &format!("Deleted supplier {}", current.name))
        }
    }
}

/// Finds a category by id or exact name.
pub(crate) async fn resolve_category(state: &AppState, key: &str) -> Result<Category, ApiError> {
    let registry = state.db.registry();
    if let Some(category) = registry.get_category(key).await? {
        return Ok(category);
    }
    registry
        .list_categories()
        .await?
        .into_iter()
        .find(|c| c.name == key)
        .ok_or_else(|| ApiError::not_found("Category", key))
}

/// Finds a supplier by id or exact name.
pub(crate) async fn resolve_supplier(state: &AppState, key: &str) -> Result<Supplier, ApiError> {
    let registry = state.db.registry();
    if let Some(supplier) = registry.get_supplier(key).await? {
        return Ok(supplier);
    }
    registry
        .list_suppliers()
        .await?
        .into_iter()
        .find(|s| s.name == key)
        .ok_or_else(|| ApiError::not_found("Supplier", key))
}
