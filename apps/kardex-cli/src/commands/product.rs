//! # Product Commands
//!
//! Products are addressed by id or SKU. Quantities are never edited here;
//! `product add --stock LOC=QTY` seeds them through the engine, everything
//! after that goes through `stock`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use kardex_core::{NewProduct, Product, ProductDetails, StockStatus};

use super::registry::{resolve_category, resolve_supplier};
use super::{done, emit};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Register a product, optionally with opening stock
    Add(AddArgs),
    /// List products with their totals
    List,
    /// Show one product with its per-location quantities
    Show { product: String },
    /// Edit descriptive fields (not quantities)
    Edit(EditArgs),
    /// Delete a product; its ledger history is kept
    Delete { product: String },
    /// Products at or below their minimum stock
    LowStock,
    /// Register products from a CSV file (Nome, Categoria, Estoque_<location>, ...)
    Import { file: PathBuf },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub name: String,
    #[arg(long)]
    pub sku: Option<String>,
    /// Category id or name
    #[arg(long)]
    pub category: Option<String>,
    /// Supplier id or name
    #[arg(long)]
    pub supplier: Option<String>,
    /// Unit of measure (default "un")
    #[arg(long)]
    pub unit: Option<String>,
    /// Unit cost, e.g. 12.50
    #[arg(long, value_parser = parse_money, default_value = "0")]
    pub cost: i64,
    #[arg(long, default_value_t = 0)]
    pub min_stock: i64,
    /// Opening stock as LOCATION=QTY (location id or name); repeatable
    #[arg(long = "stock", value_parser = parse_stock_pair)]
    pub stock: Vec<(String, i64)>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub product: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub sku: Option<String>,
    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<String>,
    #[arg(long)]
    pub clear_category: bool,
    #[arg(long, conflicts_with = "clear_supplier")]
    pub supplier: Option<String>,
    #[arg(long)]
    pub clear_supplier: bool,
    #[arg(long)]
    pub unit: Option<String>,
    #[arg(long, value_parser = parse_money)]
    pub cost: Option<i64>,
    #[arg(long)]
    pub min_stock: Option<i64>,
}

/// A product with its derived figures, as printed.
#[derive(Debug, Serialize)]
pub(crate) struct ProductView<'a> {
    #[serde(flatten)]
    pub product: &'a Product,
    pub total_quantity: i64,
    pub status: StockStatus,
}

impl<'a> ProductView<'a> {
    pub fn new(product: &'a Product) -> Self {
        ProductView {
            product,
            total_quantity: product.total_quantity(),
            status: product.stock_status(),
        }
    }
}

pub async fn run(state: &AppState, cmd: ProductCommand) -> Result<(), ApiError> {
    match cmd {
        ProductCommand::Add(args) => add(state, args).await,
        ProductCommand::List => {
            let products = state.db.products().list().await?;
            print_list(state, &products)
        }
        ProductCommand::Show { product } => {
            let product = state.db.products().resolve(&product).await?;
            let names = location_names(state).await?;
            emit(state, &ProductView::new(&product), |view| {
                print_product(view.product, &names)
            })
        }
        ProductCommand::Edit(args) => edit(state, args).await,
        ProductCommand::Delete { product } => {
            let product = state.db.products().resolve(&product).await?;
            state.engine().delete_product(&product.id).await?;
            done(state, &format!("Deleted product {}", product.name))
        }
        ProductCommand::LowStock => {
            let products = state.db.products().list_low_stock().await?;
            print_list(state, &products)
        }
        ProductCommand::Import { file } => super::import::import_products(state, &file).await,
    }
}

async fn add(state: &AppState, args: AddArgs) -> Result<(), ApiError> {
    let category_id = match args.category {
        Some(key) => Some(resolve_category(state, &key).await?.id),
        None => None,
    };
    let supplier_id = match args.supplier {
        Some(key) => Some(resolve_supplier(state, &key).await?.id),
        None => None,
    };

    let registry = state.db.registry();
    let mut initial_stock = BTreeMap::new();
    for (location, quantity) in args.stock {
        let location = registry.resolve_location(&location).await?;
        *initial_stock.entry(location.id).or_insert(0) += quantity;
    }

    let outcome = state
        .engine()
        .create_product(
            NewProduct {
                sku: args.sku,
                name: args.name,
                category_id,
                supplier_id,
                unit: args.unit,
                unit_cost_cents: args.cost,
                min_stock: args.min_stock,
                initial_stock,
            },
            &state.actor,
        )
        .await?;

    emit(state, &outcome, |o| {
        println!(
            "Created product {} ({}), {} {} in stock",
            o.product.name,
            o.product.id,
            o.product.total_quantity(),
            o.product.unit
        )
    })
}

async fn edit(state: &AppState, args: EditArgs) -> Result<(), ApiError> {
    let product = state.db.products().resolve(&args.product).await?;
    let mut details = ProductDetails::from(&product);

    if let Some(name) = args.name {
        details.name = name;
    }
    if let Some(sku) = args.sku {
        details.sku = Some(sku);
    }
    if args.clear_category {
        details.category_id = None;
    } else if let Some(key) = args.category {
        details.category_id = Some(resolve_category(state, &key).await?.id);
    }
    if args.clear_supplier {
        details.supplier_id = None;
    } else if let Some(key) = args.supplier {
        details.supplier_id = Some(resolve_supplier(state, &key).await?.id);
    }
    if let Some(unit) = args.unit {
        details.unit = unit;
    }
    if let Some(cost) = args.cost {
        details.unit_cost_cents = cost;
    }
    if let Some(min_stock) = args.min_stock {
        details.min_stock = min_stock;
    }

    let updated = state
        .engine()
        .update_product_details(&product.id, &details)
        .await?;
    emit(state, &ProductView::new(&updated), |view| {
        println!("Updated product {} (version {})", view.product.name, view.product.version)
    })
}

fn print_list(state: &AppState, products: &[Product]) -> Result<(), ApiError> {
    let views: Vec<ProductView<'_>> = products.iter().map(ProductView::new).collect();
    emit(state, &views, |list| {
        for v in list {
            println!(
                "{:<38} {:<14} {:<32} {:>8} {:<4} {:?}",
                v.product.id,
                v.product.sku.as_deref().unwrap_or("-"),
                v.product.name,
                v.total_quantity,
                v.product.unit,
                v.status
            );
        }
    })
}

fn print_product(product: &Product, names: &HashMap<String, String>) {
    println!("{} ({})", product.name, product.id);
    if let Some(sku) = &product.sku {
        println!("  SKU:        {}", sku);
    }
    println!("  Unit cost:  {}", product.unit_cost());
    println!("  Min stock:  {}", product.min_stock);
    println!("  Version:    {}", product.version);
    println!("  Status:     {:?}", product.stock_status());
    for (location_id, quantity) in &product.locations {
        let name = names.get(location_id).map(String::as_str).unwrap_or(location_id.as_str());
        println!("    {:<24} {:>8}", name, quantity);
    }
    println!("  Total:      {} {}", product.total_quantity(), product.unit);
}

/// Location id to name, for display.
pub(crate) async fn location_names(state: &AppState) -> Result<HashMap<String, String>, ApiError> {
    Ok(state
        .db
        .registry()
        .list_locations()
        .await?
        .into_iter()
        .map(|l| (l.id, l.name))
        .collect())
}

// =============================================================================
// Argument Parsers
// =============================================================================

/// Parses a decimal amount ("12", "12.5", "12,50") into cents.
pub fn parse_money(raw: &str) -> Result<i64, String> {
    let raw = raw.trim().replace(',', ".");
    let (major, minor) = match raw.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (raw.as_str(), ""),
    };

    if minor.len() > 2 {
        return Err(format!("'{}' has more than two decimal places", raw));
    }
    let major: i64 = major
        .parse()
        .map_err(|_| format!("'{}' is not an amount", raw))?;
    if major < 0 {
        return Err("amount cannot be negative".to_string());
    }
    let minor: i64 = if minor.is_empty() {
        0
    } else {
        let padded = format!("{:0<2}", minor);
        padded
            .parse()
            .map_err(|_| format!("'{}' is not an amount", raw))?
    };

    major
        .checked_mul(100)
        .and_then(|c| c.checked_add(minor))
        .ok_or_else(|| format!("'{}' is too large", raw))
}

/// Parses `LOCATION=QTY`.
pub fn parse_stock_pair(raw: &str) -> Result<(String, i64), String> {
    let (location, quantity) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected LOCATION=QTY, got '{}'", raw))?;
    let location = location.trim();
    if location.is_empty() {
        return Err(format!("missing location in '{}'", raw));
    }
    let quantity: i64 = quantity
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a whole quantity", quantity))?;
    Ok((location.to_string(), quantity))
}
