//! # Seed Data Generator
//!
//! Populates a database with demo inventory for development.
//!
//! ## Usage
//! ```bash
//! # 200 products (default)
//! cargo run -p kardex-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p kardex-db --bin seed -- --count 1000 --db ./data/kardex.db
//! ```
//!
//! ## Generated Data
//! - Locations: Loja, Depósito, Vitrine
//! - Categories: Ferragens, Elétrica, Hidráulica, Pintura
//! - One supplier per category
//! - Products spread over the categories, each with opening stock in one or
//!   two locations and a few sales, so reports have history to work with

use std::collections::BTreeMap;

use clap::Parser;

use kardex_core::{Actor, NewProduct};
use kardex_db::{Database, DbConfig, NewSupplier};

const LOCATIONS: &[&str] = &["Loja", "Depósito", "Vitrine"];

const CATEGORIES: &[(&str, &str, &[&str])] = &[
    (
        "FER",
        "Ferragens",
        &["Parafuso M6", "Parafuso M8", "Porca M6", "Arruela", "Prego 18x27", "Dobradiça"],
    ),
    (
        "ELE",
        "Elétrica",
        &["Cabo 2,5mm", "Tomada 10A", "Interruptor", "Disjuntor 20A", "Fita Isolante"],
    ),
    (
        "HID",
        "Hidráulica",
        &["Cano PVC 25mm", "Joelho 90", "Registro", "Torneira", "Veda Rosca"],
    ),
    (
        "PIN",
        "Pintura",
        &["Tinta Acrílica", "Rolo de Lã", "Pincel 2\"", "Lixa 120", "Massa Corrida"],
    ),
];

const UNITS: &[&str] = &["un", "cx", "m", "kg"];

/// Kardex seed data generator
#[derive(Debug, Parser)]
#[command(name = "seed", about = "Populates a database with demo inventory")]
struct SeedArgs {
    /// Number of products to generate
    #[arg(short, long, default_value_t = 200)]
    count: usize,

    /// Database file path
    #[arg(short, long = "db", default_value = "./kardex_dev.db")]
    db_path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let SeedArgs { count, db_path } = SeedArgs::parse();

    println!("Kardex Seed Data Generator");
    println!("==========================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let registry = db.registry();
    let mut locations = Vec::new();
    for name in LOCATIONS {
        locations.push(registry.create_location(name, None).await?.id);
    }

    let actor = Actor::new("seed", "Seed");
    let engine = db.engine();
    let start = std::time::Instant::now();
    let mut generated = 0;

    'categories: for (code, category_name, names) in CATEGORIES {
        let category = registry.create_category(category_name, None).await?;
        let supplier = registry
            .create_supplier(NewSupplier {
                name: format!("Distribuidora {}", category_name),
                ..Default::default()
            })
            .await?;

        let mut batch = 0;
        loop {
            for name in names.iter() {
                if generated >= count {
                    break 'categories;
                }
                let seed = generated;
                let new = generate_product(
                    code,
                    name,
                    batch,
                    seed,
                    &locations,
                    &category.id,
                    &supplier.id,
                );

                let outcome = match engine.create_product(new, &actor).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        eprintln!("Failed to insert {}: {}", name, e);
                        continue;
                    }
                };

                // A few sales, so movement reports are not empty.
                let product = outcome.product;
                if let Some(main) = product.main_location().map(str::to_string) {
                    let sold = (seed % 4) as i64;
                    if sold > 0 && product.quantity_at(&main) >= sold {
                        engine
                            .apply_exit(&product.id, &main, sold, Some("venda"), &actor)
                            .await?;
                    }
                }

                generated += 1;
                if generated % 50 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
            batch += 1;
            if batch * names.len() >= count / CATEGORIES.len() + 1 {
                break;
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products in {:?}", generated, elapsed);
    println!("  Ledger entries: {}", db.ledger().count().await?);
    println!("  Low stock: {}", db.products().list_low_stock().await?.len());
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one product with deterministic pseudo-random data.
fn generate_product(
    code: &str,
    name: &str,
    batch: usize,
    seed: usize,
    locations: &[String],
    category_id: &str,
    supplier_id: &str,
) -> NewProduct {
    let full_name = if batch == 0 {
        name.to_string()
    } else {
        format!("{} Lote {}", name, batch + 1)
    };

    let mut initial_stock = BTreeMap::new();
    let first = &locations[seed % locations.len()];
    initial_stock.insert(first.clone(), ((seed * 7) % 60) as i64);
    if seed % 3 == 0 {
        let second = &locations[(seed + 1) % locations.len()];
        initial_stock.insert(second.clone(), ((seed * 11) % 25) as i64);
    }

    NewProduct {
        sku: Some(format!("{}-{:04}", code, seed)),
        name: full_name,
        category_id: Some(category_id.to_string()),
        supplier_id: Some(supplier_id.to_string()),
        unit: Some(UNITS[seed % UNITS.len()].to_string()),
        // R$0,50 - R$80,00
        unit_cost_cents: 50 + ((seed * 37) % 7950) as i64,
        min_stock: (seed % 10) as i64,
        initial_stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        SeedArgs::command().debug_assert();
    }

    #[test]
    fn test_args_defaults_and_errors() {
        let args = SeedArgs::try_parse_from(["seed"]).unwrap();
        assert_eq!(args.count, 200);
        assert_eq!(args.db_path, "./kardex_dev.db");

        let args = SeedArgs::try_parse_from(["seed", "-c", "15", "--db", "/tmp/k.db"]).unwrap();
        assert_eq!((args.count, args.db_path.as_str()), (15, "/tmp/k.db"));

        assert!(SeedArgs::try_parse_from(["seed", "--count", "many"]).is_err());
    }
}
