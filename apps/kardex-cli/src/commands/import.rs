//! # Product Import
//!
//! `kardex product import products.csv` registers many products at once.
//!
//! ## File Layout
//! ```text
//! Nome,Categoria,Unidade,EstoqueMinimo,Custo,SKU,Estoque_Loja,Estoque_Depósito_Central
//! Monitor 24,Eletrônicos,un,5,899.90,MON-24,10,4
//! ```
//!
//! - `Nome` and `Categoria` are required; the category must already exist.
//! - `Estoque_<location>` columns seed opening stock; spaces in the location
//!   name are written as `_`. Columns naming no known location are ignored.
//! - English headers (`name`, `category`, `unit`, `min_stock`, `cost`, `sku`,
//!   `supplier`, `stock_<location>`) are accepted too.
//!
//! Every row is its own `create_product` transaction, so seeded quantities
//! get their `initial_entry` ledger records. A bad row is reported and
//! skipped; the rest of the file still imports.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use csv::StringRecord;
use serde::Serialize;
use tracing::{info, warn};

use kardex_core::{Category, Location, NewProduct, Supplier};

use super::emit;
use super::product::parse_money;
use crate::error::ApiError;
use crate::state::AppState;

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
pub(crate) struct ImportLayout {
    name: Option<usize>,
    category: Option<usize>,
    unit: Option<usize>,
    min_stock: Option<usize>,
    cost: Option<usize>,
    sku: Option<usize>,
    supplier: Option<usize>,
    /// (column, location id)
    stock: Vec<(usize, String)>,
}

/// What a row needs from the registries.
pub(crate) struct Registries<'a> {
    pub categories: &'a [Category],
    pub suppliers: &'a [Supplier],
}

impl ImportLayout {
    pub fn from_headers(headers: &StringRecord, locations: &[Location]) -> Result<Self, ApiError> {
        let mut layout = ImportLayout::default();

        for (col, header) in headers.iter().enumerate() {
            let header = header.trim().trim_start_matches('\u{feff}');
            let lower = header.to_lowercase();

            let slot = match lower.as_str() {
                "nome" | "name" => &mut layout.name,
                "categoria" | "category" => &mut layout.category,
                "unidade" | "unit" => &mut layout.unit,
                "estoqueminimo" | "min_stock" => &mut layout.min_stock,
                "custo" | "cost" => &mut layout.cost,
                "sku" => &mut layout.sku,
                "fornecedor" | "supplier" => &mut layout.supplier,
                _ => {
                    if let Some(label) = stock_label(header) {
                        match locations.iter().find(|l| column_label(&l.name) == label) {
                            Some(location) => layout.stock.push((col, location.id.clone())),
                            None => warn!(column = %header, "No location for stock column, ignoring"),
                        }
                    }
                    continue;
                }
            };
            *slot = Some(col);
        }

        if layout.name.is_none() || layout.category.is_none() {
            return Err(ApiError::validation(
                "import file needs 'Nome' and 'Categoria' columns",
            ));
        }
        Ok(layout)
    }

    /// Builds the product for one row, or the reason the row is skipped.
    pub fn product(&self, row: &StringRecord, registries: &Registries<'_>) -> Result<NewProduct, String> {
        let field = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let name = field(self.name).ok_or("Nome is required")?;
        let category = field(self.category).ok_or("Categoria is required")?;
        let category_id = registries
            .categories
            .iter()
            .find(|c| c.name.to_lowercase() == category.to_lowercase())
            .map(|c| c.id.clone())
            .ok_or_else(|| format!("category '{}' not found", category))?;

        let supplier_id = match field(self.supplier) {
            Some(supplier) => Some(
                registries
                    .suppliers
                    .iter()
                    .find(|s| s.name.to_lowercase() == supplier.to_lowercase())
                    .map(|s| s.id.clone())
                    .ok_or_else(|| format!("supplier '{}' not found", supplier))?,
            ),
            None => None,
        };

        let min_stock = match field(self.min_stock) {
            Some(raw) => whole_number("EstoqueMinimo", raw)?,
            None => 0,
        };
        let unit_cost_cents = match field(self.cost) {
            Some(raw) => parse_money(raw)?,
            None => 0,
        };

        let mut initial_stock = BTreeMap::new();
        for (col, location_id) in &self.stock {
            if let Some(raw) = field(Some(*col)) {
                let quantity = whole_number("Estoque", raw)?;
                *initial_stock.entry(location_id.clone()).or_insert(0) += quantity;
            }
        }

        Ok(NewProduct {
            sku: field(self.sku).map(str::to_string),
            name: name.to_string(),
            category_id: Some(category_id),
            supplier_id,
            unit: field(self.unit).map(str::to_string),
            unit_cost_cents,
            min_stock,
            initial_stock,
        })
    }
}

fn stock_label(header: &str) -> Option<String> {
    let lower = header.to_lowercase();
    ["estoque_", "stock_"]
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .map(|prefix| lower[prefix.len()..].to_string())
}

/// A location name as written in a stock column header.
fn column_label(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

fn whole_number(column: &str, raw: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("{} '{}' is not a whole number", column, raw))
}

// =============================================================================
// Command
// =============================================================================

#[derive(Debug, Serialize)]
struct ImportedRow {
    line: u64,
    id: String,
    name: String,
    total_quantity: i64,
}

#[derive(Debug, Serialize)]
struct SkippedRow {
    line: u64,
    name: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ImportSummary {
    rows: usize,
    imported: Vec<ImportedRow>,
    skipped: Vec<SkippedRow>,
}

pub async fn import_products(state: &AppState, file: &Path) -> Result<(), ApiError> {
    let unreadable = |e: csv::Error| ApiError::validation(format!("cannot read {}: {}", file.display(), e));

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(file)
        .map_err(unreadable)?;

    let registry = state.db.registry();
    let locations = registry.list_locations().await?;
    let categories = registry.list_categories().await?;
    let suppliers = registry.list_suppliers().await?;
    let registries = Registries {
        categories: &categories,
        suppliers: &suppliers,
    };

    let headers = reader.headers().map_err(unreadable)?.clone();
    let layout = ImportLayout::from_headers(&headers, &locations)?;
    let engine = state.engine();

    let mut summary = ImportSummary {
        rows: 0,
        imported: Vec::new(),
        skipped: Vec::new(),
    };

    for record in reader.records() {
        let row = record.map_err(unreadable)?;
        let line = row.position().map_or(0, |p| p.line());
        summary.rows += 1;

        let name = layout
            .name
            .and_then(|c| row.get(c))
            .unwrap_or_default()
            .to_string();

        let created = match layout.product(&row, &registries) {
            Ok(new) => engine
                .create_product(new, &state.actor)
                .await
                .map_err(|e| ApiError::from(e).message),
            Err(reason) => Err(reason),
        };

        match created {
            Ok(outcome) => summary.imported.push(ImportedRow {
                line,
                id: outcome.product.id.clone(),
                name: outcome.product.name.clone(),
                total_quantity: outcome.product.total_quantity(),
            }),
            Err(reason) => {
                warn!(line, name = %name, reason = %reason, "Skipping import row");
                summary.skipped.push(SkippedRow { line, name, reason });
            }
        }
    }

    info!(
        rows = summary.rows,
        imported = summary.imported.len(),
        skipped = summary.skipped.len(),
        "Product import finished"
    );

    emit(state, &summary, |s| {
        for row in &s.skipped {
            println!("  line {:>4} skipped ({}): {}", row.line, row.name, row.reason);
        }
        println!("{} of {} products imported", s.imported.len(), s.rows);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn location(id: &str, name: &str) -> Location {
        Location {
            id: id.to_string(),
            tenant_id: "t".to_string(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.to_string(),
            tenant_id: "t".to_string(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn read(csv_text: &str) -> (StringRecord, Vec<StringRecord>) {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let rows = reader.records().map(|r| r.unwrap()).collect();
        (headers, rows)
    }

    #[test]
    fn test_stock_columns_match_location_names() {
        let locations = vec![location("L1", "Loja"), location("L2", "Depósito Central")];
        let categories = vec![category("C1", "Eletrônicos")];
        let registries = Registries {
            categories: &categories,
            suppliers: &[],
        };
        let (headers, rows) = read(
            "\u{feff}Nome,Categoria,Unidade,EstoqueMinimo,Custo,Estoque_Loja,Estoque_Depósito_Central,Estoque_Vitrine\n\
             Monitor 24,eletrônicos,un,5,\"899,90\",10,4,7\n",
        );

        let layout = ImportLayout::from_headers(&headers, &locations).unwrap();
        let product = layout.product(&rows[0], &registries).unwrap();

        assert_eq!(product.name, "Monitor 24");
        assert_eq!(product.category_id.as_deref(), Some("C1"));
        assert_eq!(product.min_stock, 5);
        assert_eq!(product.unit_cost_cents, 89_990);
        assert_eq!(
            product.initial_stock,
            BTreeMap::from([("L1".to_string(), 10), ("L2".to_string(), 4)])
        );
    }

    #[test]
    fn test_rows_without_required_fields_are_skipped() {
        let categories = vec![category("C1", "Ferragens")];
        let registries = Registries {
            categories: &categories,
            suppliers: &[],
        };
        let (headers, rows) = read(
            "name,category,stock_Loja\n\
             ,Ferragens,1\n\
             Parafuso,,1\n\
             Prego,Madeira,1\n\
             Broca,Ferragens,x\n",
        );
        let layout = ImportLayout::from_headers(&headers, &[location("L1", "Loja")]).unwrap();

        let reasons: Vec<String> = rows
            .iter()
            .map(|r| layout.product(r, &registries).unwrap_err())
            .collect();
        assert!(reasons[0].contains("Nome"));
        assert!(reasons[1].contains("Categoria"));
        assert!(reasons[2].contains("Madeira"));
        assert!(reasons[3].contains("whole number"));
    }

    #[test]
    fn test_header_without_name_is_rejected() {
        let (headers, _) = read("Categoria,Estoque_Loja\n");
        assert!(ImportLayout::from_headers(&headers, &[]).is_err());
    }
}
