//! # Product Repository
//!
//! Reads of the product aggregate, plus the row-level writes the stock
//! engine performs inside its transactions.
//!
//! ## Storage Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                          product_locations                    │
//! │  ┌──────┬──────────┬─────────┐     ┌──────┬──────────┬──────────┐      │
//! │  │ id   │ name     │ version │     │ p_id │ location │ quantity │      │
//! │  ├──────┼──────────┼─────────┤     ├──────┼──────────┼──────────┤      │
//! │  │ p1   │ Cabo HDMI│ 7       │◄────│ p1   │ L1       │ 4        │      │
//! │  └──────┴──────────┴─────────┘     │ p1   │ L2       │ 0        │      │
//! │                                    └──────┴──────────┴──────────┘      │
//! │                                                                         │
//! │  Product.locations = {L1: 4, L2: 0}     total_quantity() = 4 (on read) │
//! │                                                                         │
//! │  A row with quantity 0 means "stocked here before": the next entry at  │
//! │  L2 is a manual_adjustment, not an initial_entry.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write to a product's location rows goes together with a
//! `version = version + 1` guarded by the version that was read.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use kardex_core::aggregate;
use kardex_core::{Product, ProductDetails};

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, tenant_id, sku, name, category_id, supplier_id, unit, \
     unit_cost_cents, min_stock, version, created_at, updated_at";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    tenant_id: String,
    sku: Option<String>,
    name: String,
    category_id: Option<String>,
    supplier_id: Option<String>,
    unit: String,
    unit_cost_cents: i64,
    min_stock: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, locations: BTreeMap<String, i64>) -> Product {
        Product {
            id: self.id,
            tenant_id: self.tenant_id,
            sku: self.sku,
            name: self.name,
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            unit: self.unit,
            unit_cost_cents: self.unit_cost_cents,
            min_stock: self.min_stock,
            locations,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LocationQuantityRow {
    product_id: String,
    location_id: String,
    quantity: i64,
}

// =============================================================================
// Transaction-scoped Operations
// =============================================================================

/// Loads one product with its location quantities.
pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE id = ?1 AND tenant_id = ?2",
        PRODUCT_COLUMNS
    );
    let row: Option<ProductRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let quantities: Vec<LocationQuantityRow> = sqlx::query_as(
        "SELECT product_id, location_id, quantity FROM product_locations WHERE product_id = ?1",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let locations = quantities
        .into_iter()
        .map(|q| (q.location_id, q.quantity))
        .collect();

    Ok(Some(row.into_product(locations)))
}

/// Loads every product of a tenant, ordered by name.
pub(crate) async fn fetch_products(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> DbResult<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE tenant_id = ?1 ORDER BY name, id",
        PRODUCT_COLUMNS
    );
    let rows: Vec<ProductRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    let quantities: Vec<LocationQuantityRow> = sqlx::query_as(
        r#"
        SELECT pl.product_id, pl.location_id, pl.quantity
        FROM product_locations pl
        INNER JOIN products p ON p.id = pl.product_id
        WHERE p.tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_product: HashMap<String, BTreeMap<String, i64>> = HashMap::new();
    for q in quantities {
        by_product
            .entry(q.product_id)
            .or_default()
            .insert(q.location_id, q.quantity);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let locations = by_product.remove(&row.id).unwrap_or_default();
            row.into_product(locations)
        })
        .collect())
}

/// Inserts a product row and its location rows.
pub(crate) async fn insert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, tenant_id, sku, name, category_id, supplier_id, unit,
            unit_cost_cents, min_stock, version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&product.id)
    .bind(&product.tenant_id)
    .bind(&product.sku)
    .bind(&product.name)
    .bind(&product.category_id)
    .bind(&product.supplier_id)
    .bind(&product.unit)
    .bind(product.unit_cost_cents)
    .bind(product.min_stock)
    .bind(product.version)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: product.sku.clone().unwrap_or_default(),
        },
        other => other,
    })?;

    let touched = product
        .locations
        .iter()
        .map(|(id, qty)| (id.as_str(), *qty))
        .collect();
    write_locations(conn, &product.id, &touched).await
}

/// Claims the next version of a product.
///
/// Fails with [`DbError::StaleVersion`] when another transaction committed
/// since `product` was read.
pub(crate) async fn bump_version(
    conn: &mut SqliteConnection,
    product: &Product,
    at: DateTime<Utc>,
) -> DbResult<i64> {
    let result = sqlx::query(
        "UPDATE products SET version = version + 1, updated_at = ?1 WHERE id = ?2 AND version = ?3",
    )
    .bind(at)
    .bind(&product.id)
    .bind(product.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::StaleVersion {
            entity: "Product".to_string(),
            id: product.id.clone(),
        });
    }

    Ok(product.version + 1)
}

/// Upserts the final quantity of each touched location.
pub(crate) async fn write_locations(
    conn: &mut SqliteConnection,
    product_id: &str,
    touched: &BTreeMap<&str, i64>,
) -> DbResult<()> {
    for (location_id, quantity) in touched {
        sqlx::query(
            r#"
            INSERT INTO product_locations (product_id, location_id, quantity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (product_id, location_id) DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(product_id)
        .bind(*location_id)
        .bind(*quantity)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Rewrites the descriptive fields of a product. Quantities are untouched.
pub(crate) async fn update_details(
    conn: &mut SqliteConnection,
    product: &Product,
    details: &ProductDetails,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            sku = ?1,
            name = ?2,
            category_id = ?3,
            supplier_id = ?4,
            unit = ?5,
            unit_cost_cents = ?6,
            min_stock = ?7,
            version = version + 1,
            updated_at = ?8
        WHERE id = ?9 AND version = ?10
        "#,
    )
    .bind(&details.sku)
    .bind(&details.name)
    .bind(&details.category_id)
    .bind(&details.supplier_id)
    .bind(&details.unit)
    .bind(details.unit_cost_cents)
    .bind(details.min_stock)
    .bind(at)
    .bind(&product.id)
    .bind(product.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::StaleVersion {
            entity: "Product".to_string(),
            id: product.id.clone(),
        });
    }
    Ok(())
}

/// Deletes a product and, by cascade, its location rows.
pub(crate) async fn delete_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?1 AND tenant_id = ?2")
        .bind(id)
        .bind(tenant_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to products.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().get_by_id("uuid-here").await?;
/// let alerts = db.products().list_low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        ProductRepository { pool, tenant_id }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, &self.tenant_id, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM products WHERE sku = ?1 AND tenant_id = ?2")
                .bind(sku)
                .bind(&self.tenant_id)
                .fetch_optional(&mut *conn)
                .await?;

        match id {
            Some(id) => fetch_product(&mut conn, &self.tenant_id, &id).await,
            None => Ok(None),
        }
    }

    /// Looks a product up by id, falling back to SKU.
    pub async fn resolve(&self, key: &str) -> DbResult<Product> {
        if let Some(product) = self.get_by_id(key).await? {
            return Ok(product);
        }
        self.get_by_sku(key)
            .await?
            .ok_or_else(|| DbError::not_found("Product", key))
    }

    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let products = fetch_products(&mut conn, &self.tenant_id).await?;
        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Products at or below their minimum stock (`min_stock > 0` only).
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let products = self.list().await?;
        Ok(aggregate::low_stock(&products)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE tenant_id = ?1")
            .bind(&self.tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
