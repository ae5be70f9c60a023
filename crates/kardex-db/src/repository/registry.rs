//! # Registry Repository
//!
//! Reference data: locations, categories, suppliers.
//!
//! Ledger entries copy the location *name* at write time, so renaming a
//! location never rewrites history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use kardex_core::validation::validate_name;
use kardex_core::{Category, Location, Supplier};

use crate::error::{DbError, DbResult};

/// Resolves location ids to names, failing on the first unknown id.
pub(crate) async fn location_names(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    ids: &[&str],
) -> DbResult<HashMap<String, String>> {
    let mut names = HashMap::new();

    for &id in ids {
        if names.contains_key(id) {
            continue;
        }
        let name: Option<String> =
            sqlx::query_scalar("SELECT name FROM locations WHERE id = ?1 AND tenant_id = ?2")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&mut *conn)
                .await?;
        let name = name.ok_or_else(|| DbError::not_found("Location", id))?;
        names.insert(id.to_string(), name);
    }

    Ok(names)
}

/// Contact fields for a new supplier.
#[derive(Debug, Clone, Default)]
pub struct NewSupplier {
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistryRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl RegistryRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        RegistryRepository { pool, tenant_id }
    }

    // =========================================================================
    // Locations
    // =========================================================================

    pub async fn create_location(&self, name: &str, description: Option<&str>) -> DbResult<Location> {
        validate_name("name", name)?;

        let location = Location {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        self.insert_described(
            "locations",
            &location.id,
            &location.name,
            &location.description,
            location.created_at,
        )
        .await?;

        info!(id = %location.id, name = %location.name, "Location created");
        Ok(location)
    }

    pub async fn list_locations(&self) -> DbResult<Vec<Location>> {
        self.list("locations").await
    }

    pub async fn get_location(&self, id: &str) -> DbResult<Option<Location>> {
        self.get("locations", id).await
    }

    /// Looks a location up by id, falling back to an exact name match.
    pub async fn resolve_location(&self, key: &str) -> DbResult<Location> {
        if let Some(location) = self.get_location(key).await? {
            return Ok(location);
        }
        let location: Option<Location> = sqlx::query_as(
            "SELECT id, tenant_id, name, description, created_at FROM locations \
             WHERE name = ?1 AND tenant_id = ?2",
        )
        .bind(key)
        .bind(&self.tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        location.ok_or_else(|| DbError::not_found("Location", key))
    }

    pub async fn rename_location(&self, id: &str, name: &str) -> DbResult<()> {
        self.rename("locations", "Location", id, name).await
    }

    /// Fails with a foreign key violation while any product has a row there.
    pub async fn delete_location(&self, id: &str) -> DbResult<()> {
        self.delete("locations", "Location", id).await
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn create_category(&self, name: &str, description: Option<&str>) -> DbResult<Category> {
        validate_name("name", name)?;

        let category = Category {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        self.insert_described(
            "categories",
            &category.id,
            &category.name,
            &category.description,
            category.created_at,
        )
        .await?;

        info!(id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        self.list("categories").await
    }

    pub async fn get_category(&self, id: &str) -> DbResult<Option<Category>> {
        self.get("categories", id).await
    }

    pub async fn rename_category(&self, id: &str, name: &str) -> DbResult<()> {
        self.rename("categories", "Category", id, name).await
    }

    /// Products in the category keep existing with no category.
    pub async fn delete_category(&self, id: &str) -> DbResult<()> {
        self.delete("categories", "Category", id).await
    }

    // =========================================================================
    // Suppliers
    // =========================================================================

    pub async fn create_supplier(&self, new: NewSupplier) -> DbResult<Supplier> {
        validate_name("name", &new.name)?;

        let supplier = Supplier {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            name: new.name.trim().to_string(),
            contact: new.contact,
            email: new.email,
            phone: new.phone,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO suppliers (id, tenant_id, name, contact, email, phone, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.tenant_id)
        .bind(&supplier.name)
        .bind(&supplier.contact)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(supplier.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| with_value(e, &supplier.name))?;

        info!(id = %supplier.id, name = %supplier.name, "Supplier created");
        Ok(supplier)
    }

    pub async fn list_suppliers(&self) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as(
            "SELECT id, tenant_id, name, contact, email, phone, created_at FROM suppliers \
             WHERE tenant_id = ?1 ORDER BY name",
        )
        .bind(&self.tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(suppliers)
    }

    pub async fn get_supplier(&self, id: &str) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as(
            "SELECT id, tenant_id, name, contact, email, phone, created_at FROM suppliers \
             WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(&self.tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(supplier)
    }

    pub async fn rename_supplier(&self, id: &str, name: &str) -> DbResult<()> {
        self.rename("suppliers", "Supplier", id, name).await
    }

    pub async fn delete_supplier(&self, id: &str) -> DbResult<()> {
        self.delete("suppliers", "Supplier", id).await
    }

    // =========================================================================
    // Shared
    // =========================================================================

    // `table` is always one of the literals above, never caller input.

    async fn insert_described(
        &self,
        table: &str,
        id: &str,
        name: &str,
        description: &Option<String>,
        created_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, tenant_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            table
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(&self.tenant_id)
            .bind(name)
            .bind(description)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| with_value(e, name))?;
        Ok(())
    }

    async fn list<T>(&self, table: &str) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT id, tenant_id, name, description, created_at FROM {} \
             WHERE tenant_id = ?1 ORDER BY name",
            table
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(&self.tenant_id)
            .fetch_all(&self.pool)
            .await?;
        debug!(table, count = rows.len(), "Listed registry entries");
        Ok(rows)
    }

    async fn get<T>(&self, table: &str, id: &str) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT id, tenant_id, name, description, created_at FROM {} \
             WHERE id = ?1 AND tenant_id = ?2",
            table
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .bind(&self.tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn rename(&self, table: &str, entity: &str, id: &str, name: &str) -> DbResult<()> {
        validate_name("name", name)?;

        let sql = format!(
            "UPDATE {} SET name = ?1 WHERE id = ?2 AND tenant_id = ?3",
            table
        );
        let result = sqlx::query(&sql)
            .bind(name.trim())
            .bind(id)
            .bind(&self.tenant_id)
            .execute(&self.pool)
            .await
            .map_err(|e| with_value(e, name))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(entity, id));
        }
        Ok(())
    }

    async fn delete(&self, table: &str, entity: &str, id: &str) -> DbResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1 AND tenant_id = ?2", table);
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&self.tenant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(entity, id));
        }
        info!(entity, id, "Registry entry deleted");
        Ok(())
    }
}

/// Fills in the offending value of a unique violation.
fn with_value(err: sqlx::Error, value: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, value),
        other => other,
    }
}
