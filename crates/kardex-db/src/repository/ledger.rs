//! # Ledger Repository
//!
//! The kardex is append-only: this module can insert and read entries, and
//! the schema's triggers reject any UPDATE or DELETE on `ledger_entries`.
//! `seq` (an AUTOINCREMENT rowid) gives commit order; reads are sorted by it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;

use kardex_core::LedgerEntry;

use crate::error::DbResult;

const ENTRY_COLUMNS: &str = "id, tenant_id, product_id, product_name, location_id, location_name, \
     kind, delta, quantity_before, quantity_after, counterpart_location_id, \
     user_id, user_name, reason, count_session_id, created_at";

/// Appends one entry.
pub(crate) async fn insert_entry(conn: &mut SqliteConnection, entry: &LedgerEntry) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, tenant_id, product_id, product_name, location_id, location_name,
            kind, delta, quantity_before, quantity_after, counterpart_location_id,
            user_id, user_name, reason, count_session_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.product_id)
    .bind(&entry.product_name)
    .bind(&entry.location_id)
    .bind(&entry.location_name)
    .bind(entry.kind)
    .bind(entry.delta)
    .bind(entry.quantity_before)
    .bind(entry.quantity_after)
    .bind(&entry.counterpart_location_id)
    .bind(&entry.user_id)
    .bind(&entry.user_name)
    .bind(&entry.reason)
    .bind(&entry.count_session_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Read access to the kardex.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        LedgerRepository { pool, tenant_id }
    }

    /// History of one product, oldest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE tenant_id = ?1 AND product_id = ?2 ORDER BY seq",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as(&sql)
            .bind(&self.tenant_id)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Every entry of the tenant in commit order.
    pub async fn list_all(&self) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE tenant_id = ?1 ORDER BY seq",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as(&sql)
            .bind(&self.tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Entries created at or after `since`, in commit order.
    pub async fn list_since(&self, since: DateTime<Utc>) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE tenant_id = ?1 AND created_at >= ?2 ORDER BY seq",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as(&sql)
            .bind(&self.tenant_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Adjustments written by one count session.
    pub async fn list_for_session(&self, session_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE tenant_id = ?1 AND count_session_id = ?2 ORDER BY seq",
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as(&sql)
            .bind(&self.tenant_id)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE tenant_id = ?1")
                .bind(&self.tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use kardex_core::{Actor, MovementKind, NewProduct};

    #[tokio::test]
    async fn test_history_is_in_commit_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let loc = db.registry().create_location("Loja", None).await.unwrap().id;
        let actor = Actor::new("u1", "Ana");
        let engine = db.engine();

        let product = engine
            .create_product(
                NewProduct {
                    name: "Caneta".into(),
                    initial_stock: [(loc.clone(), 10)].into(),
                    ..Default::default()
                },
                &actor,
            )
            .await
            .unwrap()
            .product;
        engine.apply_exit(&product.id, &loc, 3, None, &actor).await.unwrap();
        engine.apply_entry(&product.id, &loc, 5, Some("reposição"), &actor).await.unwrap();

        let history = db.ledger().list_for_product(&product.id).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MovementKind::InitialEntry,
                MovementKind::Exit,
                MovementKind::ManualAdjustment
            ]
        );
        assert_eq!(history[2].quantity_before, 7);
        assert_eq!(history[2].quantity_after, 12);
        assert_eq!(history[2].reason.as_deref(), Some("reposição"));
        assert_eq!(history[2].user_name, "Ana");
        assert!(history.iter().all(|e| e.is_consistent()));
    }

    #[tokio::test]
    async fn test_entries_cannot_be_updated_or_deleted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let loc = db.registry().create_location("Loja", None).await.unwrap().id;
        db.engine()
            .create_product(
                NewProduct {
                    name: "Caneta".into(),
                    initial_stock: [(loc, 1)].into(),
                    ..Default::default()
                },
                &Actor::system(),
            )
            .await
            .unwrap();

        let update = sqlx::query("UPDATE ledger_entries SET delta = 99")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM ledger_entries")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(delete.is_err());

        assert_eq!(db.ledger().count().await.unwrap(), 1);
    }
}
