//! # Count Session Repository
//!
//! Persistence for physical count sessions and their lines. State
//! transitions are decided by [`kardex_core::CountSession`]; this module only
//! stores the result. Status writes are guarded by the status that was read,
//! so two racing transitions cannot both succeed.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, SqlitePool};

use kardex_core::{CountLine, CountSession, CountStatus};

use crate::error::{DbError, DbResult};

const SESSION_COLUMNS: &str = "id, tenant_id, status, created_by, created_by_name, created_at, \
     completed_at, applied_by, applied_at";

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    tenant_id: String,
    status: CountStatus,
    created_by: String,
    created_by_name: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    applied_by: Option<String>,
    applied_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn into_session(self, lines: Vec<CountLine>) -> CountSession {
        CountSession {
            id: self.id,
            tenant_id: self.tenant_id,
            status: self.status,
            created_by: self.created_by,
            created_by_name: self.created_by_name,
            created_at: self.created_at,
            completed_at: self.completed_at,
            applied_by: self.applied_by,
            applied_at: self.applied_at,
            lines,
        }
    }
}

async fn fetch_lines(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Vec<CountLine>> {
    let lines = sqlx::query_as(
        r#"
        SELECT product_id, product_name, expected_quantity, counted_quantity
        FROM count_lines
        WHERE session_id = ?1
        ORDER BY position
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(lines)
}

pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<CountSession>> {
    let sql = format!(
        "SELECT {} FROM count_sessions WHERE id = ?1 AND tenant_id = ?2",
        SESSION_COLUMNS
    );
    let row: Option<SessionRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let lines = fetch_lines(conn, &row.id).await?;
            Ok(Some(row.into_session(lines)))
        }
        None => Ok(None),
    }
}

/// Like [`fetch_session`], but a missing session is an error.
pub(crate) async fn require_session(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<CountSession> {
    fetch_session(conn, tenant_id, id)
        .await?
        .ok_or_else(|| DbError::not_found("CountSession", id))
}

pub(crate) async fn insert_session(
    conn: &mut SqliteConnection,
    session: &CountSession,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO count_sessions (
            id, tenant_id, status, created_by, created_by_name, created_at,
            completed_at, applied_by, applied_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&session.id)
    .bind(&session.tenant_id)
    .bind(session.status)
    .bind(&session.created_by)
    .bind(&session.created_by_name)
    .bind(session.created_at)
    .bind(session.completed_at)
    .bind(&session.applied_by)
    .bind(session.applied_at)
    .execute(&mut *conn)
    .await?;

    for (position, line) in session.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO count_lines (
                session_id, position, product_id, product_name,
                expected_quantity, counted_quantity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&session.id)
        .bind(position as i64)
        .bind(&line.product_id)
        .bind(&line.product_name)
        .bind(line.expected_quantity)
        .bind(line.counted_quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Stores the counted quantities of every line.
pub(crate) async fn save_lines(conn: &mut SqliteConnection, session: &CountSession) -> DbResult<()> {
    for line in &session.lines {
        sqlx::query(
            "UPDATE count_lines SET counted_quantity = ?1 WHERE session_id = ?2 AND product_id = ?3",
        )
        .bind(line.counted_quantity)
        .bind(&session.id)
        .bind(&line.product_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Writes the session's status and stamps, if its stored status is still
/// `from`. Returns false when another transaction moved it first.
pub(crate) async fn save_status(
    conn: &mut SqliteConnection,
    session: &CountSession,
    from: CountStatus,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE count_sessions
        SET status = ?1, completed_at = ?2, applied_by = ?3, applied_at = ?4
        WHERE id = ?5 AND status = ?6
        "#,
    )
    .bind(session.status)
    .bind(session.completed_at)
    .bind(&session.applied_by)
    .bind(session.applied_at)
    .bind(&session.id)
    .bind(from)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Read access to count sessions.
#[derive(Debug, Clone)]
pub struct CountRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl CountRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        CountRepository { pool, tenant_id }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CountSession>> {
        let mut conn = self.pool.acquire().await?;
        fetch_session(&mut conn, &self.tenant_id, id).await
    }

    /// Sessions newest first, with their lines.
    pub async fn list(&self) -> DbResult<Vec<CountSession>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM count_sessions WHERE tenant_id = ?1 ORDER BY created_at DESC, rowid DESC",
            SESSION_COLUMNS
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&sql)
            .bind(&self.tenant_id)
            .fetch_all(&mut *conn)
            .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = fetch_lines(&mut conn, &row.id).await?;
            sessions.push(row.into_session(lines));
        }
        Ok(sessions)
    }

    /// Sessions in one status, newest first.
    pub async fn list_by_status(&self, status: CountStatus) -> DbResult<Vec<CountSession>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.status == status)
            .collect())
    }
}
