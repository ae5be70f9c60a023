//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error                      CoreError (planner, count session)   │
//! │       │                                │                                │
//! │       ▼                                ▼                                │
//! │  DbError::{NotFound, Busy, ...}   DbError::Domain(CoreError)           │
//! │       │                                │                                │
//! │       └──────────────┬─────────────────┘                                │
//! │                      ▼                                                  │
//! │  ApiError (kardex-cli) ← code + message for the operator               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock engine retries only on [`DbError::Busy`], [`DbError::StaleVersion`] and [`DbError::PoolExhausted`].

use kardex_core::CoreError;
use thiserror::Error;

/// SQLITE_BUSY and its extended codes (SQLITE_BUSY_RECOVERY, _SNAPSHOT, _TIMEOUT).
const SQLITE_BUSY_CODES: &[&str] = &["5", "261", "517", "773"];
/// SQLITE_LOCKED and SQLITE_LOCKED_SHAREDCACHE.
const SQLITE_LOCKED_CODES: &[&str] = &["6", "262"];

#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Unknown product, location, or count session id
    /// - Product deleted between two operator actions
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate SKU within a tenant
    /// - Duplicate location/category/supplier name
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Deleting a location that still holds stock rows
    /// - Referencing a category or supplier that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The database was busy or locked by another writer.
    ///
    /// ## When This Occurs
    /// - Two engine calls upgrade to write locks at the same time
    /// - busy_timeout expired while another transaction held the lock
    ///
    /// Retryable: the transaction has been rolled back in full.
    #[error("Database busy: {0}")]
    Busy(String),

    /// The row's version moved between read and write.
    ///
    /// ## When This Occurs
    /// - Another transaction committed a change to the same product after
    ///   this one read it
    ///
    /// Retryable, like [`DbError::Busy`].
    #[error("{entity} {id} was modified concurrently")]
    StaleVersion { entity: String, id: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A business rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when the failed transaction can be re-run from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::StaleVersion { .. } | DbError::PoolExhausted
        )
    }

    /// The wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → busy/locked, UNIQUE, FOREIGN KEY, or QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();
                let code = code.as_deref().unwrap_or_default();

                if SQLITE_BUSY_CODES.contains(&code)
                    || SQLITE_LOCKED_CODES.contains(&code)
                    || msg.contains("database is locked")
                    || msg.contains("database table is locked")
                {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<kardex_core::ValidationError> for DbError {
    fn from(err: kardex_core::ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflict_errors_are_retryable() {
        assert!(DbError::Busy("database is locked".into()).is_retryable());
        assert!(DbError::PoolExhausted.is_retryable());
        assert!(DbError::StaleVersion {
            entity: "Product".into(),
            id: "p1".into()
        }
        .is_retryable());
        assert!(!DbError::not_found("Product", "p1").is_retryable());
        assert!(!DbError::Domain(CoreError::InvalidTransfer {
            location: "L1".into()
        })
        .is_retryable());
    }

    #[test]
    fn test_domain_errors_keep_their_message() {
        let err: DbError = CoreError::not_found("Product", "p1").into();
        assert_eq!(err.to_string(), "Product not found: p1");
        assert!(err.as_domain().is_some());
    }
}
