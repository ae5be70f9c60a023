//! # API Error Type
//!
//! Unified, user-facing error type for CLI commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Kardex                                 │
//! │                                                                         │
//! │  kardex stock exit parafuso loja 5                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command handler: Result<(), ApiError>                           │  │
//! │  │         │                                                        │  │
//! │  │  DbError::Domain(CoreError::InsufficientStock) ──┐               │  │
//! │  │  DbError::UniqueViolation ───────────────────────┤               │  │
//! │  │  ConfigError::Invalid ───────────────────────────┼──► ApiError   │  │
//! │  └──────────────────────────────────────────────────┼───────────────┘  │
//! │                                                     ▼                   │
//! │  stderr: error [INSUFFICIENT_STOCK]: insufficient stock for ...        │
//! │  --json: {"code":"INSUFFICIENT_STOCK","message":"..."}                 │
//! │  exit status 1                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use kardex_core::CoreError;
use kardex_db::DbError;

use crate::state::ConfigError;

/// Error returned from every command.
///
/// ## Serialization
/// What scripts see with `--json` when a command fails:
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Product not found: PAR-0001"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Product, location, category, supplier or session missing
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Name or SKU already taken
    Duplicate,

    /// Exit or transfer larger than the available quantity
    InsufficientStock,

    /// Transfer to the same location
    InvalidTransfer,

    /// Count session in the wrong state, or already applied
    CountState,

    /// Concurrent writers kept winning; try again
    Conflict,

    /// Configuration file or environment is invalid
    ConfigError,

    /// Database operation failed
    DatabaseError,

    /// Anything else
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Duplicate => "DUPLICATE",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::InvalidTransfer => "INVALID_TRANSFER",
            ErrorCode::CountState => "COUNT_STATE",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => core.into(),
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Duplicate,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::debug!("Foreign key violation: {}", message);
                ApiError::new(
                    ErrorCode::ValidationError,
                    "Invalid reference, or the record is still in use",
                )
            }
            DbError::Busy(_) | DbError::StaleVersion { .. } | DbError::PoolExhausted => {
                ApiError::new(ErrorCode::Conflict, "Database is busy, try again")
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        let code = match err {
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::InvalidTransfer { .. } => ErrorCode::InvalidTransfer,
            CoreError::AlreadyApplied { .. }
            | CoreError::InvalidCountState { .. }
            | CoreError::UncountedLines { .. } => ErrorCode::CountState,
            CoreError::NotFound { .. } => ErrorCode::NotFound,
            CoreError::ConcurrencyConflict { .. } => ErrorCode::Conflict,
            CoreError::InvalidQuantity { .. }
            | CoreError::NoReceivingLocation { .. }
            | CoreError::Validation(_) => ErrorCode::ValidationError,
        };
        ApiError::new(code, message)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(ErrorCode::ConfigError, err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal(format!("failed to encode output: {}", err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_message() {
        let err: ApiError = DbError::Domain(CoreError::InsufficientStock {
            product: "Parafuso M6".into(),
            location: "Loja".into(),
            available: 3,
            requested: 5,
        })
        .into();

        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(
            err.message,
            "insufficient stock for Parafuso M6 at Loja: 3 available, 5 requested"
        );
    }

    #[test]
    fn test_count_errors_share_a_code() {
        let applied: ApiError = CoreError::AlreadyApplied {
            session_id: "s1".into(),
        }
        .into();
        let uncounted: ApiError = CoreError::UncountedLines { count: 2 }.into();
        assert_eq!(applied.code, ErrorCode::CountState);
        assert_eq!(uncounted.code, ErrorCode::CountState);
    }

    #[test]
    fn test_retryable_db_errors_are_conflicts() {
        let err: ApiError = DbError::Busy("database is locked".into()).into();
        assert_eq!(err.code, ErrorCode::Conflict);

        let err: ApiError = DbError::Domain(CoreError::ConcurrencyConflict { attempts: 8 }).into();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[test]
    fn test_json_shape() {
        let err = ApiError::not_found("Product", "PAR-1");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Product not found: PAR-1");
    }
}
