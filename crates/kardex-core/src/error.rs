//! # Error Types
//!
//! Domain-specific error types for kardex-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kardex-core errors (this file)                                        │
//! │  ├── CoreError        - Stock rule violations                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kardex-db errors (separate crate)                                     │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  CLI errors (in app)                                                   │
//! │  └── ApiError         - What the operator sees (code + message)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Operator     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries enough context for an actionable message.
//! "insufficient stock for X at L: 3 available, 5 requested" beats "operation failed".

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Stock rule violations.
///
/// Any of these aborts the surrounding transaction with zero partial effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A quantity was zero or negative where a positive one is required,
    /// or a target quantity was negative.
    #[error("invalid quantity {quantity}: {reason}")]
    InvalidQuantity { quantity: i64, reason: String },

    /// An exit or transfer would drive a location below zero.
    ///
    /// ## When This Occurs
    /// ```text
    /// apply_exit(qty: 5)
    ///      │
    ///      ▼
    /// Read inside transaction: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Operator sees: "insufficient stock for X at L: 3 available, 5 requested"
    /// ```
    #[error("insufficient stock for {product} at {location}: {available} available, {requested} requested")]
    InsufficientStock {
        product: String,
        location: String,
        available: i64,
        requested: i64,
    },

    /// Transfer source and destination are the same location.
    #[error("invalid transfer: source and destination are both {location}")]
    InvalidTransfer { location: String },

    /// A count session was applied a second time.
    ///
    /// ## When This Occurs
    /// - Apply re-run after a page reload or a retried request
    /// - Two operators applying the same session concurrently (one wins)
    #[error("count session {session_id} has already been applied")]
    AlreadyApplied { session_id: String },

    /// A count session is not in the state the operation requires.
    #[error("count session {session_id} is {current}, expected {expected}")]
    InvalidCountState {
        session_id: String,
        current: String,
        expected: String,
    },

    /// Finalize was requested with lines still uncounted and no confirmation
    /// to treat them as zero.
    #[error("{count} product(s) have not been counted; confirm to record them as 0")]
    UncountedLines { count: usize },

    /// A product needs stock placed but has no location to receive it.
    #[error("product {product} has no location to receive {quantity} unit(s)")]
    NoReceivingLocation { product: String, quantity: i64 },

    /// Referenced product, location or session does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The optimistic retry budget ran out.
    ///
    /// ## When This Occurs
    /// - Sustained write contention on one product
    /// - Database stayed locked for every attempt
    #[error("concurrent modification: gave up after {attempts} attempt(s), please retry")]
    ConcurrencyConflict { attempts: u32 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidQuantity error.
    pub fn invalid_quantity(quantity: i64, reason: impl Into<String>) -> Self {
        CoreError::InvalidQuantity {
            quantity,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, unknown movement type).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
