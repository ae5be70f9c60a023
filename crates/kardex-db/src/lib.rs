//! # kardex-db: Persistence and Stock Engine for Kardex
//!
//! This crate owns the SQLite database: connection pool, migrations,
//! repositories, the transactional stock engine and count reconciliation.
//! Stock rules themselves live in `kardex-core`; this crate loads state,
//! lets the core plan, and commits the plan atomically.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex Data Flow                                 │
//! │                                                                         │
//! │  kardex-cli (stock exit ...)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kardex-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  StockEngine  │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  Reconciler   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo   │    │              │  │   │
//! │  │   │ retry + tx    │───►│ LedgerRepo    │    │ 001_init.sql │  │   │
//! │  │   │ change feed   │    │ CountRepo     │    │              │  │   │
//! │  │   │               │    │ RegistryRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`retry`] - Backoff policy for conflicting writers
//! - [`repository`] - Read access and row-level write helpers
//! - [`engine`] - Entries, exits, transfers, adjustments, product lifecycle
//! - [`reconcile`] - Count sessions and their apply
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kardex_core::Actor;
//! use kardex_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kardex.db")).await?;
//! let actor = Actor::new("u1", "Ana");
//!
//! db.engine().apply_exit(&product_id, &location_id, 3, Some("venda"), &actor).await?;
//! let history = db.ledger().list_for_product(&product_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod reconcile;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::{MutationOutcome, StockEngine, StockEvent};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use reconcile::{CountApplyOutcome, Reconciler};
pub use retry::RetryPolicy;

// Repository re-exports for convenience
pub use repository::count::CountRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::product::ProductRepository;
pub use repository::registry::{NewSupplier, RegistryRepository};
