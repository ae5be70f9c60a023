//! # kardex-core: Pure Stock Logic for Kardex
//!
//! Everything that decides what a stock change *means*, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kardex Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 kardex-cli (operator front-end)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │           kardex-db: StockEngine, Reconciler, repos             │   │
//! │  │           transactions, version guard, retry, change feed       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plans with                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kardex-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────┐ ┌─────────┐  │   │
//! │  │  │ mutation │ │aggregate │ │  count   │ │ledger │ │ reports │  │   │
//! │  │  │ planner  │ │ totals   │ │ sessions │ │ kinds │ │ ABC ... │  │   │
//! │  │  └──────────┘ └──────────┘ └──────────┘ └───────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Product, registries, actor
//! - [`ledger`] - Movement kinds and kardex entries
//! - [`aggregate`] - Totals, low stock, main location
//! - [`mutation`] - Planning entries, exits, transfers, adjustments
//! - [`count`] - Count session state machine and correction planning
//! - [`reports`] - Valuation, ABC, dead stock, ledger verification
//! - [`legacy`] - Replaying movement records from older stores
//! - [`money`] - Integer money
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use kardex_core::mutation::{plan, StockMutation};
//! use kardex_core::{MovementKind, Product};
//!
//! let product = Product {
//!     id: "p1".into(),
//!     tenant_id: kardex_core::DEFAULT_TENANT_ID.into(),
//!     sku: None,
//!     name: "Cabo HDMI".into(),
//!     category_id: None,
//!     supplier_id: None,
//!     unit: "un".into(),
//!     unit_cost_cents: 1500,
//!     min_stock: 0,
//!     locations: [("L1".to_string(), 10)].into(),
//!     version: 1,
//!     created_at: Utc::now(),
//!     updated_at: Utc::now(),
//! };
//!
//! let plan = plan(&product, &StockMutation::Exit { location_id: "L1".into(), quantity: 4 }).unwrap();
//! assert_eq!(plan.locations["L1"], 6);
//! assert_eq!(plan.movements[0].kind, MovementKind::Exit);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregate;
pub mod count;
pub mod error;
pub mod ledger;
pub mod legacy;
pub mod money;
pub mod mutation;
pub mod reports;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use aggregate::StockStatus;
pub use count::{CountLine, CountSession, CountStatus, COUNT_ADJUSTMENT_REASON};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{LedgerEntry, MovementKind};
pub use money::Money;
pub use mutation::{MutationPlan, MutationPlanner, StockMutation};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID (single-tenant runtime with multi-tenant schema).
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Unit of measure used when a product is created without one.
pub const DEFAULT_UNIT: &str = "un";
