//! # Domain Types
//!
//! Core domain types used throughout Kardex.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐        ┌─────────────────────┐                 │
//! │  │      Product        │        │    LedgerEntry      │ (ledger.rs)     │
//! │  │  ─────────────────  │  id    │  ─────────────────  │                 │
//! │  │  id (UUID)          │◄ ─ ─ ─ │  product_id         │                 │
//! │  │  sku (business)     │        │  location_id        │                 │
//! │  │  unit_cost_cents    │        │  kind, delta        │                 │
//! │  │  min_stock          │        │  before → after     │                 │
//! │  │  locations {L: qty} │        └─────────────────────┘                 │
//! │  │  version            │                                                │
//! │  └─────────────────────┘        ┌─────────────────────┐                 │
//! │                                 │   CountSession      │ (count.rs)      │
//! │  ┌──────────┐ ┌──────────┐      │  lines: CountLine*  │                 │
//! │  │ Location │ │ Category │      └─────────────────────┘                 │
//! │  └──────────┘ └──────────┘  ┌──────────┐                                │
//! │                             │ Supplier │   (registries)                 │
//! │                             └──────────┘                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products and ledger entries are correlated by product id only. Deleting a
//! product leaves its ledger history in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Actor
// =============================================================================

/// The authenticated user performing a mutation.
///
/// Supplied by the caller; the core never authenticates or authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    /// Stable user identifier from the identity provider.
    pub user_id: String,
    /// Display label recorded on ledger entries (usually the e-mail).
    pub display_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Actor used by maintenance jobs (seeding, migrations).
    pub fn system() -> Self {
        Actor::new("system", "system")
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stocked product and its per-location quantities.
///
/// `locations` is the only stock state. The total is derived on read (see
/// [`Product::total_quantity`]) and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Tenant this product belongs to.
    pub tenant_id: String,

    /// Stock Keeping Unit - optional business identifier.
    pub sku: Option<String>,

    /// Display name, denormalized into ledger entries at write time.
    pub name: String,

    pub category_id: Option<String>,

    pub supplier_id: Option<String>,

    /// Unit of measure ("un", "kg", "cx", ...).
    pub unit: String,

    /// Unit cost in cents, used by valuation and ABC reports.
    pub unit_cost_cents: i64,

    /// Low-stock threshold. 0 disables monitoring.
    pub min_stock: i64,

    /// Location id → quantity on hand. Every value is >= 0.
    pub locations: BTreeMap<String, i64>,

    /// Optimistic concurrency counter, bumped on every committed write.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit cost as Money.
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    /// Quantity at one location, 0 when the product was never stocked there.
    #[inline]
    pub fn quantity_at(&self, location_id: &str) -> i64 {
        self.locations.get(location_id).copied().unwrap_or(0)
    }
}

/// Input for creating a product.
///
/// `initial_stock` seeds quantities; each positive seed becomes an
/// `initial_entry` ledger record in the same transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub sku: Option<String>,
    pub name: String,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
    pub unit: Option<String>,
    pub unit_cost_cents: i64,
    pub min_stock: i64,
    pub initial_stock: BTreeMap<String, i64>,
}

/// Editable descriptive fields of a product.
///
/// Quantities are deliberately absent: they change only through stock
/// mutations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDetails {
    pub sku: Option<String>,
    pub name: String,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
    pub unit: String,
    pub unit_cost_cents: i64,
    pub min_stock: i64,
}

impl From<&Product> for ProductDetails {
    fn from(p: &Product) -> Self {
        ProductDetails {
            sku: p.sku.clone(),
            name: p.name.clone(),
            category_id: p.category_id.clone(),
            supplier_id: p.supplier_id.clone(),
            unit: p.unit.clone(),
            unit_cost_cents: p.unit_cost_cents,
            min_stock: p.min_stock,
        }
    }
}

// =============================================================================
// Registries
// =============================================================================

/// A physical stock location (warehouse, shelf, store room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A supplier of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_at_unknown_location_is_zero() {
        let product = Product {
            id: "p1".to_string(),
            tenant_id: "t".to_string(),
            sku: None,
            name: "Parafuso".to_string(),
            category_id: None,
            supplier_id: None,
            unit: "un".to_string(),
            unit_cost_cents: 10,
            min_stock: 0,
            locations: BTreeMap::from([("L1".to_string(), 4)]),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(product.quantity_at("L1"), 4);
        assert_eq!(product.quantity_at("L2"), 0);
    }

    #[test]
    fn test_details_snapshot() {
        let now = Utc::now();
        let product = Product {
            id: "p1".to_string(),
            tenant_id: "t".to_string(),
            sku: Some("PAR-6".to_string()),
            name: "Parafuso".to_string(),
            category_id: Some("c1".to_string()),
            supplier_id: None,
            unit: "un".to_string(),
            unit_cost_cents: 10,
            min_stock: 5,
            locations: BTreeMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let details = ProductDetails::from(&product);
        assert_eq!(details.sku.as_deref(), Some("PAR-6"));
        assert_eq!(details.min_stock, 5);
    }
}
