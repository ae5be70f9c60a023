//! # Product Aggregate
//!
//! Derived views over a product's per-location quantities.
//!
//! ```text
//! locations { L1: 6, L2: 4, L3: 0 }
//!      │
//!      ├── total_quantity()  → 10        (summed on every read)
//!      ├── main_location()   → L1        (largest quantity)
//!      └── stock_status()    → InStock / LowStock / OutOfStock
//! ```
//!
//! There is no stored running total to drift out of sync. A mutation only
//! has to get `locations` right.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Product;

/// Stock level classification used by product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    /// At or below the product's minimum (only when a minimum is set).
    LowStock,
    OutOfStock,
}

impl Product {
    /// Sum of all location quantities.
    pub fn total_quantity(&self) -> i64 {
        self.locations.values().sum()
    }

    /// Low stock iff a minimum is configured and the total is at or below it.
    ///
    /// A `min_stock` of 0 disables monitoring for the product.
    pub fn is_low_stock(&self) -> bool {
        self.min_stock > 0 && self.total_quantity() <= self.min_stock
    }

    pub fn stock_status(&self) -> StockStatus {
        if self.total_quantity() <= 0 {
            StockStatus::OutOfStock
        } else if self.is_low_stock() {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// The location holding the most stock.
    ///
    /// Ties go to the smallest location id. Returns `None` for a product
    /// never stocked anywhere.
    pub fn main_location(&self) -> Option<&str> {
        self.locations
            .iter()
            .fold(None::<(&String, i64)>, |best, (id, &qty)| match best {
                Some((_, best_qty)) if best_qty >= qty => best,
                _ => Some((id, qty)),
            })
            .map(|(id, _)| id.as_str())
    }
}

/// Filters a product list down to low-stock items.
pub fn low_stock<'a>(products: impl IntoIterator<Item = &'a Product>) -> Vec<&'a Product> {
    products.into_iter().filter(|p| p.is_low_stock()).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
