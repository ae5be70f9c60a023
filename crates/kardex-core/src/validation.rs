//! # Validation Module
//!
//! Input validation for registry and product data.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front-end / CLI argument parsing                             │
//! │  ├── Types, required flags                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Names, SKUs, costs, thresholds                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Planner (mutation.rs)                                        │
//! │  ├── Quantities, stock availability                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite                                                       │
//! │  ├── CHECK (quantity >= 0), UNIQUE, FOREIGN KEY                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{NewProduct, ProductDetails};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_SKU_LEN: usize = 50;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, location, category, supplier).
///
/// ```rust
/// use kardex_core::validation::validate_name;
///
/// assert!(validate_name("name", "Depósito Central").is_ok());
/// assert!(validate_name("name", "   ").is_err());
/// ```
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an optional SKU.
///
/// Letters, digits, hyphens and underscores only.
pub fn validate_sku(sku: Option<&str>) -> ValidationResult<()> {
    let Some(sku) = sku.map(str::trim) else {
        return Ok(());
    };

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > MAX_SKU_LEN {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LEN,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

pub fn validate_unit_cost_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_cost".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

pub fn validate_min_stock(min_stock: i64) -> ValidationResult<()> {
    if min_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "min_stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

pub fn validate_product_details(details: &ProductDetails) -> ValidationResult<()> {
    validate_name("name", &details.name)?;
    validate_sku(details.sku.as_deref())?;
    validate_name("unit", &details.unit)?;
    validate_unit_cost_cents(details.unit_cost_cents)?;
    validate_min_stock(details.min_stock)
}

/// Validates a product creation request, including its seed quantities.
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_name("name", &product.name)?;
    validate_sku(product.sku.as_deref())?;
    if let Some(unit) = product.unit.as_deref() {
        validate_name("unit", unit)?;
    }
    validate_unit_cost_cents(product.unit_cost_cents)?;
    validate_min_stock(product.min_stock)?;

    if let Some((location, qty)) = product.initial_stock.iter().find(|(_, q)| **q < 0) {
        return Err(ValidationError::OutOfRange {
            field: format!("initial_stock[{}] ({})", location, qty),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku(None).is_ok());
        assert!(validate_sku(Some("PAR-M6")).is_ok());
        assert!(validate_sku(Some("")).is_err());
        assert!(validate_sku(Some("has space")).is_err());
        assert!(validate_sku(Some(&"A".repeat(100))).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Fita isolante").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"x".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_new_product_rejects_negative_seed() {
        let mut product = NewProduct {
            name: "Fita".to_string(),
            initial_stock: BTreeMap::from([("L1".to_string(), 3)]),
            ..Default::default()
        };
        assert!(validate_new_product(&product).is_ok());

        product.initial_stock.insert("L2".to_string(), -1);
        assert!(validate_new_product(&product).is_err());

        product.initial_stock.clear();
        product.unit_cost_cents = -5;
        assert!(validate_new_product(&product).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }
}
