//! # Physical Count Sessions
//!
//! State machine for a counting pass and the pure planning of the stock
//! corrections it produces.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start(products)          finalize(confirm)        apply (kardex-db)   │
//! │        │                        │                         │             │
//! │        ▼                        ▼                         ▼             │
//! │  ┌─────────────┐  record  ┌─────────────┐          ┌─────────────┐      │
//! │  │ in_progress │ ───────► │  completed  │ ───────► │   applied   │      │
//! │  └─────────────┘  counts  └─────────────┘          └─────────────┘      │
//! │   expected = total          lines locked             terminal,          │
//! │   at start                  unset → 0 (confirmed)    never re-applied   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are per product. When a line differs, the product-level difference
//! is spread onto locations by [`plan_count_adjustment`]:
//! - surplus goes to the main location (or the configured default when the
//!   product is stocked nowhere);
//! - shortage is taken from the fullest locations first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::mutation::StockMutation;
use crate::types::{Actor, Product};

/// Reason recorded on every ledger entry produced by applying a count.
pub const COUNT_ADJUSTMENT_REASON: &str = "inventory count adjustment";

// =============================================================================
// Count Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    /// Operators are still recording quantities.
    InProgress,
    /// Line set locked, waiting to be applied.
    Completed,
    /// Corrections committed. Terminal.
    Applied,
}

impl fmt::Display for CountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CountStatus::InProgress => "in_progress",
            CountStatus::Completed => "completed",
            CountStatus::Applied => "applied",
        })
    }
}

// =============================================================================
// Count Line
// =============================================================================

/// One product in a count session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CountLine {
    pub product_id: String,
    pub product_name: String,
    /// System total when the session started.
    pub expected_quantity: i64,
    /// Operator-entered quantity; `None` until recorded.
    pub counted_quantity: Option<i64>,
}

impl CountLine {
    /// counted − expected, once counted.
    pub fn difference(&self) -> Option<i64> {
        self.counted_quantity.map(|c| c - self.expected_quantity)
    }

    pub fn has_variance(&self) -> bool {
        matches!(self.difference(), Some(d) if d != 0)
    }
}

/// Surplus or loss for one line, for count reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CountVariance {
    pub product_id: String,
    pub product_name: String,
    pub expected_quantity: i64,
    pub counted_quantity: i64,
    /// Positive: surplus. Negative: loss.
    pub difference: i64,
}

// =============================================================================
// Count Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CountSession {
    pub id: String,
    pub tenant_id: String,
    pub status: CountStatus,
    pub created_by: String,
    pub created_by_name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub applied_at: Option<DateTime<Utc>>,
    pub lines: Vec<CountLine>,
}

impl CountSession {
    /// Opens a session, snapshotting each product's current total as the
    /// expected quantity.
    pub fn start(
        tenant_id: impl Into<String>,
        products: &[Product],
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Self {
        let lines = products
            .iter()
            .map(|p| CountLine {
                product_id: p.id.clone(),
                product_name: p.name.clone(),
                expected_quantity: p.total_quantity(),
                counted_quantity: None,
            })
            .collect();

        CountSession {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            status: CountStatus::InProgress,
            created_by: actor.user_id.clone(),
            created_by_name: actor.display_name.clone(),
            created_at: at,
            completed_at: None,
            applied_by: None,
            applied_at: None,
            lines,
        }
    }

    /// Records the quantity found for a product.
    pub fn record_counted_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        self.require_status(CountStatus::InProgress)?;

        if quantity < 0 {
            return Err(CoreError::invalid_quantity(
                quantity,
                "counted quantity cannot be negative",
            ));
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::not_found("CountLine", product_id))?;

        line.counted_quantity = Some(quantity);
        Ok(())
    }

    /// Number of lines with no counted quantity yet.
    pub fn uncounted(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.counted_quantity.is_none())
            .count()
    }

    /// Locks the line set.
    ///
    /// Uncounted lines become 0 only when `confirm_defaults` is set;
    /// otherwise finalize fails with [`CoreError::UncountedLines`].
    pub fn finalize(&mut self, confirm_defaults: bool, at: DateTime<Utc>) -> CoreResult<()> {
        self.require_status(CountStatus::InProgress)?;

        let missing = self.uncounted();
        if missing > 0 && !confirm_defaults {
            return Err(CoreError::UncountedLines { count: missing });
        }

        for line in self.lines.iter_mut() {
            line.counted_quantity.get_or_insert(0);
        }

        self.status = CountStatus::Completed;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Fails unless the session can be applied right now.
    pub fn ensure_can_apply(&self) -> CoreResult<()> {
        match self.status {
            CountStatus::Completed => Ok(()),
            CountStatus::Applied => Err(CoreError::AlreadyApplied {
                session_id: self.id.clone(),
            }),
            CountStatus::InProgress => Err(self.wrong_status(CountStatus::Completed)),
        }
    }

    /// Moves a completed session to `applied`.
    pub fn mark_applied(&mut self, actor: &Actor, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_can_apply()?;
        self.status = CountStatus::Applied;
        self.applied_by = Some(actor.user_id.clone());
        self.applied_at = Some(at);
        Ok(())
    }

    /// Lines whose counted quantity differs from the expected one.
    pub fn lines_to_adjust(&self) -> impl Iterator<Item = &CountLine> {
        self.lines.iter().filter(|l| l.has_variance())
    }

    pub fn variances(&self) -> Vec<CountVariance> {
        self.lines_to_adjust()
            .filter_map(|l| {
                l.counted_quantity.map(|counted| CountVariance {
                    product_id: l.product_id.clone(),
                    product_name: l.product_name.clone(),
                    expected_quantity: l.expected_quantity,
                    counted_quantity: counted,
                    difference: counted - l.expected_quantity,
                })
            })
            .collect()
    }

    fn require_status(&self, expected: CountStatus) -> CoreResult<()> {
        if self.status == CountStatus::Applied {
            return Err(CoreError::AlreadyApplied {
                session_id: self.id.clone(),
            });
        }
        if self.status != expected {
            return Err(self.wrong_status(expected));
        }
        Ok(())
    }

    fn wrong_status(&self, expected: CountStatus) -> CoreError {
        CoreError::InvalidCountState {
            session_id: self.id.clone(),
            current: self.status.to_string(),
            expected: expected.to_string(),
        }
    }
}

// =============================================================================
// Adjustment Planning
// =============================================================================

/// Adjustments that bring a product's total to `counted`.
///
/// The difference is taken against the product as it is now (read inside the
/// apply transaction), not against the session's expected quantity.
pub fn plan_count_adjustment(
    product: &Product,
    counted: i64,
    default_location: Option<&str>,
) -> CoreResult<Vec<StockMutation>> {
    if counted < 0 {
        return Err(CoreError::invalid_quantity(
            counted,
            "counted quantity cannot be negative",
        ));
    }

    let difference = counted - product.total_quantity();

    if difference > 0 {
        let target = product
            .main_location()
            .or(default_location)
            .ok_or_else(|| CoreError::NoReceivingLocation {
                product: product.name.clone(),
                quantity: difference,
            })?;
        return Ok(vec![StockMutation::Adjustment {
            location_id: target.to_string(),
            new_quantity: product.quantity_at(target) + difference,
        }]);
    }

    let mut remaining = -difference;
    let mut by_quantity: Vec<(&String, i64)> = product
        .locations
        .iter()
        .filter(|(_, q)| **q > 0)
        .map(|(id, q)| (id, *q))
        .collect();
    // Fullest first; equal quantities keep location id order.
    by_quantity.sort_by(|a, b| b.1.cmp(&a.1));

    let mut mutations = Vec::new();
    for (location_id, quantity) in by_quantity {
        if remaining == 0 {
            break;
        }
        let take = quantity.min(remaining);
        remaining -= take;
        mutations.push(StockMutation::Adjustment {
            location_id: location_id.clone(),
            new_quantity: quantity - take,
        });
    }

    Ok(mutations)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationPlanner;

    fn product(id: &str, locations: &[(&str, i64)]) -> Product {
        Product {
            id: id.to_string(),
            tenant_id: "t".to_string(),
            sku: None,
            name: format!("Produto {}", id),
            category_id: None,
            supplier_id: None,
            unit: "un".to_string(),
            unit_cost_cents: 100,
            min_stock: 0,
            locations: locations.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn actor() -> Actor {
        Actor::new("u1", "conferente@example.com")
    }

    #[test]
    fn test_start_snapshots_totals() {
        let products = vec![product("a", &[("L1", 30), ("L2", 20)]), product("b", &[])];
        let session = CountSession::start("t", &products, &actor(), Utc::now());

        assert_eq!(session.status, CountStatus::InProgress);
        assert_eq!(session.lines[0].expected_quantity, 50);
        assert_eq!(session.lines[1].expected_quantity, 0);
        assert_eq!(session.uncounted(), 2);
    }

    #[test]
    fn test_record_rules() {
        let products = vec![product("a", &[("L1", 5)])];
        let mut session = CountSession::start("t", &products, &actor(), Utc::now());

        assert!(matches!(
            session.record_counted_quantity("a", -1),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            session.record_counted_quantity("zzz", 1),
            Err(CoreError::NotFound { .. })
        ));
        session.record_counted_quantity("a", 4).unwrap();
        assert_eq!(session.lines[0].difference(), Some(-1));
    }

    #[test]
    fn test_finalize_requires_confirmation_for_uncounted() {
        let products = vec![product("a", &[("L1", 5)]), product("b", &[("L1", 2)])];
        let mut session = CountSession::start("t", &products, &actor(), Utc::now());
        session.record_counted_quantity("a", 5).unwrap();

        assert_eq!(
            session.finalize(false, Utc::now()),
            Err(CoreError::UncountedLines { count: 1 })
        );
        assert_eq!(session.status, CountStatus::InProgress);

        session.finalize(true, Utc::now()).unwrap();
        assert_eq!(session.status, CountStatus::Completed);
        assert_eq!(session.lines[1].counted_quantity, Some(0));

        // locked after finalize
        assert!(matches!(
            session.record_counted_quantity("a", 1),
            Err(CoreError::InvalidCountState { .. })
        ));
    }

    #[test]
    fn test_apply_guards() {
        let products = vec![product("a", &[("L1", 50)])];
        let mut session = CountSession::start("t", &products, &actor(), Utc::now());

        assert!(matches!(
            session.ensure_can_apply(),
            Err(CoreError::InvalidCountState { .. })
        ));

        session.record_counted_quantity("a", 47).unwrap();
        session.finalize(false, Utc::now()).unwrap();
        session.mark_applied(&actor(), Utc::now()).unwrap();

        assert!(matches!(
            session.mark_applied(&actor(), Utc::now()),
            Err(CoreError::AlreadyApplied { .. })
        ));
        assert!(matches!(
            session.finalize(true, Utc::now()),
            Err(CoreError::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn test_variances_only_lists_differences() {
        let products = vec![product("a", &[("L1", 50)]), product("b", &[("L1", 7)])];
        let mut session = CountSession::start("t", &products, &actor(), Utc::now());
        session.record_counted_quantity("a", 47).unwrap();
        session.record_counted_quantity("b", 7).unwrap();

        let variances = session.variances();
        assert_eq!(variances.len(), 1);
        assert_eq!(variances[0].difference, -3);
    }

    #[test]
    fn test_shortage_taken_from_fullest_location_first() {
        let p = product("a", &[("L1", 3), ("L2", 10), ("L3", 0)]);
        let mutations = plan_count_adjustment(&p, 1, None).unwrap();

        assert_eq!(
            mutations,
            vec![
                StockMutation::Adjustment {
                    location_id: "L2".to_string(),
                    new_quantity: 0
                },
                StockMutation::Adjustment {
                    location_id: "L1".to_string(),
                    new_quantity: 1
                },
            ]
        );

        let mut planner = MutationPlanner::new(&p);
        for m in &mutations {
            planner.apply(m).unwrap();
        }
        let plan = planner.finish();
        assert_eq!(plan.locations.values().sum::<i64>(), 1);
    }

    #[test]
    fn test_surplus_goes_to_main_or_default_location() {
        let p = product("a", &[("L1", 3), ("L2", 10)]);
        assert_eq!(
            plan_count_adjustment(&p, 15, None).unwrap(),
            vec![StockMutation::Adjustment {
                location_id: "L2".to_string(),
                new_quantity: 12
            }]
        );

        let empty = product("b", &[]);
        assert_eq!(
            plan_count_adjustment(&empty, 4, Some("DEP")).unwrap(),
            vec![StockMutation::Adjustment {
                location_id: "DEP".to_string(),
                new_quantity: 4
            }]
        );
        assert!(matches!(
            plan_count_adjustment(&empty, 4, None),
            Err(CoreError::NoReceivingLocation { .. })
        ));
    }

    #[test]
    fn test_matching_count_plans_nothing() {
        let p = product("a", &[("L1", 50)]);
        assert!(plan_count_adjustment(&p, 50, None).unwrap().is_empty());
    }
}
