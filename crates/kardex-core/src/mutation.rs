//! # Mutation Planning
//!
//! Pure half of the stock engine: given a product as read inside a
//! transaction and a requested mutation, compute the new location map and
//! the ledger movements that describe it. The database half (`kardex-db`)
//! only persists what this module decides.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    read product + locations (version = 7)                               │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    MutationPlanner::new(&product)      ◄── THIS MODULE                  │
//! │      .apply(&StockMutation::Exit { L1, 6 })?                            │
//! │      .finish()  → MutationPlan { locations, movements }                 │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    UPDATE products ... WHERE version = 7   (0 rows → retry)             │
//! │    UPSERT changed locations                                             │
//! │    INSERT ledger entries                                                │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Entry, exit and transfer quantities must be > 0.
//! - Adjustment targets must be >= 0.
//! - No location may go below zero; shortfalls fail, never clamp.
//! - A zero-delta adjustment produces no movement; a correction must be non-zero.
//! - Stocking a location the product has never held records `initial_entry`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ledger::{LedgerEntry, MovementKind};
use crate::types::{Actor, Product};

// =============================================================================
// Requested Mutations
// =============================================================================

/// A single requested change to a product's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockMutation {
    Entry { location_id: String, quantity: i64 },
    Exit { location_id: String, quantity: i64 },
    Transfer { from: String, to: String, quantity: i64 },
    Adjustment { location_id: String, new_quantity: i64 },
    /// Signed manual change relative to the current quantity.
    Correction { location_id: String, delta: i64 },
}

impl StockMutation {
    /// Every location the mutation reads or writes.
    pub fn locations(&self) -> Vec<&str> {
        match self {
            StockMutation::Entry { location_id, .. }
            | StockMutation::Exit { location_id, .. }
            | StockMutation::Adjustment { location_id, .. }
            | StockMutation::Correction { location_id, .. } => vec![location_id.as_str()],
            StockMutation::Transfer { from, to, .. } => vec![from.as_str(), to.as_str()],
        }
    }
}

// =============================================================================
// Planned Movements
// =============================================================================

/// One location-level change, before it is stamped into a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMovement {
    pub location_id: String,
    pub kind: MovementKind,
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub counterpart_location_id: Option<String>,
}

/// Who, why and when, for turning planned movements into ledger entries.
#[derive(Debug, Clone)]
pub struct EntryContext<'a> {
    pub product: &'a Product,
    pub actor: &'a Actor,
    pub reason: Option<&'a str>,
    pub count_session_id: Option<&'a str>,
    pub at: DateTime<Utc>,
}

impl PlannedMovement {
    /// Stamps the movement into an immutable ledger entry.
    pub fn to_entry(&self, ctx: &EntryContext<'_>, location_name: &str) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4().to_string(),
            tenant_id: ctx.product.tenant_id.clone(),
            product_id: ctx.product.id.clone(),
            product_name: ctx.product.name.clone(),
            location_id: self.location_id.clone(),
            location_name: location_name.to_string(),
            kind: self.kind,
            delta: self.delta,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            counterpart_location_id: self.counterpart_location_id.clone(),
            user_id: ctx.actor.user_id.clone(),
            user_name: ctx.actor.display_name.clone(),
            reason: ctx.reason.map(str::to_string),
            count_session_id: ctx.count_session_id.map(str::to_string),
            created_at: ctx.at,
        }
    }
}

/// The outcome of planning: the full new location map plus the movements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    pub locations: BTreeMap<String, i64>,
    pub movements: Vec<PlannedMovement>,
}

impl MutationPlan {
    /// True when nothing changes (zero-delta adjustment).
    pub fn is_noop(&self) -> bool {
        self.movements.is_empty()
    }

    /// Distinct location ids touched by the plan, in movement order.
    pub fn location_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::with_capacity(self.movements.len());
        for movement in &self.movements {
            if !ids.contains(&movement.location_id.as_str()) {
                ids.push(movement.location_id.as_str());
            }
        }
        ids
    }

    /// Locations whose quantity must be written, with their final values.
    pub fn touched_locations(&self) -> BTreeMap<&str, i64> {
        self.movements
            .iter()
            .map(|m| {
                let qty = self.locations.get(&m.location_id).copied().unwrap_or(0);
                (m.location_id.as_str(), qty)
            })
            .collect()
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Applies mutations to a working copy of a product's locations.
///
/// Several mutations may be applied in sequence (count reconciliation
/// spreads one product-level difference over several locations); each sees
/// the state left by the previous one.
#[derive(Debug)]
pub struct MutationPlanner<'a> {
    product: &'a Product,
    locations: BTreeMap<String, i64>,
    movements: Vec<PlannedMovement>,
    location_names: Option<&'a HashMap<String, String>>,
}

impl<'a> MutationPlanner<'a> {
    pub fn new(product: &'a Product) -> Self {
        MutationPlanner {
            product,
            locations: product.locations.clone(),
            movements: Vec::new(),
            location_names: None,
        }
    }

    /// Location id → display name, used in error messages.
    pub fn with_location_names(mut self, names: &'a HashMap<String, String>) -> Self {
        self.location_names = Some(names);
        self
    }

    fn label(&self, location_id: &str) -> String {
        self.location_names
            .and_then(|names| names.get(location_id))
            .cloned()
            .unwrap_or_else(|| location_id.to_string())
    }

    /// Current working quantities.
    pub fn locations(&self) -> &BTreeMap<String, i64> {
        &self.locations
    }

    /// Validates and applies one mutation to the working state.
    ///
    /// On error the working state is left as it was before the call.
    pub fn apply(&mut self, mutation: &StockMutation) -> CoreResult<&mut Self> {
        let saved_locations = self.locations.clone();
        let saved_len = self.movements.len();

        if let Err(err) = self.apply_inner(mutation) {
            self.locations = saved_locations;
            self.movements.truncate(saved_len);
            return Err(err);
        }

        Ok(self)
    }

    fn apply_inner(&mut self, mutation: &StockMutation) -> CoreResult<()> {
        match mutation {
            StockMutation::Entry {
                location_id,
                quantity,
            } => {
                require_positive(*quantity)?;
                let kind = if self.locations.contains_key(location_id) {
                    MovementKind::ManualAdjustment
                } else {
                    MovementKind::InitialEntry
                };
                self.change(location_id, *quantity, kind, None)?;
            }

            StockMutation::Exit {
                location_id,
                quantity,
            } => {
                require_positive(*quantity)?;
                self.require_available(location_id, *quantity)?;
                self.change(location_id, -quantity, MovementKind::Exit, None)?;
            }

            StockMutation::Transfer { from, to, quantity } => {
                if from == to {
                    return Err(CoreError::InvalidTransfer {
                        location: self.label(from),
                    });
                }
                require_positive(*quantity)?;
                self.require_available(from, *quantity)?;
                self.change(from, -quantity, MovementKind::TransferOut, Some(to.as_str()))?;
                self.change(to, *quantity, MovementKind::TransferIn, Some(from.as_str()))?;
            }

            StockMutation::Adjustment {
                location_id,
                new_quantity,
            } => {
                if *new_quantity < 0 {
                    return Err(CoreError::invalid_quantity(
                        *new_quantity,
                        "target quantity cannot be negative",
                    ));
                }
                let delta = new_quantity - self.quantity_at(location_id);
                if delta != 0 {
                    self.change(location_id, delta, MovementKind::ManualAdjustment, None)?;
                }
            }

            StockMutation::Correction { location_id, delta } => {
                if *delta == 0 {
                    return Err(CoreError::invalid_quantity(0, "correction must change the quantity"));
                }
                self.change(location_id, *delta, MovementKind::ManualAdjustment, None)?;
            }
        }

        Ok(())
    }

    /// Consumes the planner and returns the plan.
    pub fn finish(self) -> MutationPlan {
        MutationPlan {
            locations: self.locations,
            movements: self.movements,
        }
    }

    fn quantity_at(&self, location_id: &str) -> i64 {
        self.locations.get(location_id).copied().unwrap_or(0)
    }

    fn require_available(&self, location_id: &str, requested: i64) -> CoreResult<()> {
        let available = self.quantity_at(location_id);
        if available < requested {
            return Err(CoreError::InsufficientStock {
                product: self.product.name.clone(),
                location: self.label(location_id),
                available,
                requested,
            });
        }
        Ok(())
    }

    fn change(
        &mut self,
        location_id: &str,
        delta: i64,
        kind: MovementKind,
        counterpart: Option<&str>,
    ) -> CoreResult<()> {
        let before = self.quantity_at(location_id);
        let after = before
            .checked_add(delta)
            .ok_or_else(|| CoreError::invalid_quantity(delta, "quantity overflow"))?;

        if after < 0 {
            return Err(CoreError::InsufficientStock {
                product: self.product.name.clone(),
                location: self.label(location_id),
                available: before,
                requested: -delta,
            });
        }

        self.locations.insert(location_id.to_string(), after);
        self.movements.push(PlannedMovement {
            location_id: location_id.to_string(),
            kind,
            delta,
            quantity_before: before,
            quantity_after: after,
            counterpart_location_id: counterpart.map(str::to_string),
        });
        Ok(())
    }
}

fn require_positive(quantity: i64) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(CoreError::invalid_quantity(
            quantity,
            "quantity must be greater than zero",
        ));
    }
    Ok(())
}

/// Plans a single mutation.
pub fn plan(product: &Product, mutation: &StockMutation) -> CoreResult<MutationPlan> {
    let mut planner = MutationPlanner::new(product);
    planner.apply(mutation)?;
    Ok(planner.finish())
}

/// Plans a single mutation, naming locations in errors.
pub fn plan_named(
    product: &Product,
    mutation: &StockMutation,
    location_names: &HashMap<String, String>,
) -> CoreResult<MutationPlan> {
    let mut planner = MutationPlanner::new(product).with_location_names(location_names);
    planner.apply(mutation)?;
    Ok(planner.finish())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(locations: &[(&str, i64)]) -> Product {
        Product {
            id: "p1".to_string(),
            tenant_id: "t".to_string(),
            sku: None,
            name: "Cabo HDMI".to_string(),
            category_id: None,
            supplier_id: None,
            unit: "un".to_string(),
            unit_cost_cents: 1500,
            min_stock: 0,
            locations: locations.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(loc: &str, q: i64) -> StockMutation {
        StockMutation::Entry {
            location_id: loc.to_string(),
            quantity: q,
        }
    }

    fn exit(loc: &str, q: i64) -> StockMutation {
        StockMutation::Exit {
            location_id: loc.to_string(),
            quantity: q,
        }
    }

    fn transfer(from: &str, to: &str, q: i64) -> StockMutation {
        StockMutation::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            quantity: q,
        }
    }

    fn adjust(loc: &str, q: i64) -> StockMutation {
        StockMutation::Adjustment {
            location_id: loc.to_string(),
            new_quantity: q,
        }
    }

    #[test]
    fn test_entry_into_new_location_is_initial_entry() {
        let p = product(&[]);
        let plan = plan(&p, &entry("L1", 20)).unwrap();

        assert_eq!(plan.locations["L1"], 20);
        assert_eq!(plan.movements.len(), 1);
        let m = &plan.movements[0];
        assert_eq!(m.kind, MovementKind::InitialEntry);
        assert_eq!((m.quantity_before, m.delta, m.quantity_after), (0, 20, 20));
    }

    #[test]
    fn test_entry_into_known_location_is_manual_adjustment() {
        let p = product(&[("L1", 0)]);
        let plan = plan(&p, &entry("L1", 3)).unwrap();
        assert_eq!(plan.movements[0].kind, MovementKind::ManualAdjustment);
    }

    #[test]
    fn test_entry_then_exit() {
        let p = product(&[]);
        let mut planner = MutationPlanner::new(&p);
        planner.apply(&entry("L1", 20)).unwrap();
        planner.apply(&exit("L1", 5)).unwrap();
        let plan = planner.finish();

        assert_eq!(plan.locations["L1"], 15);
        let exit_leg = &plan.movements[1];
        assert_eq!(exit_leg.kind, MovementKind::Exit);
        assert_eq!(
            (exit_leg.quantity_before, exit_leg.delta, exit_leg.quantity_after),
            (20, -5, 15)
        );
    }

    #[test]
    fn test_exit_rejects_shortfall_and_non_positive() {
        let p = product(&[("L1", 2)]);
        match plan(&p, &exit("L1", 5)) {
            Err(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => assert_eq!((available, requested), (2, 5)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            plan(&p, &exit("L1", 0)),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            plan(&p, &entry("L1", -1)),
            Err(CoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_transfer_produces_two_linked_legs() {
        let p = product(&[("L1", 10), ("L2", 0)]);
        let plan = plan(&p, &transfer("L1", "L2", 4)).unwrap();

        assert_eq!(plan.locations["L1"], 6);
        assert_eq!(plan.locations["L2"], 4);
        assert_eq!(plan.movements.len(), 2);

        let out = &plan.movements[0];
        let inn = &plan.movements[1];
        assert_eq!(out.kind, MovementKind::TransferOut);
        assert_eq!((out.quantity_before, out.quantity_after), (10, 6));
        assert_eq!(out.counterpart_location_id.as_deref(), Some("L2"));
        assert_eq!(inn.kind, MovementKind::TransferIn);
        assert_eq!((inn.quantity_before, inn.quantity_after), (0, 4));
        assert_eq!(inn.counterpart_location_id.as_deref(), Some("L1"));
    }

    #[test]
    fn test_transfer_to_same_location_is_invalid() {
        let p = product(&[("L1", 10)]);
        assert!(matches!(
            plan(&p, &transfer("L1", "L1", 1)),
            Err(CoreError::InvalidTransfer { .. })
        ));
    }

    #[test]
    fn test_errors_name_the_location() {
        let p = product(&[("L1", 2)]);
        let names: HashMap<String, String> = [("L1".to_string(), "Depósito".to_string())].into();

        let err = plan_named(&p, &exit("L1", 5), &names).unwrap_err();
        assert_eq!(
            err.to_string(),
            "insufficient stock for Cabo HDMI at Depósito: 2 available, 5 requested"
        );

        match plan_named(&p, &transfer("L1", "L1", 1), &names) {
            Err(CoreError::InvalidTransfer { location }) => assert_eq!(location, "Depósito"),
            other => panic!("unexpected: {:?}", other),
        }

        // unnamed ids fall back to the id
        match plan(&p, &exit("L1", 5)) {
            Err(CoreError::InsufficientStock { location, .. }) => assert_eq!(location, "L1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_location_ids_are_distinct() {
        let p = product(&[("L1", 10)]);
        let mut planner = MutationPlanner::new(&p);
        planner.apply(&exit("L1", 2)).unwrap();
        planner.apply(&transfer("L1", "L2", 3)).unwrap();
        assert_eq!(planner.finish().location_ids(), vec!["L1", "L2"]);
    }

    #[test]
    fn test_adjustment_sets_quantity_and_skips_zero_delta() {
        let p = product(&[("L1", 50)]);

        let plan_down = plan(&p, &adjust("L1", 47)).unwrap();
        assert_eq!(plan_down.movements[0].delta, -3);
        assert_eq!(plan_down.movements[0].kind, MovementKind::ManualAdjustment);

        let noop = plan(&p, &adjust("L1", 50)).unwrap();
        assert!(noop.is_noop());
        assert_eq!(noop.locations["L1"], 50);

        assert!(matches!(
            plan(&p, &adjust("L1", -1)),
            Err(CoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_correction_is_relative() {
        let p = product(&[("L1", 10)]);
        let correction = |delta| StockMutation::Correction {
            location_id: "L1".to_string(),
            delta,
        };

        let down = plan(&p, &correction(-4)).unwrap();
        assert_eq!(down.locations["L1"], 6);
        assert_eq!(down.movements[0].kind, MovementKind::ManualAdjustment);

        assert!(matches!(
            plan(&p, &correction(-11)),
            Err(CoreError::InsufficientStock { available: 10, requested: 11, .. })
        ));
        assert!(matches!(
            plan(&p, &correction(0)),
            Err(CoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_failed_apply_leaves_working_state_untouched() {
        let p = product(&[("L1", 3)]);
        let mut planner = MutationPlanner::new(&p);
        assert!(planner.apply(&transfer("L1", "L2", 5)).is_err());
        assert_eq!(planner.locations().get("L1"), Some(&3));
        assert!(planner.locations().get("L2").is_none());
        assert!(planner.finish().is_noop());
    }

    #[test]
    fn test_entries_are_stamped_with_context() {
        let p = product(&[("L1", 10)]);
        let actor = Actor::new("u1", "ana@example.com");
        let plan = plan(&p, &exit("L1", 1)).unwrap();
        let ctx = EntryContext {
            product: &p,
            actor: &actor,
            reason: Some("sale"),
            count_session_id: None,
            at: Utc::now(),
        };
        let entry = plan.movements[0].to_entry(&ctx, "Loja");
        assert!(entry.is_consistent());
        assert_eq!(entry.product_name, "Cabo HDMI");
        assert_eq!(entry.location_name, "Loja");
        assert_eq!(entry.user_name, "ana@example.com");
        assert_eq!(entry.reason.as_deref(), Some("sale"));
    }

    fn arb_location() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["L1", "L2", "L3"]).prop_map(str::to_string)
    }

    fn arb_mutation() -> impl Strategy<Value = StockMutation> {
        prop_oneof![
            (arb_location(), -2i64..30).prop_map(|(l, q)| StockMutation::Entry {
                location_id: l,
                quantity: q
            }),
            (arb_location(), -2i64..30).prop_map(|(l, q)| StockMutation::Exit {
                location_id: l,
                quantity: q
            }),
            (arb_location(), arb_location(), -2i64..30)
                .prop_map(|(from, to, q)| StockMutation::Transfer { from, to, quantity: q }),
            (arb_location(), -2i64..30).prop_map(|(l, q)| StockMutation::Adjustment {
                location_id: l,
                new_quantity: q
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_quantities_never_negative(ops in prop::collection::vec(arb_mutation(), 0..40)) {
            let mut current = product(&[]);
            for op in &ops {
                if let Ok(plan) = plan(&current, op) {
                    for m in &plan.movements {
                        prop_assert_eq!(m.quantity_before + m.delta, m.quantity_after);
                        prop_assert!(m.kind.accepts_delta(m.delta));
                    }
                    current.locations = plan.locations;
                }
                prop_assert!(current.locations.values().all(|q| *q >= 0));
            }
        }

        #[test]
        fn prop_transfers_conserve_total(
            start in 0i64..100,
            ops in prop::collection::vec((arb_location(), arb_location(), 1i64..40), 0..30),
        ) {
            let mut current = product(&[("L1", start)]);
            for (from, to, qty) in &ops {
                if let Ok(plan) = plan(&current, &transfer(from, to, *qty)) {
                    current.locations = plan.locations;
                }
                prop_assert_eq!(current.total_quantity(), start);
            }
        }
    }
}
