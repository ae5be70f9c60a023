//! # Read-Side Projections
//!
//! Advisory reports computed from products and ledger entries. Nothing here
//! writes, and missing data yields empty or zero results instead of errors.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────────┐
//! │  products    │────►│  valuation        │────►│ qty × unit cost      │
//! │              │     ├───────────────────┤     ├──────────────────────┤
//! │  ledger      │────►│  abc_classify     │────►│ A ≤ 80% < B ≤ 95% < C│
//! │  (in commit  │     ├───────────────────┤     ├──────────────────────┤
//! │   order)     │────►│  dead_stock       │────►│ no outbound since T  │
//! │              │     ├───────────────────┤     ├──────────────────────┤
//! │              │────►│  verify_ledger    │────►│ replay == locations? │
//! └──────────────┘     └───────────────────┘     └──────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::ledger::LedgerEntry;
use crate::money::Money;
use crate::types::Product;

/// Trailing window for ABC consumption.
pub const DEFAULT_ABC_WINDOW_DAYS: i64 = 90;

/// Trailing window after which unmoved stock counts as dead.
pub const DEFAULT_DEAD_STOCK_DAYS: i64 = 180;

/// Cumulative share limits in basis points.
const CLASS_A_LIMIT_BPS: i128 = 8_000;
const CLASS_B_LIMIT_BPS: i128 = 9_500;

// =============================================================================
// Valuation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValuationLine {
    pub product_id: String,
    pub product_name: String,
    pub total_quantity: i64,
    pub unit_cost: Money,
    pub value: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValuationReport {
    pub lines: Vec<ValuationLine>,
    pub total_quantity: i64,
    pub total_value: Money,
}

/// Stock value per product and in total.
pub fn valuation(products: &[Product]) -> ValuationReport {
    let lines: Vec<ValuationLine> = products
        .iter()
        .map(|p| {
            let qty = p.total_quantity();
            ValuationLine {
                product_id: p.id.clone(),
                product_name: p.name.clone(),
                total_quantity: qty,
                unit_cost: p.unit_cost(),
                value: p.unit_cost().multiply_quantity(qty),
            }
        })
        .collect();

    ValuationReport {
        total_quantity: lines.iter().map(|l| l.total_quantity).sum(),
        total_value: lines.iter().map(|l| l.value).sum(),
        lines,
    }
}

// =============================================================================
// ABC Classification
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum AbcClass {
    A,
    B,
    C,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AbcLine {
    pub product_id: String,
    pub product_name: String,
    pub consumed_quantity: i64,
    pub consumption_value: Money,
    /// Share of total consumption value, in basis points.
    pub share_bps: u32,
    pub cumulative_share_bps: u32,
    pub class: AbcClass,
}

/// Start of a trailing window; windows reaching past the calendar start at its beginning.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Ranks products by outbound consumption value over `[now - window, now]`.
///
/// Products with no consumption are left out. Equal values keep the order
/// of `products`.
pub fn abc_classification(
    products: &[Product],
    entries: &[LedgerEntry],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<AbcLine> {
    let since = window_start(now, window);

    let mut consumed: HashMap<&str, i64> = HashMap::new();
    for e in entries
        .iter()
        .filter(|e| e.kind.is_outbound() && e.created_at >= since && e.created_at <= now)
    {
        *consumed.entry(e.product_id.as_str()).or_default() += e.quantity();
    }

    let mut ranked: Vec<(&Product, i64, Money)> = products
        .iter()
        .filter_map(|p| {
            let qty = consumed.get(p.id.as_str()).copied().unwrap_or(0);
            let value = p.unit_cost().multiply_quantity(qty);
            value.is_positive().then_some((p, qty, value))
        })
        .collect();

    let total: Money = ranked.iter().map(|(_, _, v)| *v).sum();
    if !total.is_positive() {
        return Vec::new();
    }

    ranked.sort_by(|a, b| b.2.cmp(&a.2));

    let mut cumulative = Money::zero();
    ranked
        .into_iter()
        .map(|(p, qty, value)| {
            cumulative += value;
            let cumulative_scaled = cumulative.cents() as i128 * 10_000;
            let class = if cumulative_scaled <= CLASS_A_LIMIT_BPS * total.cents() as i128 {
                AbcClass::A
            } else if cumulative_scaled <= CLASS_B_LIMIT_BPS * total.cents() as i128 {
                AbcClass::B
            } else {
                AbcClass::C
            };
            AbcLine {
                product_id: p.id.clone(),
                product_name: p.name.clone(),
                consumed_quantity: qty,
                consumption_value: value,
                share_bps: value.share_bps(total),
                cumulative_share_bps: cumulative.share_bps(total),
                class,
            }
        })
        .collect()
}

// =============================================================================
// Dead Stock
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeadStockLine {
    pub product_id: String,
    pub product_name: String,
    pub total_quantity: i64,
    /// Latest exit or transfer out, `None` when the product never moved.
    #[ts(as = "Option<String>")]
    pub last_outbound_at: Option<DateTime<Utc>>,
    pub idle_days: Option<i64>,
    pub dead_value: Money,
}

/// Products holding stock with no outbound movement since `now - window`.
///
/// Never-moved products are included. Sorted by dead value, largest first.
pub fn dead_stock(
    products: &[Product],
    entries: &[LedgerEntry],
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<DeadStockLine> {
    let cutoff = window_start(now, window);

    let mut last_outbound: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for e in entries.iter().filter(|e| e.kind.is_outbound()) {
        last_outbound
            .entry(e.product_id.as_str())
            .and_modify(|t| {
                if e.created_at > *t {
                    *t = e.created_at;
                }
            })
            .or_insert(e.created_at);
    }

    let mut lines: Vec<DeadStockLine> = products
        .iter()
        .filter(|p| p.total_quantity() > 0)
        .filter_map(|p| {
            let last = last_outbound.get(p.id.as_str()).copied();
            if matches!(last, Some(t) if t >= cutoff) {
                return None;
            }
            let qty = p.total_quantity();
            Some(DeadStockLine {
                product_id: p.id.clone(),
                product_name: p.name.clone(),
                total_quantity: qty,
                last_outbound_at: last,
                idle_days: last.map(|t| (now - t).num_days()),
                dead_value: p.unit_cost().multiply_quantity(qty),
            })
        })
        .collect();

    lines.sort_by(|a, b| b.dead_value.cmp(&a.dead_value));
    lines
}

// =============================================================================
// Ledger Replay
// =============================================================================

/// Rebuilds (product, location) quantities by replaying entries from zero.
///
/// `entries` must be in commit order.
pub fn replay_location_quantities(entries: &[LedgerEntry]) -> BTreeMap<(String, String), i64> {
    let mut quantities = BTreeMap::new();
    for e in entries {
        *quantities
            .entry((e.product_id.clone(), e.location_id.clone()))
            .or_insert(0) += e.delta;
    }
    quantities
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerDiscrepancy {
    /// An entry's arithmetic or sign is wrong, or its `quantity_before`
    /// does not continue the previous entry.
    BrokenEntry {
        entry_id: String,
        product_id: String,
        location_id: String,
        expected_before: i64,
        actual_before: i64,
    },
    /// Replayed quantity differs from the product's stored quantity.
    QuantityMismatch {
        product_id: String,
        location_id: String,
        stored: i64,
        replayed: i64,
    },
}

/// Checks that the ledger fully explains current product quantities.
///
/// Only products present in `products` are checked; entries of deleted
/// products are history, not drift.
pub fn verify_ledger(products: &[Product], entries: &[LedgerEntry]) -> Vec<LedgerDiscrepancy> {
    let mut issues = Vec::new();
    let mut running: BTreeMap<(&str, &str), i64> = BTreeMap::new();

    for e in entries {
        let key = (e.product_id.as_str(), e.location_id.as_str());
        let expected_before = running.get(&key).copied().unwrap_or(0);
        if e.quantity_before != expected_before || !e.is_consistent() {
            issues.push(LedgerDiscrepancy::BrokenEntry {
                entry_id: e.id.clone(),
                product_id: e.product_id.clone(),
                location_id: e.location_id.clone(),
                expected_before,
                actual_before: e.quantity_before,
            });
        }
        running.insert(key, expected_before + e.delta);
    }

    for p in products {
        let mut location_ids: Vec<&str> = p.locations.keys().map(String::as_str).collect();
        location_ids.extend(
            running
                .keys()
                .filter(|(pid, _)| *pid == p.id)
                .map(|(_, lid)| *lid),
        );
        location_ids.sort_unstable();
        location_ids.dedup();

        for lid in location_ids {
            let stored = p.quantity_at(lid);
            let replayed = running.get(&(p.id.as_str(), lid)).copied().unwrap_or(0);
            if stored != replayed {
                issues.push(LedgerDiscrepancy::QuantityMismatch {
                    product_id: p.id.clone(),
                    location_id: lid.to_string(),
                    stored,
                    replayed,
                });
            }
        }
    }

    issues
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MovementKind;

    fn product(id: &str, cost: i64, locations: &[(&str, i64)]) -> Product {
        Product {
            id: id.to_string(),
            tenant_id: "t".to_string(),
            sku: None,
            name: id.to_uppercase(),
            category_id: None,
            supplier_id: None,
            unit: "un".to_string(),
            unit_cost_cents: cost,
            min_stock: 0,
            locations: locations.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(
        product: &str,
        location: &str,
        kind: MovementKind,
        before: i64,
        delta: i64,
        at: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: format!("{}-{}-{}-{}", product, location, before, delta),
            tenant_id: "t".to_string(),
            product_id: product.to_string(),
            product_name: product.to_uppercase(),
            location_id: location.to_string(),
            location_name: location.to_string(),
            kind,
            delta,
            quantity_before: before,
            quantity_after: before + delta,
            counterpart_location_id: None,
            user_id: "u".to_string(),
            user_name: "u".to_string(),
            reason: None,
            count_session_id: None,
            created_at: at,
        }
    }

    #[test]
    fn test_valuation_sums_quantity_times_cost() {
        let products = vec![
            product("a", 250, &[("L1", 4)]),
            product("b", 100, &[("L1", 1), ("L2", 2)]),
        ];
        let report = valuation(&products);
        assert_eq!(report.lines[0].value.cents(), 1000);
        assert_eq!(report.total_quantity, 7);
        assert_eq!(report.total_value.cents(), 1300);
        assert_eq!(valuation(&[]).total_value, Money::zero());
    }

    #[test]
    fn test_abc_classes_by_cumulative_share() {
        let now = Utc::now();
        let recent = now - Duration::days(3);
        let products = vec![
            product("a", 100, &[]),
            product("b", 100, &[]),
            product("c", 100, &[]),
            product("idle", 100, &[("L1", 9)]),
        ];
        let entries = vec![
            entry("c", "L1", MovementKind::Exit, 10, -5, recent),
            entry("a", "L1", MovementKind::Exit, 100, -80, recent),
            entry("b", "L1", MovementKind::TransferOut, 50, -15, recent),
            // outside the window
            entry("c", "L1", MovementKind::Exit, 500, -400, now - Duration::days(200)),
            // inbound never counts
            entry("b", "L2", MovementKind::TransferIn, 0, 15, recent),
        ];

        let lines = abc_classification(&products, &entries, now, Duration::days(90));
        let classes: Vec<(&str, AbcClass)> = lines
            .iter()
            .map(|l| (l.product_id.as_str(), l.class))
            .collect();
        assert_eq!(
            classes,
            vec![("a", AbcClass::A), ("b", AbcClass::B), ("c", AbcClass::C)]
        );
        assert_eq!(lines[0].share_bps, 8000);
        assert_eq!(lines[2].cumulative_share_bps, 10_000);
    }

    #[test]
    fn test_abc_empty_without_consumption() {
        let products = vec![product("a", 100, &[("L1", 3)])];
        assert!(abc_classification(&products, &[], Utc::now(), Duration::days(90)).is_empty());
    }

    #[test]
    fn test_abc_ties_keep_input_order() {
        let now = Utc::now();
        let products = vec![product("x", 100, &[]), product("y", 100, &[])];
        let entries = vec![
            entry("y", "L1", MovementKind::Exit, 10, -2, now),
            entry("x", "L1", MovementKind::Exit, 10, -2, now),
        ];
        let lines = abc_classification(&products, &entries, now, Duration::days(1));
        assert_eq!(lines[0].product_id, "x");
        assert_eq!(lines[1].product_id, "y");
    }

    #[test]
    fn test_dead_stock_includes_never_moved() {
        let now = Utc::now();
        let products = vec![
            product("fresh", 100, &[("L1", 5)]),
            product("stale", 100, &[("L1", 5)]),
            product("never", 300, &[("L1", 1)]),
            product("empty", 100, &[]),
        ];
        let entries = vec![
            entry("fresh", "L1", MovementKind::Exit, 6, -1, now - Duration::days(10)),
            entry("stale", "L1", MovementKind::Exit, 6, -1, now - Duration::days(400)),
        ];

        let lines = dead_stock(&products, &entries, now, Duration::days(180));
        let ids: Vec<&str> = lines.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ids, vec!["stale", "never"]);
        assert_eq!(lines[0].idle_days, Some(400));
        assert_eq!(lines[1].last_outbound_at, None);
        assert_eq!(lines[1].dead_value.cents(), 300);
    }

    #[test]
    fn test_window_longer_than_calendar_covers_all_history() {
        let now = Utc::now();
        let huge = Duration::days(100_000_000);
        let products = vec![product("a", 100, &[("L1", 5)]), product("never", 100, &[("L1", 1)])];
        let entries = vec![entry("a", "L1", MovementKind::Exit, 6, -1, now - Duration::days(4000))];

        let abc = abc_classification(&products, &entries, now, huge);
        assert_eq!(abc.len(), 1);
        assert_eq!(abc[0].product_id, "a");

        let dead = dead_stock(&products, &entries, now, huge);
        let ids: Vec<&str> = dead.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ids, vec!["never"]);

        assert!(dead_stock(&[], &[], now, huge).is_empty());
    }

    #[test]
    fn test_replay_and_verify() {
        let now = Utc::now();
        let p = product("a", 100, &[("L1", 6), ("L2", 4)]);
        let entries = vec![
            entry("a", "L1", MovementKind::InitialEntry, 0, 10, now),
            entry("a", "L1", MovementKind::TransferOut, 10, -4, now),
            entry("a", "L2", MovementKind::TransferIn, 0, 4, now),
        ];

        let replayed = replay_location_quantities(&entries);
        assert_eq!(replayed[&("a".to_string(), "L1".to_string())], 6);
        assert!(verify_ledger(&[p.clone()], &entries).is_empty());

        let mut drifted = p;
        drifted.locations.insert("L2".to_string(), 5);
        assert_eq!(
            verify_ledger(&[drifted], &entries),
            vec![LedgerDiscrepancy::QuantityMismatch {
                product_id: "a".to_string(),
                location_id: "L2".to_string(),
                stored: 5,
                replayed: 4,
            }]
        );
    }

    #[test]
    fn test_verify_flags_broken_chain() {
        let now = Utc::now();
        let p = product("a", 100, &[("L1", 7)]);
        let entries = vec![
            entry("a", "L1", MovementKind::InitialEntry, 0, 10, now),
            entry("a", "L1", MovementKind::Exit, 9, -3, now),
        ];
        let issues = verify_ledger(&[p], &entries);
        assert!(matches!(
            issues.first(),
            Some(LedgerDiscrepancy::BrokenEntry {
                expected_before: 10,
                actual_before: 9,
                ..
            })
        ));
    }
}
