//! # Legacy History Import
//!
//! Older stores kept movements with free-text types ("saida", "Entrada
//! Inicial", "ajuste"), unsigned quantities and, for transfers, two separate
//! records. This module turns those records into canonical
//! [`StockMutation`]s so old history can be replayed through the engine and
//! land in the ledger like any other movement.
//!
//! ## Replay Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  legacy record                          replayed as                     │
//! │  ─────────────────────────────────────  ──────────────────────────────  │
//! │  Entrada Inicial, +q                    Entry { q }                     │
//! │  entrada / ajuste, +q                   Entry { q }                     │
//! │  ajuste with newStock = n               Adjustment { n }                │
//! │  ajuste, -q (no snapshot)               Correction { -q }               │
//! │  saida, q                               Exit { q }                      │
//! │  transfer_out L1 q + transfer_in L2 q   Transfer { L1 → L2, q }         │
//! │  zero change                            skipped                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records keep their file order. A `transfer_out` must be immediately
//! followed by its `transfer_in` leg for the same product and quantity.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ledger::MovementKind;
use crate::mutation::StockMutation;

// =============================================================================
// Legacy Shapes
// =============================================================================

/// The movement part of a legacy record.
///
/// Older records carry an unsigned `quantity` and a free-text type; the
/// separate `movements` collection carried before/after snapshots instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyMovement {
    #[serde(alias = "type")]
    pub movement_type: String,
    pub quantity: i64,
    #[serde(default, alias = "previousStock")]
    pub quantity_before: Option<i64>,
    #[serde(default, alias = "newStock")]
    pub quantity_after: Option<i64>,
}

/// A legacy movement normalized to the canonical kind and a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedMovement {
    pub kind: MovementKind,
    pub delta: i64,
}

impl LegacyMovement {
    /// Normalizes to a canonical kind and signed delta.
    ///
    /// Snapshots win when both are present; otherwise the sign follows the
    /// kind (outbound kinds are negative).
    pub fn normalize(&self) -> Result<NormalizedMovement, ValidationError> {
        let kind: MovementKind = self.movement_type.parse()?;

        let delta = match (self.quantity_before, self.quantity_after) {
            (Some(before), Some(after)) => after - before,
            _ if kind.is_outbound() => -self.quantity.abs(),
            _ if kind == MovementKind::ManualAdjustment && !is_legacy_entry(&self.movement_type) => {
                self.quantity
            }
            _ => self.quantity.abs(),
        };

        Ok(NormalizedMovement { kind, delta })
    }
}

fn is_legacy_entry(movement_type: &str) -> bool {
    matches!(movement_type.trim().to_lowercase().as_str(), "entrada" | "entry")
}

/// One exported legacy record.
///
/// `product_id` and `location_id` hold whatever the old store used; the
/// caller resolves them (by id, SKU or name) before replaying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(alias = "productId", alias = "product")]
    pub product_id: String,
    #[serde(default, alias = "locationId", alias = "location")]
    pub location_id: Option<String>,
    #[serde(flatten)]
    pub movement: LegacyMovement,
    #[serde(default, alias = "motive", alias = "details")]
    pub reason: Option<String>,
    #[serde(default, alias = "userEmail")]
    pub user: Option<String>,
}

// =============================================================================
// Replay Planning
// =============================================================================

/// One mutation to replay, still keyed by the legacy references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    /// Position of the (first) source record, 0-based.
    pub record: usize,
    pub product_id: String,
    pub mutation: StockMutation,
    pub reason: Option<String>,
    pub user: Option<String>,
}

/// Plans the replay of `records` in order.
///
/// Records without a location use `default_location`. Fails on the first
/// record that cannot be expressed as a canonical mutation; nothing is
/// planned past it.
pub fn plan_replay(
    records: &[LegacyRecord],
    default_location: Option<&str>,
) -> Result<Vec<ReplayStep>, ValidationError> {
    let mut steps = Vec::new();
    let mut index = 0;

    while index < records.len() {
        let first = index;
        let record = &records[index];
        let normalized = record
            .movement
            .normalize()
            .map_err(|err| invalid(index, err.to_string()))?;

        if normalized.delta == 0 {
            index += 1;
            continue;
        }

        let location = record_location(record, default_location, index)?;
        let mutation = match normalized.kind {
            MovementKind::InitialEntry if normalized.delta > 0 => StockMutation::Entry {
                location_id: location,
                quantity: normalized.delta,
            },
            MovementKind::InitialEntry => {
                return Err(invalid(index, "initial entry with a negative quantity"));
            }
            MovementKind::ManualAdjustment => match record.movement.quantity_after {
                Some(after) => StockMutation::Adjustment {
                    location_id: location,
                    new_quantity: after,
                },
                None if normalized.delta > 0 => StockMutation::Entry {
                    location_id: location,
                    quantity: normalized.delta,
                },
                None => StockMutation::Correction {
                    location_id: location,
                    delta: normalized.delta,
                },
            },
            MovementKind::Exit if normalized.delta < 0 => StockMutation::Exit {
                location_id: location,
                quantity: -normalized.delta,
            },
            MovementKind::Exit => return Err(invalid(index, "exit that increases stock")),
            MovementKind::TransferOut => {
                let to = matching_transfer_in(records, index, normalized.delta, default_location)?;
                index += 1;
                StockMutation::Transfer {
                    from: location,
                    to,
                    quantity: normalized.delta.abs(),
                }
            }
            MovementKind::TransferIn => {
                return Err(invalid(index, "transfer_in without a preceding transfer_out"));
            }
        };

        steps.push(ReplayStep {
            record: first,
            product_id: record.product_id.clone(),
            mutation,
            reason: record.reason.clone(),
            user: record.user.clone(),
        });
        index += 1;
    }

    Ok(steps)
}

fn record_location(
    record: &LegacyRecord,
    default_location: Option<&str>,
    index: usize,
) -> Result<String, ValidationError> {
    record
        .location_id
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .or(default_location)
        .map(str::to_string)
        .ok_or_else(|| invalid(index, "no location and no default location configured"))
}

/// The destination of the transfer whose outbound leg is at `index`.
fn matching_transfer_in(
    records: &[LegacyRecord],
    index: usize,
    out_delta: i64,
    default_location: Option<&str>,
) -> Result<String, ValidationError> {
    let unpaired = || invalid(index, "transfer_out is not followed by its transfer_in");

    let next = records.get(index + 1).ok_or_else(unpaired)?;
    let normalized = next.movement.normalize().map_err(|_| unpaired())?;
    if next.product_id != records[index].product_id
        || normalized.kind != MovementKind::TransferIn
        || normalized.delta != -out_delta
    {
        return Err(unpaired());
    }

    record_location(next, default_location, index + 1)
}

fn invalid(index: usize, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFormat {
        field: format!("record {}", index + 1),
        reason: reason.into(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
