//! # Movement Ledger (Kardex)
//!
//! The append-only record of every quantity change, one entry per location
//! touched by a committed mutation.
//!
//! ## Entry Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_transfer(P, from: L1, to: L2, qty: 4)                            │
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │ transfer_out @ L1            │   │ transfer_in @ L2             │   │
//! │  │ delta      -4                │   │ delta      +4                │   │
//! │  │ before     10                │   │ before      0                │   │
//! │  │ after       6                │   │ after       4                │   │
//! │  │ counterpart L2               │   │ counterpart L1               │   │
//! │  └──────────────────────────────┘   └──────────────────────────────┘   │
//! │                                                                         │
//! │  Invariant: after = before + delta, and before equals the `after` of    │
//! │  the previous entry for the same (product, location).                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Legacy Shapes
//! Older records use free-text movement types ("saida", "Entrada Inicial",
//! ...) and unsigned quantities. [`MovementKind::from_str`] accepts those
//! labels; [`crate::legacy`] turns whole records into canonical mutations
//! when old history is imported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Movement Kind
// =============================================================================

/// The kind of quantity change a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// First stock ever placed at a location for a product.
    InitialEntry,
    /// Operator correction or restock; may be positive or negative.
    ManualAdjustment,
    /// Receiving leg of a transfer.
    TransferIn,
    /// Sending leg of a transfer.
    TransferOut,
    /// Stock leaving the business (sale, consumption, loss).
    Exit,
}

impl MovementKind {
    /// Canonical storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementKind::InitialEntry => "initial_entry",
            MovementKind::ManualAdjustment => "manual_adjustment",
            MovementKind::TransferIn => "transfer_in",
            MovementKind::TransferOut => "transfer_out",
            MovementKind::Exit => "exit",
        }
    }

    /// Movements that count as consumption for ABC and dead-stock reports.
    pub const fn is_outbound(&self) -> bool {
        matches!(self, MovementKind::Exit | MovementKind::TransferOut)
    }

    /// Whether `delta` has the sign this kind requires.
    pub const fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            MovementKind::InitialEntry | MovementKind::TransferIn => delta > 0,
            MovementKind::TransferOut | MovementKind::Exit => delta < 0,
            MovementKind::ManualAdjustment => delta != 0,
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = ValidationError;

    /// Parses canonical names and the legacy labels still found in older
    /// movement records.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "initial_entry" | "entrada inicial" => Ok(MovementKind::InitialEntry),
            "manual_adjustment" | "ajuste manual" | "ajuste" | "entrada" | "entry" => {
                Ok(MovementKind::ManualAdjustment)
            }
            "transfer_in" => Ok(MovementKind::TransferIn),
            "transfer_out" => Ok(MovementKind::TransferOut),
            "exit" | "saida" | "saída" => Ok(MovementKind::Exit),
            other => Err(ValidationError::InvalidFormat {
                field: "movement_type".to_string(),
                reason: format!("unknown movement type '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// One immutable kardex record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    /// Product name at write time.
    pub product_name: String,
    pub location_id: String,
    /// Location name at write time.
    pub location_name: String,
    pub kind: MovementKind,
    /// Signed quantity change.
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    /// The other leg's location for transfers.
    pub counterpart_location_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub reason: Option<String>,
    /// Set when the entry was produced by applying a count session.
    pub count_session_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Checks the arithmetic and sign invariants of a single entry.
    pub fn is_consistent(&self) -> bool {
        self.quantity_before + self.delta == self.quantity_after
            && self.quantity_before >= 0
            && self.quantity_after >= 0
            && self.kind.accepts_delta(self.delta)
    }

    /// Absolute quantity moved.
    #[inline]
    pub fn quantity(&self) -> i64 {
        self.delta.abs()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_and_legacy_names() {
        assert_eq!("exit".parse::<MovementKind>().unwrap(), MovementKind::Exit);
        assert_eq!("saida".parse::<MovementKind>().unwrap(), MovementKind::Exit);
        assert_eq!(
            "Entrada Inicial".parse::<MovementKind>().unwrap(),
            MovementKind::InitialEntry
        );
        assert_eq!(
            "Ajuste Manual".parse::<MovementKind>().unwrap(),
            MovementKind::ManualAdjustment
        );
        assert_eq!(
            "transfer_out".parse::<MovementKind>().unwrap(),
            MovementKind::TransferOut
        );
        assert!("teleport".parse::<MovementKind>().is_err());
    }

    #[test]
    fn test_display_round_trips_canonical_name() {
        for kind in [
            MovementKind::InitialEntry,
            MovementKind::ManualAdjustment,
            MovementKind::TransferIn,
            MovementKind::TransferOut,
            MovementKind::Exit,
        ] {
            assert_eq!(kind.to_string().parse::<MovementKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_sign_rules() {
        assert!(MovementKind::Exit.accepts_delta(-1));
        assert!(!MovementKind::Exit.accepts_delta(1));
        assert!(MovementKind::TransferIn.accepts_delta(4));
        assert!(!MovementKind::ManualAdjustment.accepts_delta(0));
    }

    #[test]
    fn test_json_uses_canonical_names() {
        assert_eq!(
            serde_json::to_string(&MovementKind::TransferOut).unwrap(),
            "\"transfer_out\""
        );
        let parsed: MovementKind = serde_json::from_str("\"initial_entry\"").unwrap();
        assert_eq!(parsed, MovementKind::InitialEntry);
    }
}
