//! # Audit Trail Model
//!
//! Structured before/after diff of a sale edit, appended as an immutable
//! log entry.
//!
//! ## Diff Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SaleAudit.changes (JSON)                           │
//! │                                                                         │
//! │  {                                                                      │
//! │    "old_total_cents": 120000,                                          │
//! │    "new_total_cents": 135000,                                          │
//! │    "item_changes": [                                                   │
//! │      { "kind": "modified", "name": "Nova X2", "old_qty": 2, ... },     │
//! │      { "kind": "added",    "name": "Case",    "new_qty": 1, ... }      │
//! │    ]                                                                   │
//! │  }                                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ItemChange` is a tagged union, never an untyped map: consumers match on
//! `kind` and get exactly the fields that kind carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Item Change
// =============================================================================

/// One structural difference between the old and new state of a sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemChange {
    /// Product absent before the edit.
    Added {
        name: String,
        new_qty: i64,
        new_price_cents: i64,
    },
    /// Product present before, absent now.
    Removed {
        name: String,
        old_qty: i64,
        old_price_cents: i64,
    },
    /// Product present before and now, with different quantity or price.
    Modified {
        name: String,
        old_qty: i64,
        new_qty: i64,
        old_price_cents: i64,
        new_price_cents: i64,
    },
}

// =============================================================================
// Line Snapshot & Diffing
// =============================================================================

/// Immutable snapshot of one product's old state, taken before any mutation
/// so the diff never compares a structure against itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Compares an incoming line against the old-state snapshot for the same
/// product.
///
/// Returns `None` when the values are equal (no change recorded), `Added`
/// when the product was absent before, and `Modified` otherwise.
pub fn diff_line(
    old: Option<&LineSnapshot>,
    name: &str,
    new_qty: i64,
    new_price_cents: i64,
) -> Option<ItemChange> {
    match old {
        None => Some(ItemChange::Added {
            name: name.to_string(),
            new_qty,
            new_price_cents,
        }),
        Some(prev) if prev.quantity == new_qty && prev.unit_price_cents == new_price_cents => None,
        Some(prev) => Some(ItemChange::Modified {
            name: name.to_string(),
            old_qty: prev.quantity,
            new_qty,
            old_price_cents: prev.unit_price_cents,
            new_price_cents,
        }),
    }
}

/// The `Removed` entry for a product left over in the old-state map after
/// all incoming lines were consumed.
pub fn removed_line(snapshot: &LineSnapshot) -> ItemChange {
    ItemChange::Removed {
        name: snapshot.name.clone(),
        old_qty: snapshot.quantity,
        old_price_cents: snapshot.unit_price_cents,
    }
}

// =============================================================================
// Audit Changes Payload
// =============================================================================

/// The structured payload persisted in `sale_audits.changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditChanges {
    pub old_total_cents: i64,
    pub new_total_cents: i64,
    pub item_changes: Vec<ItemChange>,
}

impl AuditChanges {
    /// Serializes the payload for storage.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes a stored payload.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

// =============================================================================
// Sale Audit Record
// =============================================================================

/// One immutable audit row: who changed a sale, why, and the diff.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleAudit {
    pub id: String,
    pub org_id: String,
    pub sale_id: String,
    pub operator_name: String,
    pub reason: String,
    /// Serialized [`AuditChanges`].
    pub changes: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleAudit {
    /// Parses the stored diff payload.
    pub fn parsed_changes(&self) -> serde_json::Result<AuditChanges> {
        AuditChanges::from_json(&self.changes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
