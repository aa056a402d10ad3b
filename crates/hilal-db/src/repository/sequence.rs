//! # Sequence Generator
//!
//! Monotonic counters per (organization, kind, year), used for invoice
//! numbering.
//!
//! ## Race Safety
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WRONG (read-then-write):                                               │
//! │    SELECT value ... ; UPDATE sequences SET value = value_read + 1       │
//! │    → two concurrent sales can both read 41 and both issue H2600042     │
//! │                                                                         │
//! │  RIGHT (this module):                                                   │
//! │    INSERT .. ON CONFLICT(org_id, kind, year)                           │
//! │    DO UPDATE SET value = value + 1                                     │
//! │    RETURNING value                                                     │
//! │    → a single atomic statement; the database serializes increments     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;

use crate::error::DbResult;
use hilal_core::TenantContext;

/// Atomically increments (creating on first use) the counter for
/// (org, kind, year) and returns the new value. First call returns 1.
pub(crate) async fn next_value(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    kind: &str,
    year: i32,
) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        "INSERT INTO sequences (org_id, kind, year, value) \
         VALUES (?1, ?2, ?3, 1) \
         ON CONFLICT (org_id, kind, year) DO UPDATE SET value = value + 1 \
         RETURNING value",
    )
    .bind(&ctx.org_id)
    .bind(kind)
    .bind(year)
    .fetch_one(conn)
    .await?;

    Ok(value)
}

// =============================================================================
// Unit Tests
// =============================================================================
