//! # Instance Allocator
//!
//! Inventory-unit state transitions: reserve, release, warranty-dispose.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Instance Lifecycle                                 │
//! │                                                                         │
//! │   intake (out of scope)                                                │
//! │       │                                                                 │
//! │       ▼        reserve_*                                               │
//! │   IN_STOCK ───────────────► SOLD                                       │
//! │       ▲                      │  │                                       │
//! │       │       release        │  │  dispose (explicit warranty          │
//! │       └──────────────────────┘  │  decision only, keeps sale_id)       │
//! │                                 ▼                                       │
//! │                        RETURNED / DEFECTIVE                             │
//! │                                                                         │
//! │   Invariant: status == SOLD ⇔ sale_id IS NOT NULL                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Race Safety
//! The "find available" query and the "mark SOLD" update run on the same
//! transaction connection, and every mark-SOLD update is guarded by
//! `status = 'in_stock'` with a `rows_affected` check. Of two transactions
//! racing for the last unit, exactly one commits; the loser surfaces
//! `InsufficientStock` (empty find) or `ConcurrencyConflict` (guard failed).

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{
    CoreError, Instance, InstanceStatus, TenantContext, WarrantyKind, GENERIC_SERIAL,
};

/// Repository for instance reads. All mutations go through the transactional
/// allocator functions below, which the sale ledger drives.
#[derive(Debug, Clone)]
pub struct InstanceRepository {
    pool: SqlitePool,
}

const INSTANCE_COLUMNS: &str = "id, org_id, product_id, serial_number, status, sale_id, \
     sold_price_cents, cost_cents, warranty_note, warranty_decided_by, warranty_decided_at, \
     created_at, updated_at";

impl InstanceRepository {
    /// Creates a new InstanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InstanceRepository { pool }
    }

    /// Gets an instance by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Instance>> {
        let instance = sqlx::query_as::<_, Instance>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(instance)
    }

    /// Lists every instance attached to a sale, oldest allocation first.
    pub async fn list_for_sale(
        &self,
        ctx: &TenantContext,
        sale_id: &str,
    ) -> DbResult<Vec<Instance>> {
        let instances = sqlx::query_as::<_, Instance>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances \
             WHERE org_id = ?1 AND sale_id = ?2 \
             ORDER BY created_at, id"
        ))
        .bind(&ctx.org_id)
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    /// Counts in-stock units for a product (serialized and generic alike).
    pub async fn count_in_stock(&self, ctx: &TenantContext, product_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM instances \
             WHERE org_id = ?1 AND product_id = ?2 AND status = 'in_stock'",
        )
        .bind(&ctx.org_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Transactional allocator operations
// =============================================================================

/// Loads the sold instances of a sale on the transaction connection,
/// oldest allocation first.
pub(crate) async fn fetch_sold_for_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<Vec<Instance>> {
    let instances = sqlx::query_as::<_, Instance>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances \
         WHERE org_id = ?1 AND sale_id = ?2 AND status = 'sold' \
         ORDER BY created_at, id"
    ))
    .bind(&ctx.org_id)
    .bind(sale_id)
    .fetch_all(conn)
    .await?;

    Ok(instances)
}

/// Loads every instance still pointing at a sale, regardless of status.
/// Used by the deletion cascade, which releases them all.
pub(crate) async fn fetch_all_for_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<Vec<Instance>> {
    let instances = sqlx::query_as::<_, Instance>(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM instances \
         WHERE org_id = ?1 AND sale_id = ?2 \
         ORDER BY created_at, id"
    ))
    .bind(&ctx.org_id)
    .bind(sale_id)
    .fetch_all(conn)
    .await?;

    Ok(instances)
}

/// Reserves one in-stock instance for each requested serial.
///
/// ## Lookup Order
/// 1. An in-stock instance with exactly that serial.
/// 2. An in-stock generic placeholder (`NULL`/`N/A` serial) for the same
///    product, which is relabeled with the serial - phones often arrive in
///    bulk and get their IMEI recorded at the counter, not at intake.
///
/// Fails with `InsufficientStock` naming the serial when neither exists.
pub(crate) async fn reserve_serialized(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
    product_id: &str,
    sold_price_cents: i64,
    serials: &[String],
) -> LedgerResult<Vec<String>> {
    let mut reserved = Vec::with_capacity(serials.len());

    for serial in serials {
        let exact: Option<String> = sqlx::query_scalar(
            "SELECT id FROM instances \
             WHERE org_id = ?1 AND product_id = ?2 AND status = 'in_stock' \
               AND serial_number = ?3 \
             LIMIT 1",
        )
        .bind(&ctx.org_id)
        .bind(product_id)
        .bind(serial)
        .fetch_optional(&mut *conn)
        .await?;

        let instance_id = match exact {
            Some(id) => id,
            None => {
                let placeholder: Option<String> = sqlx::query_scalar(
                    "SELECT id FROM instances \
                     WHERE org_id = ?1 AND product_id = ?2 AND status = 'in_stock' \
                       AND (serial_number IS NULL OR serial_number = ?3) \
                     ORDER BY created_at, id \
                     LIMIT 1",
                )
                .bind(&ctx.org_id)
                .bind(product_id)
                .bind(GENERIC_SERIAL)
                .fetch_optional(&mut *conn)
                .await?;

                match placeholder {
                    Some(id) => {
                        debug!(instance_id = %id, serial = %serial, "Relabeling generic placeholder");
                        sqlx::query(
                            "UPDATE instances SET serial_number = ?1, updated_at = ?2 \
                             WHERE id = ?3",
                        )
                        .bind(serial)
                        .bind(Utc::now())
                        .bind(&id)
                        .execute(&mut *conn)
                        .await?;
                        id
                    }
                    None => {
                        return Err(LedgerError::Core(CoreError::InsufficientStock {
                            product_id: product_id.to_string(),
                            serial: Some(serial.clone()),
                            available: 0,
                            requested: 1,
                        }))
                    }
                }
            }
        };

        mark_sold(conn, ctx, &instance_id, sale_id, sold_price_cents).await?;
        reserved.push(instance_id);
    }

    Ok(reserved)
}

/// Reserves exactly one in-stock instance carrying the given serial, with no
/// placeholder fallback. Used by sale edits, where an added serial must name
/// a unit that is really on the shelf; fails with `SerialUnavailable`.
pub(crate) async fn reserve_exact_serial(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
    product_id: &str,
    sold_price_cents: i64,
    serial: &str,
) -> LedgerResult<String> {
    let found: Option<String> = sqlx::query_scalar(
        "SELECT id FROM instances \
         WHERE org_id = ?1 AND product_id = ?2 AND status = 'in_stock' \
           AND serial_number = ?3 \
         LIMIT 1",
    )
    .bind(&ctx.org_id)
    .bind(product_id)
    .bind(serial)
    .fetch_optional(&mut *conn)
    .await?;

    let instance_id = found.ok_or_else(|| {
        LedgerError::Core(CoreError::SerialUnavailable {
            serial: serial.to_string(),
        })
    })?;

    mark_sold(conn, ctx, &instance_id, sale_id, sold_price_cents).await?;
    Ok(instance_id)
}

/// Reserves the `quantity` oldest in-stock generic instances of a product
/// (FIFO by creation time).
pub(crate) async fn reserve_generic(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
    product_id: &str,
    sold_price_cents: i64,
    quantity: i64,
) -> LedgerResult<Vec<String>> {
    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM instances \
         WHERE org_id = ?1 AND product_id = ?2 AND status = 'in_stock' \
           AND (serial_number IS NULL OR serial_number = ?3) \
         ORDER BY created_at, id \
         LIMIT ?4",
    )
    .bind(&ctx.org_id)
    .bind(product_id)
    .bind(GENERIC_SERIAL)
    .bind(quantity)
    .fetch_all(&mut *conn)
    .await?;

    if (candidates.len() as i64) < quantity {
        return Err(LedgerError::Core(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            serial: None,
            available: candidates.len() as i64,
            requested: quantity,
        }));
    }

    debug!(
        product_id = %product_id,
        quantity = %quantity,
        "Reserving generic instances (FIFO)"
    );

    for instance_id in &candidates {
        mark_sold(conn, ctx, instance_id, sale_id, sold_price_cents).await?;
    }

    Ok(candidates)
}

/// Marks one instance SOLD, guarded by `status = 'in_stock'`.
async fn mark_sold(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    instance_id: &str,
    sale_id: &str,
    sold_price_cents: i64,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE instances \
         SET status = ?1, sale_id = ?2, sold_price_cents = ?3, updated_at = ?4 \
         WHERE org_id = ?5 AND id = ?6 AND status = 'in_stock'",
    )
    .bind(InstanceStatus::Sold)
    .bind(sale_id)
    .bind(sold_price_cents)
    .bind(Utc::now())
    .bind(&ctx.org_id)
    .bind(instance_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        // The row vanished between find and mark: a concurrent transaction
        // took the unit.
        return Err(LedgerError::Core(CoreError::conflict(format!(
            "instance {instance_id} was taken by a concurrent sale"
        ))));
    }

    Ok(())
}

/// Releases instances back to stock: in_stock, no sale, no sold price,
/// warranty fields cleared.
pub(crate) async fn release(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    instance_ids: &[String],
) -> DbResult<()> {
    if instance_ids.is_empty() {
        return Ok(());
    }

    debug!(count = instance_ids.len(), "Releasing instances to stock");

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "UPDATE instances \
         SET status = 'in_stock', sale_id = NULL, sold_price_cents = NULL, \
             warranty_note = NULL, warranty_decided_by = NULL, warranty_decided_at = NULL, \
             updated_at = ",
    );
    builder.push_bind(Utc::now());
    builder.push(" WHERE org_id = ");
    builder.push_bind(&ctx.org_id);
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in instance_ids {
        separated.push_bind(id);
    }
    builder.push(")");

    builder.build().execute(conn).await?;
    Ok(())
}

/// Applies an explicit warranty decision to one sold instance.
///
/// The instance keeps its `sale_id` for traceability; only the status flips
/// and the decision metadata is stamped. Never called as a side effect of
/// ordinary removal - plain removals go through [`release`].
pub(crate) async fn dispose(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    instance_id: &str,
    kind: WarrantyKind,
    note: Option<&str>,
    actor_name: &str,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE instances \
         SET status = ?1, warranty_note = ?2, warranty_decided_by = ?3, \
             warranty_decided_at = ?4, updated_at = ?4 \
         WHERE org_id = ?5 AND id = ?6 AND status = 'sold'",
    )
    .bind(kind.status())
    .bind(note)
    .bind(actor_name)
    .bind(Utc::now())
    .bind(&ctx.org_id)
    .bind(instance_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Core(CoreError::not_found(
            "Sold instance",
            instance_id,
        )));
    }

    Ok(())
}

/// Updates the sold price (and optionally the warranty note) on instances
/// that stay attached to a sale across an edit.
pub(crate) async fn update_sold_terms(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    instance_ids: &[String],
    sold_price_cents: i64,
    warranty_note: Option<&str>,
) -> DbResult<()> {
    if instance_ids.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("UPDATE instances SET sold_price_cents = ");
    builder.push_bind(sold_price_cents);
    if let Some(note) = warranty_note {
        builder.push(", warranty_note = ");
        builder.push_bind(note);
    }
    builder.push(", updated_at = ");
    builder.push_bind(Utc::now());
    builder.push(" WHERE org_id = ");
    builder.push_bind(&ctx.org_id);
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in instance_ids {
        separated.push_bind(id);
    }
    builder.push(")");

    builder.build().execute(conn).await?;
    Ok(())
}
