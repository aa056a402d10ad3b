//! # Sale Repository
//!
//! Row access for sale headers. All mutations flow through the
//! [`crate::ledger::SaleLedger`] and [`crate::payments::PaymentEngine`],
//! which call the transactional functions below on their own connection;
//! the repository struct only serves reads.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{CoreError, Sale, TenantContext};

const SALE_COLUMNS: &str = "id, org_id, customer_id, invoice_number, total_cents, \
     amount_paid_cents, due_date, notes, operator_id, operator_name, last_modified_by, \
     modification_reason, created_at, updated_at";

/// Repository for sale reads.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Lists a customer's sales, oldest first.
    pub async fn list_for_customer(
        &self,
        ctx: &TenantContext,
        customer_id: &str,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE org_id = ?1 AND customer_id = ?2 \
             ORDER BY created_at, id"
        ))
        .bind(&ctx.org_id)
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Lists a customer's sales that still carry an outstanding balance
    /// above the given tolerance, oldest first.
    pub async fn list_outstanding_for_customer(
        &self,
        ctx: &TenantContext,
        customer_id: &str,
        tolerance_cents: i64,
    ) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE org_id = ?1 AND customer_id = ?2 \
               AND total_cents - amount_paid_cents > ?3 \
             ORDER BY created_at, id"
        ))
        .bind(&ctx.org_id)
        .bind(customer_id)
        .bind(tolerance_cents)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches a sale on the transaction connection, failing closed with
/// `NotFound` for missing or cross-tenant ids.
pub(crate) async fn fetch_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: &str,
) -> LedgerResult<Sale> {
    let sale = sqlx::query_as::<_, Sale>(&format!(
        "SELECT {SALE_COLUMNS} FROM sales WHERE org_id = ?1 AND id = ?2"
    ))
    .bind(&ctx.org_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;

    sale.ok_or_else(|| LedgerError::Core(CoreError::not_found("Sale", id)))
}

/// Loads the named sales sorted by creation date ascending - the payment
/// cascade pays the oldest invoice first regardless of the order the caller
/// supplied the ids in. Fails `NotFound` when any id is missing or foreign.
pub(crate) async fn fetch_sales_oldest_first(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    ids: &[String],
) -> LedgerResult<Vec<Sale>> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE org_id = "));
    builder.push_bind(&ctx.org_id);
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    builder.push(") ORDER BY created_at, id");

    let sales: Vec<Sale> = builder
        .build_query_as()
        .fetch_all(conn)
        .await
        .map_err(crate::error::DbError::from)?;

    if let Some(missing) = ids.iter().find(|id| !sales.iter().any(|s| &s.id == *id)) {
        return Err(LedgerError::Core(CoreError::not_found("Sale", missing)));
    }

    Ok(sales)
}

/// Inserts a complete sale header.
pub(crate) async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, invoice_number = %sale.invoice_number, "Inserting sale");

    sqlx::query(
        "INSERT INTO sales (\
             id, org_id, customer_id, invoice_number, total_cents, amount_paid_cents, \
             due_date, notes, operator_id, operator_name, last_modified_by, \
             modification_reason, created_at, updated_at\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(&sale.id)
    .bind(&sale.org_id)
    .bind(&sale.customer_id)
    .bind(&sale.invoice_number)
    .bind(sale.total_cents)
    .bind(sale.amount_paid_cents)
    .bind(sale.due_date)
    .bind(&sale.notes)
    .bind(&sale.operator_id)
    .bind(&sale.operator_name)
    .bind(&sale.last_modified_by)
    .bind(&sale.modification_reason)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rewrites the editable header fields after a sale edit. The total is the
/// freshly recomputed sum, never a delta on the stored value.
pub(crate) async fn update_header(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
    customer_id: &str,
    total_cents: i64,
    last_modified_by: &str,
    modification_reason: &str,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE sales SET customer_id = ?1, total_cents = ?2, last_modified_by = ?3, \
             modification_reason = ?4, updated_at = ?5 \
         WHERE org_id = ?6 AND id = ?7",
    )
    .bind(customer_id)
    .bind(total_cents)
    .bind(last_modified_by)
    .bind(modification_reason)
    .bind(chrono::Utc::now())
    .bind(&ctx.org_id)
    .bind(sale_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Core(CoreError::not_found("Sale", sale_id)));
    }

    Ok(())
}

/// Applies a delta to a sale's amount_paid. Positive when a payment lands,
/// negative when one is reverted.
pub(crate) async fn apply_amount_paid_delta(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
    delta_cents: i64,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE sales SET amount_paid_cents = amount_paid_cents + ?1, updated_at = ?2 \
         WHERE org_id = ?3 AND id = ?4",
    )
    .bind(delta_cents)
    .bind(chrono::Utc::now())
    .bind(&ctx.org_id)
    .bind(sale_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Core(CoreError::not_found("Sale", sale_id)));
    }

    Ok(())
}

/// Deletes one sale header row.
pub(crate) async fn delete_sale_row(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM sales WHERE org_id = ?1 AND id = ?2")
        .bind(&ctx.org_id)
        .bind(sale_id)
        .execute(conn)
        .await?;

    Ok(())
}
