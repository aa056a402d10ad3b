//! # Payment Repository
//!
//! Row access for payment records. One payment row is written per sale the
//! distribution touched, so a single register call against three invoices
//! leaves three rows sharing a reference.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{CoreError, Payment, TenantContext};

const PAYMENT_COLUMNS: &str = "id, org_id, sale_id, amount_cents, method, account_id, reference, \
     operator_id, operator_name, last_modified_by, modification_reason, created_at";

/// Repository for payment reads.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Lists the payments recorded against a sale, oldest first.
    pub async fn list_for_sale(&self, ctx: &TenantContext, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE org_id = ?1 AND sale_id = ?2 ORDER BY created_at, id"
        ))
        .bind(&ctx.org_id)
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Sums the payments recorded against a sale.
    pub async fn total_for_sale(&self, ctx: &TenantContext, sale_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payments \
             WHERE org_id = ?1 AND sale_id = ?2",
        )
        .bind(&ctx.org_id)
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches a payment on the transaction connection, `NotFound` when missing.
pub(crate) async fn fetch_payment(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: &str,
) -> LedgerResult<Payment> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE org_id = ?1 AND id = ?2"
    ))
    .bind(&ctx.org_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;

    payment.ok_or_else(|| LedgerError::Core(CoreError::not_found("Payment", id)))
}

/// Lists all payments for a sale on the transaction connection.
pub(crate) async fn fetch_payments_for_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments \
         WHERE org_id = ?1 AND sale_id = ?2 ORDER BY created_at, id"
    ))
    .bind(&ctx.org_id)
    .bind(sale_id)
    .fetch_all(conn)
    .await?;

    Ok(payments)
}

/// Inserts one payment row.
pub(crate) async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(
        id = %payment.id,
        sale_id = %payment.sale_id,
        amount_cents = payment.amount_cents,
        "Inserting payment"
    );

    sqlx::query(
        "INSERT INTO payments (\
             id, org_id, sale_id, amount_cents, method, account_id, reference, \
             operator_id, operator_name, last_modified_by, modification_reason, created_at\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&payment.id)
    .bind(&payment.org_id)
    .bind(&payment.sale_id)
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(&payment.account_id)
    .bind(&payment.reference)
    .bind(&payment.operator_id)
    .bind(&payment.operator_name)
    .bind(&payment.last_modified_by)
    .bind(&payment.modification_reason)
    .bind(payment.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rewrites a payment row after an edit.
pub(crate) async fn update_payment_row(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    payment: &Payment,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE payments SET amount_cents = ?1, method = ?2, account_id = ?3, reference = ?4, \
             last_modified_by = ?5, modification_reason = ?6 \
         WHERE org_id = ?7 AND id = ?8",
    )
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(&payment.account_id)
    .bind(&payment.reference)
    .bind(&payment.last_modified_by)
    .bind(&payment.modification_reason)
    .bind(&ctx.org_id)
    .bind(&payment.id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Core(CoreError::not_found(
            "Payment",
            &payment.id,
        )));
    }

    Ok(())
}

/// Deletes one payment row.
pub(crate) async fn delete_payment_row(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    payment_id: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM payments WHERE org_id = ?1 AND id = ?2")
        .bind(&ctx.org_id)
        .bind(payment_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Deletes every payment row attached to a sale. Used by sale deletion after
/// their financial impact has been reversed.
pub(crate) async fn delete_payments_for_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM payments WHERE org_id = ?1 AND sale_id = ?2")
        .bind(&ctx.org_id)
        .bind(sale_id)
        .execute(conn)
        .await?;

    Ok(())
}
