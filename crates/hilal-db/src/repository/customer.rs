//! # Customer Repository
//!
//! Row access for customers, including the store-credit balance that the
//! payment engine debits and credits.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{CoreError, Customer, TenantContext};

const CUSTOMER_COLUMNS: &str =
    "id, org_id, name, tax_id, credit_balance_cents, created_at, updated_at";

/// Repository for customer data access.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists all customers for an organization, alphabetically.
    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE org_id = ?1 ORDER BY name"
        ))
        .bind(&ctx.org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches a customer on the transaction connection, `NotFound` when missing
/// or belonging to another tenant.
pub(crate) async fn fetch_customer(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: &str,
) -> LedgerResult<Customer> {
    let customer = sqlx::query_as::<_, Customer>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE org_id = ?1 AND id = ?2"
    ))
    .bind(&ctx.org_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;

    customer.ok_or_else(|| LedgerError::Core(CoreError::not_found("Customer", id)))
}

/// Applies a delta to a customer's store-credit balance. A negative delta
/// that would drive the balance below zero is rejected with
/// `InsufficientCredit` rather than stored, so the guard lives in the same
/// statement as the write.
pub(crate) async fn adjust_credit(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    customer_id: &str,
    delta_cents: i64,
) -> LedgerResult<()> {
    debug!(customer_id, delta_cents, "Adjusting customer credit");

    let result = sqlx::query(
        "UPDATE customers SET credit_balance_cents = credit_balance_cents + ?1, updated_at = ?2 \
         WHERE org_id = ?3 AND id = ?4 AND credit_balance_cents + ?1 >= 0",
    )
    .bind(delta_cents)
    .bind(chrono::Utc::now())
    .bind(&ctx.org_id)
    .bind(customer_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing customer from a balance shortfall.
        let customer = fetch_customer(conn, ctx, customer_id).await?;
        return Err(LedgerError::Core(CoreError::InsufficientCredit {
            available_cents: customer.credit_balance_cents,
            requested_cents: -delta_cents,
        }));
    }

    Ok(())
}
