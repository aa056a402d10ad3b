//! # Account Repository
//!
//! Row access for cash/bank accounts and their transaction log. Every
//! non-credit payment leaves exactly one account transaction, keyed by the
//! payment id so a payment revert can find and remove its own entries.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{Account, AccountTransaction, CoreError, TenantContext};

const ACCOUNT_COLUMNS: &str = "id, org_id, name, balance_cents, created_at";

const TRANSACTION_COLUMNS: &str = "id, org_id, account_id, payment_id, amount_cents, created_at";

/// Repository for account reads.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Gets an account by ID (tenant-scoped).
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DbResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE org_id = ?1 AND id = ?2"
        ))
        .bind(&ctx.org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Lists all accounts for an organization.
    pub async fn list(&self, ctx: &TenantContext) -> DbResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE org_id = ?1 ORDER BY name"
        ))
        .bind(&ctx.org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Lists an account's transactions, newest first.
    pub async fn list_transactions(
        &self,
        ctx: &TenantContext,
        account_id: &str,
    ) -> DbResult<Vec<AccountTransaction>> {
        let transactions = sqlx::query_as::<_, AccountTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM account_transactions \
             WHERE org_id = ?1 AND account_id = ?2 ORDER BY created_at DESC, id"
        ))
        .bind(&ctx.org_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches an account on the transaction connection, `NotFound` when missing.
pub(crate) async fn fetch_account(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: &str,
) -> LedgerResult<Account> {
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE org_id = ?1 AND id = ?2"
    ))
    .bind(&ctx.org_id)
    .bind(id)
    .fetch_optional(conn)
    .await?;

    account.ok_or_else(|| LedgerError::Core(CoreError::not_found("Account", id)))
}

/// Applies a delta to an account balance.
pub(crate) async fn adjust_balance(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    account_id: &str,
    delta_cents: i64,
) -> LedgerResult<()> {
    debug!(account_id, delta_cents, "Adjusting account balance");

    let result = sqlx::query(
        "UPDATE accounts SET balance_cents = balance_cents + ?1 \
         WHERE org_id = ?2 AND id = ?3",
    )
    .bind(delta_cents)
    .bind(&ctx.org_id)
    .bind(account_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::Core(CoreError::not_found(
            "Account", account_id,
        )));
    }

    Ok(())
}

/// Records one account transaction.
pub(crate) async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx: &AccountTransaction,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO account_transactions (\
             id, org_id, account_id, payment_id, amount_cents, created_at\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&tx.id)
    .bind(&tx.org_id)
    .bind(&tx.account_id)
    .bind(&tx.payment_id)
    .bind(tx.amount_cents)
    .bind(tx.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Deletes the account transactions attached to a payment.
pub(crate) async fn delete_transactions_for_payment(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    payment_id: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM account_transactions WHERE org_id = ?1 AND payment_id = ?2")
        .bind(&ctx.org_id)
        .bind(payment_id)
        .execute(conn)
        .await?;

    Ok(())
}
