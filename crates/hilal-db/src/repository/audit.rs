//! # Audit Repository
//!
//! Append-only history of sale edits. One row per completed edit, carrying
//! the structured change set as a JSON document.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use hilal_core::{SaleAudit, TenantContext};

const AUDIT_COLUMNS: &str = "id, org_id, sale_id, operator_name, reason, changes, created_at";

/// Repository for sale audit reads.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Lists the audit trail for a sale, newest first.
    pub async fn list_for_sale(
        &self,
        ctx: &TenantContext,
        sale_id: &str,
    ) -> DbResult<Vec<SaleAudit>> {
        let audits = sqlx::query_as::<_, SaleAudit>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM sale_audits \
             WHERE org_id = ?1 AND sale_id = ?2 ORDER BY created_at DESC, id"
        ))
        .bind(&ctx.org_id)
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(audits)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Appends one audit entry.
pub(crate) async fn append(conn: &mut SqliteConnection, audit: &SaleAudit) -> DbResult<()> {
    debug!(sale_id = %audit.sale_id, operator = %audit.operator_name, "Appending sale audit");

    sqlx::query(
        "INSERT INTO sale_audits (\
             id, org_id, sale_id, operator_name, reason, changes, created_at\
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&audit.id)
    .bind(&audit.org_id)
    .bind(&audit.sale_id)
    .bind(&audit.operator_name)
    .bind(&audit.reason)
    .bind(&audit.changes)
    .bind(audit.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Removes a sale's audit trail. Only sale deletion calls this; edits never
/// rewrite history.
pub(crate) async fn delete_for_sale(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM sale_audits WHERE org_id = ?1 AND sale_id = ?2")
        .bind(&ctx.org_id)
        .bind(sale_id)
        .execute(conn)
        .await?;

    Ok(())
}
