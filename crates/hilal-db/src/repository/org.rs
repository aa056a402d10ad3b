//! # Organization Repository
//!
//! Row access for organizations. The ledger reads the grace period and
//! settlement tolerance from here at the top of every transaction.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{DbResult, LedgerError, LedgerResult};
use hilal_core::{CoreError, Organization, TenantContext};

const ORG_COLUMNS: &str = "id, name, grace_period_days, settlement_tolerance_cents, created_at";

/// Repository for organization reads.
#[derive(Debug, Clone)]
pub struct OrgRepository {
    pool: SqlitePool,
}

impl OrgRepository {
    /// Creates a new OrgRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrgRepository { pool }
    }

    /// Gets an organization by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Organization>> {
        let org = sqlx::query_as::<_, Organization>(&format!(
            "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(org)
    }
}

// =============================================================================
// Transactional operations
// =============================================================================

/// Fetches the context's organization on the transaction connection.
pub(crate) async fn fetch_organization(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> LedgerResult<Organization> {
    let org = sqlx::query_as::<_, Organization>(&format!(
        "SELECT {ORG_COLUMNS} FROM organizations WHERE id = ?1"
    ))
    .bind(&ctx.org_id)
    .fetch_optional(conn)
    .await?;

    org.ok_or_else(|| LedgerError::Core(CoreError::not_found("Organization", &ctx.org_id)))
}
