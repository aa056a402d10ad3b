//! # Operator Directory
//!
//! Backing store for the identity/PIN verifier. PINs are stored as Argon2
//! hashes; verification scans the organization's active operators and tries
//! each hash, so the table never holds anything reversible.
//!
//! The engines themselves never see a PIN: callers verify first, then pass
//! the resulting [`Identity`] into ledger and payment operations.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use hilal_core::{Identity, IdentityVerifier, Role, TenantContext};

/// A row of the operators table, PIN hash included. Never leaves this module.
#[derive(Debug, sqlx::FromRow)]
struct OperatorRow {
    id: String,
    name: String,
    role: Role,
    pin_hash: String,
}

/// Directory of operators for one deployment, implementing the identity
/// verifier contract over the operators table.
#[derive(Debug, Clone)]
pub struct OperatorDirectory {
    pool: SqlitePool,
}

impl OperatorDirectory {
    /// Creates a new OperatorDirectory.
    pub fn new(pool: SqlitePool) -> Self {
        OperatorDirectory { pool }
    }

    /// Registers a new operator with a hashed PIN. Returns the operator id.
    pub async fn create_operator(
        &self,
        ctx: &TenantContext,
        name: &str,
        role: Role,
        pin: &str,
    ) -> DbResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let pin_hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| DbError::Internal(format!("PIN hashing failed: {e}")))?
            .to_string();

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO operators (id, org_id, name, role, pin_hash, is_active, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        )
        .bind(&id)
        .bind(&ctx.org_id)
        .bind(name)
        .bind(role)
        .bind(&pin_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(operator_id = %id, name, "Registered operator");
        Ok(id)
    }

    /// Deactivates an operator; they can no longer verify.
    pub async fn deactivate(&self, ctx: &TenantContext, operator_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE operators SET is_active = 0 WHERE org_id = ?1 AND id = ?2",
        )
        .bind(&ctx.org_id)
        .bind(operator_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Operator", operator_id));
        }

        Ok(())
    }
}

impl IdentityVerifier for OperatorDirectory {
    /// Resolves a PIN to a verified identity within the tenant.
    ///
    /// Back-office deployments have a handful of operators, so a linear scan
    /// over the active rows is fine; PINs carry no username to key on.
    async fn verify(&self, ctx: &TenantContext, pin: &str) -> Option<Identity> {
        let rows: Vec<OperatorRow> = sqlx::query_as(
            "SELECT id, name, role, pin_hash FROM operators \
             WHERE org_id = ?1 AND is_active = 1",
        )
        .bind(&ctx.org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| warn!(error = %e, "Operator lookup failed"))
        .ok()?;

        let argon2 = Argon2::default();
        for row in rows {
            let Ok(parsed) = PasswordHash::new(&row.pin_hash) else {
                warn!(operator_id = %row.id, "Unparseable PIN hash, skipping");
                continue;
            };
            if argon2.verify_password(pin.as_bytes(), &parsed).is_ok() {
                return Some(Identity {
                    id: row.id,
                    name: row.name,
                    role: row.role,
                });
            }
        }

        None
    }
}
