//! # Operator Identity
//!
//! The identity/PIN verifier is an external collaborator: it resolves a PIN
//! to a verified operator identity, which the ledger and payment engines
//! then stamp onto audit and payment records. The engines never see PINs,
//! only already-verified identities.
//!
//! ## Privilege Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Role      │ create sale │ edit sale │ edit/delete payment │ bulk del  │
//! │  ──────────┼─────────────┼───────────┼─────────────────────┼────────── │
//! │  Staff     │     ✅      │    ❌     │         ❌          │    ❌     │
//! │  Operator  │     ✅      │    ✅     │         ✅          │    ❌     │
//! │  Admin     │     ✅      │    ✅     │         ✅          │    ✅     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::TenantContext;

/// Privilege level of a verified operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operator,
    Staff,
}

/// A verified operator identity, produced by an [`IdentityVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Identity {
    /// Requires the ADMIN role, for destructive bulk operations.
    pub fn require_admin(&self) -> CoreResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(CoreError::unauthorized("admin role required"))
        }
    }

    /// Requires a role allowed to edit sales and payments.
    pub fn require_operator(&self) -> CoreResult<()> {
        match self.role {
            Role::Admin | Role::Operator => Ok(()),
            Role::Staff => Err(CoreError::unauthorized(
                "operator or admin role required",
            )),
        }
    }
}

/// Contract of the identity/PIN verifier collaborator.
///
/// Implementations resolve a PIN to a verified identity within a tenant,
/// returning `None` on failure - never an error the caller could confuse
/// with a partial match.
#[allow(async_fn_in_trait)]
pub trait IdentityVerifier {
    async fn verify(&self, ctx: &TenantContext, pin: &str) -> Option<Identity>;
}
