//! # Payment Distribution Planner
//!
//! Pure FIFO cascade of one payment amount across outstanding invoices.
//!
//! ## The Cascade
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  registerPayment(amount = $120) over A (out $100) then B (out $50)     │
//! │                                                                         │
//! │  remaining = 120                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  A: allocation = min(120, 100) = 100  → A fully paid, remaining = 20   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  B: allocation = min(20, 50) = 20     → B keeps $30 open, remaining 0  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  distributed = 120, excess = 0                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The planner is pure: the payment engine loads the sales (oldest first)
//! inside its transaction, plans here, then applies the plan row by row.

use crate::error::ValidationError;
use crate::money::Money;

/// One planned payment row: `amount` applied to `sale_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub sale_id: String,
    pub amount: Money,
}

/// The outcome of planning a cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    pub allocations: Vec<Allocation>,
    /// Total applied across all allocations.
    pub distributed: Money,
    /// Unapplied remainder after all invoices are exhausted.
    pub excess: Money,
}

/// Plans the FIFO distribution of `amount` across `outstanding`.
///
/// `outstanding` must already be sorted oldest invoice first; entries with a
/// non-positive outstanding balance are skipped. Fails when `amount` is not
/// positive - the caller validates the id list separately.
pub fn plan_distribution(
    amount: Money,
    outstanding: &[(String, Money)],
) -> Result<DistributionPlan, ValidationError> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    let mut remaining = amount;
    let mut allocations = Vec::new();

    for (sale_id, open) in outstanding {
        if remaining.is_zero() {
            break;
        }
        if !open.is_positive() {
            // Already settled (or over-paid within tolerance): skip.
            continue;
        }

        let allocation = remaining.min(*open);
        allocations.push(Allocation {
            sale_id: sale_id.clone(),
            amount: allocation,
        });
        remaining -= allocation;
    }

    Ok(DistributionPlan {
        distributed: amount - remaining,
        excess: remaining,
        allocations,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
