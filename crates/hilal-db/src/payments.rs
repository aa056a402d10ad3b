//! # Payment Engine
//!
//! Cascading payment registration plus payment edit and deletion with full
//! financial reversal.
//!
//! ## The Cascade
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  register_payment($120 over invoices A, B)                             │
//! │                                                                         │
//! │  1. Load the named sales OLDEST FIRST (the engine orders them,         │
//! │     never the caller)                                                   │
//! │  2. Plan the FIFO distribution (pure, in hilal-core)                   │
//! │  3. Debit the funding source: customer credit pool, or a real account  │
//! │  4. One payment row + amount_paid bump per allocation                  │
//! │  5. Over-payment optionally becomes prepaid customer credit            │
//! │                                                                         │
//! │  All in one transaction. A sale's amount_paid and the sum of its       │
//! │  payment rows never disagree, not even transiently across a crash.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Edits Revert, Then Reapply
//! Editing or deleting a payment never computes a net delta. The old
//! payment's full financial impact is reversed first (amount_paid, account
//! balance, credit pool, transaction rows), then the new state is applied
//! from scratch. Method switches (cash -> credit) fall out for free.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::validate_funding;
use crate::repository::{account, customer, org, payment, sale};
use hilal_core::validation::{validate_positive_amount, validate_reason};
use hilal_core::{
    plan_distribution, AccountTransaction, CoreError, Identity, Money, Payment, PaymentOutcome,
    RegisterPaymentRequest, TenantContext, UpdatePaymentRequest, ValidationError,
};

/// The payment allocation engine.
#[derive(Debug, Clone)]
pub struct PaymentEngine {
    pool: SqlitePool,
}

impl PaymentEngine {
    /// Creates a new PaymentEngine.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentEngine { pool }
    }

    /// Registers one payment and cascades it across the named invoices,
    /// oldest first. All invoices must belong to the same customer.
    pub async fn register_payment(
        &self,
        ctx: &TenantContext,
        actor: &Identity,
        req: RegisterPaymentRequest,
    ) -> LedgerResult<PaymentOutcome> {
        if req.sale_ids.is_empty() {
            return Err(ValidationError::Required {
                field: "sale_ids".to_string(),
            }
            .into());
        }
        validate_positive_amount("amount_cents", req.amount_cents)?;
        validate_funding(req.method.is_credit(), req.account_id.as_deref())?;

        let mut tx = self.pool.begin().await?;

        org::fetch_organization(&mut tx, ctx).await?;
        let sales = sale::fetch_sales_oldest_first(&mut tx, ctx, &req.sale_ids).await?;

        let customer_id = sales[0].customer_id.clone();
        if sales.iter().any(|s| s.customer_id != customer_id) {
            return Err(ValidationError::Inconsistent {
                field: "sale_ids".to_string(),
                reason: "all invoices must belong to the same customer".to_string(),
            }
            .into());
        }

        // Credit tenders are admitted only when the pool covers the full
        // amount, even though the cascade may end up drawing less.
        if req.method.is_credit() {
            let funding = customer::fetch_customer(&mut tx, ctx, &customer_id).await?;
            if funding.credit_balance_cents < req.amount_cents {
                return Err(LedgerError::Core(CoreError::InsufficientCredit {
                    available_cents: funding.credit_balance_cents,
                    requested_cents: req.amount_cents,
                }));
            }
        }

        let outstanding: Vec<(String, Money)> = sales
            .iter()
            .map(|s| (s.id.clone(), s.outstanding()))
            .collect();
        let plan = plan_distribution(Money::from_cents(req.amount_cents), &outstanding)?;
        let distributed_cents = plan.distributed.cents();
        let excess_cents = plan.excess.cents();

        // Debit the funding source. Credit-funded payments draw only what the
        // cascade actually consumed; the untouched remainder simply stays in
        // the customer's pool.
        if req.method.is_credit() {
            if distributed_cents > 0 {
                customer::adjust_credit(&mut tx, ctx, &customer_id, -distributed_cents).await?;
            }
        } else if let Some(account_id) = &req.account_id {
            account::fetch_account(&mut tx, ctx, account_id).await?;
            // When the excess is kept as customer credit the full tender went
            // into the till, so the account records the full amount.
            let account_delta = if req.save_excess_as_credit {
                req.amount_cents
            } else {
                distributed_cents
            };
            if account_delta > 0 {
                account::adjust_balance(&mut tx, ctx, account_id, account_delta).await?;
            }
            if req.save_excess_as_credit && excess_cents > 0 {
                customer::adjust_credit(&mut tx, ctx, &customer_id, excess_cents).await?;
            }
        }

        let now = Utc::now();
        for allocation in &plan.allocations {
            let row = Payment {
                id: Uuid::new_v4().to_string(),
                org_id: ctx.org_id.clone(),
                sale_id: allocation.sale_id.clone(),
                amount_cents: allocation.amount.cents(),
                method: req.method,
                account_id: req.account_id.clone(),
                reference: req.reference.clone(),
                operator_id: actor.id.clone(),
                operator_name: actor.name.clone(),
                last_modified_by: None,
                modification_reason: None,
                created_at: now,
            };
            payment::insert_payment(&mut tx, &row).await?;
            sale::apply_amount_paid_delta(&mut tx, ctx, &allocation.sale_id, row.amount_cents)
                .await?;

            if let Some(account_id) = &req.account_id {
                account::insert_transaction(
                    &mut tx,
                    &AccountTransaction {
                        id: Uuid::new_v4().to_string(),
                        org_id: ctx.org_id.clone(),
                        account_id: account_id.clone(),
                        payment_id: row.id.clone(),
                        amount_cents: row.amount_cents,
                        created_at: now,
                    },
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            customer_id = %customer_id,
            invoices = req.sale_ids.len(),
            distributed_cents,
            excess_cents,
            "Payment registered"
        );
        Ok(PaymentOutcome {
            distributed_cents,
            excess_cents,
        })
    }

    /// Edits a payment by reverting its old financial impact and applying
    /// the new state from scratch. Requires at least the Operator role and
    /// a reason.
    pub async fn update_payment(
        &self,
        ctx: &TenantContext,
        actor: Option<&Identity>,
        payment_id: &str,
        reason: &str,
        req: UpdatePaymentRequest,
    ) -> LedgerResult<Payment> {
        let actor = actor.ok_or_else(|| {
            LedgerError::Core(CoreError::unauthorized("identity verification required"))
        })?;
        actor.require_operator()?;
        let reason = validate_reason(reason)?.to_string();
        validate_positive_amount("amount_cents", req.amount_cents)?;
        validate_funding(req.method.is_credit(), req.account_id.as_deref())?;

        let mut tx = self.pool.begin().await?;

        let old = payment::fetch_payment(&mut tx, ctx, payment_id).await?;
        let sale_row = sale::fetch_sale(&mut tx, ctx, &old.sale_id).await?;

        revert_payment(&mut tx, ctx, &old, &sale_row.customer_id).await?;

        // Reapply.
        sale::apply_amount_paid_delta(&mut tx, ctx, &old.sale_id, req.amount_cents).await?;
        if req.method.is_credit() {
            customer::adjust_credit(&mut tx, ctx, &sale_row.customer_id, -req.amount_cents)
                .await?;
        } else if let Some(account_id) = &req.account_id {
            account::fetch_account(&mut tx, ctx, account_id).await?;
            account::adjust_balance(&mut tx, ctx, account_id, req.amount_cents).await?;
            account::insert_transaction(
                &mut tx,
                &AccountTransaction {
                    id: Uuid::new_v4().to_string(),
                    org_id: ctx.org_id.clone(),
                    account_id: account_id.clone(),
                    payment_id: old.id.clone(),
                    amount_cents: req.amount_cents,
                    created_at: Utc::now(),
                },
            )
            .await?;
        }

        let updated = Payment {
            amount_cents: req.amount_cents,
            method: req.method,
            account_id: req.account_id.clone(),
            reference: req.reference.clone(),
            last_modified_by: Some(actor.name.clone()),
            modification_reason: Some(reason.clone()),
            ..old
        };
        payment::update_payment_row(&mut tx, ctx, &updated).await?;

        tx.commit().await?;

        info!(payment_id, operator = %actor.name, %reason, "Payment updated");
        Ok(updated)
    }

    /// Deletes a payment, reverting its full financial impact. Requires at
    /// least the Operator role and a reason.
    pub async fn delete_payment(
        &self,
        ctx: &TenantContext,
        actor: Option<&Identity>,
        payment_id: &str,
        reason: &str,
    ) -> LedgerResult<()> {
        let actor = actor.ok_or_else(|| {
            LedgerError::Core(CoreError::unauthorized("identity verification required"))
        })?;
        actor.require_operator()?;
        let reason = validate_reason(reason)?.to_string();

        let mut tx = self.pool.begin().await?;

        let old = payment::fetch_payment(&mut tx, ctx, payment_id).await?;
        let sale_row = sale::fetch_sale(&mut tx, ctx, &old.sale_id).await?;

        revert_payment(&mut tx, ctx, &old, &sale_row.customer_id).await?;
        payment::delete_payment_row(&mut tx, ctx, payment_id).await?;

        tx.commit().await?;

        info!(payment_id, operator = %actor.name, %reason, "Payment deleted");
        Ok(())
    }
}

/// Reverts one payment's financial impact: the sale's amount_paid, the
/// funding source, and any account transaction rows.
async fn revert_payment(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    old: &Payment,
    customer_id: &str,
) -> LedgerResult<()> {
    sale::apply_amount_paid_delta(&mut *conn, ctx, &old.sale_id, -old.amount_cents).await?;
    if old.method.is_credit() {
        customer::adjust_credit(&mut *conn, ctx, customer_id, old.amount_cents).await?;
    } else if let Some(account_id) = &old.account_id {
        account::adjust_balance(&mut *conn, ctx, account_id, -old.amount_cents).await?;
        account::delete_transactions_for_payment(&mut *conn, ctx, &old.id).await?;
    }
    Ok(())
}

// =============================================================================
// Integration Tests
// =============================================================================
