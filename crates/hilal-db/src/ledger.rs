//! # Sale Ledger
//!
//! Sale lifecycle: create, edit with audit trail, delete with full
//! financial reversal.
//!
//! ## Transaction Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every public operation is ONE SQLite transaction:                      │
//! │                                                                         │
//! │  create_sale:   sequence → header → reserve instances → initial pay    │
//! │  update_sale:   reconcile instances → header → ONE audit row           │
//! │  delete_sale:   release instances → reverse payments → drop rows       │
//! │                                                                         │
//! │  Any error mid-way rolls the whole thing back; the ledger never        │
//! │  persists a sale whose instances, payments and totals disagree.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Actor Model
//! Creating a sale is open to any verified operator. Editing and deleting
//! require a verified identity with at least the Operator role plus a
//! mandatory reason; bulk deletion requires Admin. All identity checks run
//! before the transaction starts, so a rejected request touches nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, LedgerError, LedgerResult};
use crate::repository::{account, audit, customer, instance, org, payment, product, sale, sequence};
use hilal_core::audit::{diff_line, removed_line};
use hilal_core::invoice::format_invoice_number;
use hilal_core::validation::{validate_lines, validate_reason};
use hilal_core::{
    AccountTransaction, AuditChanges, CoreError, CreateSaleRequest, Identity, ItemChange,
    LineSnapshot, Payment, Sale, SaleAudit, SerialDisposition, TenantContext, UpdateSaleRequest,
    ValidationError, SEQUENCE_KIND_INVOICE,
};

/// The sale lifecycle engine.
#[derive(Debug, Clone)]
pub struct SaleLedger {
    pool: SqlitePool,
}

/// Old state of one product on a sale, grouped from its sold instances.
struct OldLine {
    name: String,
    price_cents: i64,
    /// serial -> instance id
    serials: HashMap<String, String>,
    /// Generic instance ids, oldest allocation first.
    generic_ids: Vec<String>,
}

impl OldLine {
    fn quantity(&self) -> i64 {
        (self.serials.len() + self.generic_ids.len()) as i64
    }

    fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            name: self.name.clone(),
            quantity: self.quantity(),
            unit_price_cents: self.price_cents,
        }
    }
}

impl SaleLedger {
    /// Creates a new SaleLedger.
    pub fn new(pool: SqlitePool) -> Self {
        SaleLedger { pool }
    }

    /// Creates a sale: draws an invoice number, reserves stock for every
    /// line and records the amount settled at the counter.
    ///
    /// The due date is the sale date plus the organization's grace period;
    /// anything unpaid by then is the collections report's problem, not
    /// this engine's.
    pub async fn create_sale(
        &self,
        ctx: &TenantContext,
        actor: &Identity,
        req: CreateSaleRequest,
    ) -> LedgerResult<Sale> {
        validate_lines(&req.lines)?;

        let total_cents: i64 = req.lines.iter().map(|l| l.line_total().cents()).sum();
        if req.amount_paid_cents < 0 || req.amount_paid_cents > total_cents {
            return Err(ValidationError::OutOfRange {
                field: "amount_paid_cents".to_string(),
                min: 0,
                max: total_cents,
            }
            .into());
        }
        if req.amount_paid_cents > 0 {
            validate_funding(req.payment_method.is_credit(), req.account_id.as_deref())?;
        }

        let mut tx = self.pool.begin().await?;

        let org = org::fetch_organization(&mut tx, ctx).await?;
        let customer = customer::fetch_customer(&mut tx, ctx, &req.customer_id).await?;

        let now = Utc::now();
        let year = now.year();
        let counter = sequence::next_value(&mut tx, ctx, SEQUENCE_KIND_INVOICE, year).await?;
        let invoice_number = format_invoice_number(year, counter);

        let sale_row = Sale {
            id: Uuid::new_v4().to_string(),
            org_id: ctx.org_id.clone(),
            customer_id: customer.id.clone(),
            invoice_number,
            total_cents,
            amount_paid_cents: req.amount_paid_cents,
            due_date: now + Duration::days(org.grace_period_days),
            notes: req.notes.clone(),
            operator_id: actor.id.clone(),
            operator_name: actor.name.clone(),
            last_modified_by: None,
            modification_reason: None,
            created_at: now,
            updated_at: now,
        };
        sale::insert_sale(&mut tx, &sale_row).await?;

        for line in &req.lines {
            product::fetch_product(&mut tx, ctx, &line.product_id).await?;
            if line.is_serialized() {
                instance::reserve_serialized(
                    &mut tx,
                    ctx,
                    &sale_row.id,
                    &line.product_id,
                    line.unit_price_cents,
                    &line.serials,
                )
                .await?;
            } else {
                instance::reserve_generic(
                    &mut tx,
                    ctx,
                    &sale_row.id,
                    &line.product_id,
                    line.unit_price_cents,
                    line.quantity,
                )
                .await?;
            }
        }

        if req.amount_paid_cents > 0 {
            let initial = Payment {
                id: Uuid::new_v4().to_string(),
                org_id: ctx.org_id.clone(),
                sale_id: sale_row.id.clone(),
                amount_cents: req.amount_paid_cents,
                method: req.payment_method,
                account_id: req.account_id.clone(),
                reference: req.reference.clone(),
                operator_id: actor.id.clone(),
                operator_name: actor.name.clone(),
                last_modified_by: None,
                modification_reason: None,
                created_at: now,
            };
            payment::insert_payment(&mut tx, &initial).await?;

            if req.payment_method.is_credit() {
                customer::adjust_credit(&mut tx, ctx, &customer.id, -req.amount_paid_cents)
                    .await?;
            } else if let Some(account_id) = &initial.account_id {
                account::adjust_balance(&mut tx, ctx, account_id, req.amount_paid_cents).await?;
                account::insert_transaction(
                    &mut tx,
                    &AccountTransaction {
                        id: Uuid::new_v4().to_string(),
                        org_id: ctx.org_id.clone(),
                        account_id: account_id.clone(),
                        payment_id: initial.id.clone(),
                        amount_cents: req.amount_paid_cents,
                        created_at: now,
                    },
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %sale_row.id,
            invoice = %sale_row.invoice_number,
            total_cents,
            "Sale created"
        );
        Ok(sale_row)
    }

    /// Edits a sale: `req.lines` is the complete new state. Stock is
    /// reconciled serial by serial, the header is rewritten with a freshly
    /// summed total, and exactly one audit row records the diff.
    ///
    /// Requires a verified identity with at least the Operator role and a
    /// non-trivial reason; both are checked before any row is touched.
    pub async fn update_sale(
        &self,
        ctx: &TenantContext,
        actor: Option<&Identity>,
        sale_id: &str,
        reason: &str,
        req: UpdateSaleRequest,
    ) -> LedgerResult<Sale> {
        let actor = require_actor(actor)?;
        actor.require_operator()?;
        let reason = validate_reason(reason)?.to_string();
        validate_lines(&req.lines)?;

        let mut tx = self.pool.begin().await?;

        let org = org::fetch_organization(&mut tx, ctx).await?;
        let before = sale::fetch_sale(&mut tx, ctx, sale_id).await?;

        // Clean recompute, never a delta on the stored total. An edit may
        // not shrink the invoice below what is already paid (beyond the
        // rounding tolerance); the payments have to be adjusted first.
        let total_cents: i64 = req.lines.iter().map(|l| l.line_total().cents()).sum();
        if before.amount_paid_cents - total_cents > org.settlement_tolerance_cents {
            return Err(ValidationError::Inconsistent {
                field: "lines".to_string(),
                reason: format!(
                    "new total {total_cents} is below the {} already paid",
                    before.amount_paid_cents
                ),
            }
            .into());
        }

        let old_instances = instance::fetch_sold_for_sale(&mut tx, ctx, sale_id).await?;

        // Product names for the audit diff of lines that disappear entirely.
        let mut names: HashMap<String, String> = HashMap::new();
        let product_ids: HashSet<String> = old_instances
            .iter()
            .map(|i| i.product_id.clone())
            .collect();
        for pid in &product_ids {
            let p = product::fetch_product(&mut tx, ctx, pid).await?;
            names.insert(pid.clone(), p.name);
        }

        // Group the old sold instances per product. fetch_sold_for_sale
        // orders by allocation age, so generic_ids stays oldest-first.
        let mut old: BTreeMap<String, OldLine> = BTreeMap::new();
        for inst in &old_instances {
            let entry = old.entry(inst.product_id.clone()).or_insert_with(|| OldLine {
                name: names
                    .get(&inst.product_id)
                    .cloned()
                    .unwrap_or_else(|| inst.product_id.clone()),
                price_cents: inst.sold_price_cents.unwrap_or(0),
                serials: HashMap::new(),
                generic_ids: Vec::new(),
            });
            if inst.is_generic() {
                entry.generic_ids.push(inst.id.clone());
            } else if let Some(serial) = &inst.serial_number {
                entry.serials.insert(serial.clone(), inst.id.clone());
            }
        }

        let dispositions: HashMap<&str, &SerialDisposition> = req
            .dispositions
            .iter()
            .map(|d| (d.serial.as_str(), d))
            .collect();

        let mut item_changes: Vec<ItemChange> = Vec::new();

        for line in &req.lines {
            product::fetch_product(&mut tx, ctx, &line.product_id).await?;

            match old.remove(&line.product_id) {
                None => {
                    // Product new to the sale. Added serials must name real
                    // on-shelf units; no placeholder relabeling during edits.
                    if line.is_serialized() {
                        for serial in &line.serials {
                            instance::reserve_exact_serial(
                                &mut tx,
                                ctx,
                                sale_id,
                                &line.product_id,
                                line.unit_price_cents,
                                serial,
                            )
                            .await?;
                        }
                    } else {
                        instance::reserve_generic(
                            &mut tx,
                            ctx,
                            sale_id,
                            &line.product_id,
                            line.unit_price_cents,
                            line.quantity,
                        )
                        .await?;
                    }
                    if let Some(change) =
                        diff_line(None, &line.name, line.quantity, line.unit_price_cents)
                    {
                        item_changes.push(change);
                    }
                }
                Some(mut prev) => {
                    let snapshot = prev.snapshot();

                    if line.is_serialized() {
                        let mut kept: Vec<String> = Vec::new();
                        for serial in &line.serials {
                            match prev.serials.remove(serial.as_str()) {
                                Some(instance_id) => kept.push(instance_id),
                                None => {
                                    instance::reserve_exact_serial(
                                        &mut tx,
                                        ctx,
                                        sale_id,
                                        &line.product_id,
                                        line.unit_price_cents,
                                        serial,
                                    )
                                    .await?;
                                }
                            }
                        }
                        instance::update_sold_terms(
                            &mut tx,
                            ctx,
                            &kept,
                            line.unit_price_cents,
                            line.warranty_note.as_deref(),
                        )
                        .await?;
                        // Units no longer on the line: dispose where a
                        // warranty decision names them, otherwise back to
                        // stock. Any stale generic units go back too.
                        remove_serials(&mut tx, ctx, &mut prev, &dispositions, &actor.name)
                            .await?;
                        instance::release(&mut tx, ctx, &prev.generic_ids).await?;
                    } else {
                        let old_qty = prev.generic_ids.len() as i64;
                        if line.quantity > old_qty {
                            instance::reserve_generic(
                                &mut tx,
                                ctx,
                                sale_id,
                                &line.product_id,
                                line.unit_price_cents,
                                line.quantity - old_qty,
                            )
                            .await?;
                        } else if line.quantity < old_qty {
                            // Shrink releases the oldest-allocated surplus.
                            let surplus: Vec<String> = prev
                                .generic_ids
                                .drain(..(old_qty - line.quantity) as usize)
                                .collect();
                            instance::release(&mut tx, ctx, &surplus).await?;
                        }
                        instance::update_sold_terms(
                            &mut tx,
                            ctx,
                            &prev.generic_ids,
                            line.unit_price_cents,
                            line.warranty_note.as_deref(),
                        )
                        .await?;
                        remove_serials(&mut tx, ctx, &mut prev, &dispositions, &actor.name)
                            .await?;
                    }

                    if let Some(change) = diff_line(
                        Some(&snapshot),
                        &line.name,
                        line.quantity,
                        line.unit_price_cents,
                    ) {
                        item_changes.push(change);
                    }
                }
            }
        }

        // Products absent from the new line set: everything they held goes
        // back to stock (or through a warranty disposition), and the diff
        // records the removal.
        for (_pid, mut prev) in old {
            let snapshot = prev.snapshot();
            remove_serials(&mut tx, ctx, &mut prev, &dispositions, &actor.name).await?;
            instance::release(&mut tx, ctx, &prev.generic_ids).await?;
            item_changes.push(removed_line(&snapshot));
        }

        let customer_id = match &req.customer_id {
            Some(cid) => {
                if cid != &before.customer_id {
                    customer::fetch_customer(&mut tx, ctx, cid).await?;
                }
                cid.clone()
            }
            None => before.customer_id.clone(),
        };

        sale::update_header(
            &mut tx,
            ctx,
            sale_id,
            &customer_id,
            total_cents,
            &actor.name,
            &reason,
        )
        .await?;

        let changes = AuditChanges {
            old_total_cents: before.total_cents,
            new_total_cents: total_cents,
            item_changes,
        };
        let audit_row = SaleAudit {
            id: Uuid::new_v4().to_string(),
            org_id: ctx.org_id.clone(),
            sale_id: sale_id.to_string(),
            operator_name: actor.name.clone(),
            reason: reason.clone(),
            changes: changes
                .to_json()
                .map_err(|e| DbError::Internal(e.to_string()))?,
            created_at: Utc::now(),
        };
        audit::append(&mut tx, &audit_row).await?;

        let after = sale::fetch_sale(&mut tx, ctx, sale_id).await?;
        tx.commit().await?;

        info!(
            sale_id,
            old_total = before.total_cents,
            new_total = total_cents,
            operator = %actor.name,
            "Sale updated"
        );
        Ok(after)
    }

    /// Deletes a sale, unwinding everything it touched: instances return to
    /// stock, credit-funded payments are refunded to the customer's pool,
    /// account-funded payments are backed out of their accounts, and the
    /// sale's payment, audit and header rows are removed.
    pub async fn delete_sale(
        &self,
        ctx: &TenantContext,
        actor: Option<&Identity>,
        sale_id: &str,
        reason: &str,
    ) -> LedgerResult<()> {
        let actor = require_actor(actor)?;
        actor.require_operator()?;
        let reason = validate_reason(reason)?.to_string();

        let mut tx = self.pool.begin().await?;
        let invoice = delete_sale_inner(&mut tx, ctx, sale_id).await?;
        tx.commit().await?;

        info!(sale_id, invoice = %invoice, operator = %actor.name, %reason, "Sale deleted");
        Ok(())
    }

    /// Deletes several sales in one transaction. Admin only; if any deletion
    /// fails, none happen.
    pub async fn bulk_delete_sales(
        &self,
        ctx: &TenantContext,
        actor: Option<&Identity>,
        sale_ids: &[String],
        reason: &str,
    ) -> LedgerResult<u64> {
        let actor = require_actor(actor)?;
        actor.require_admin()?;
        let reason = validate_reason(reason)?.to_string();
        if sale_ids.is_empty() {
            return Err(ValidationError::Required {
                field: "sale_ids".to_string(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        for sale_id in sale_ids {
            delete_sale_inner(&mut tx, ctx, sale_id).await?;
        }
        tx.commit().await?;

        info!(
            count = sale_ids.len(),
            operator = %actor.name,
            %reason,
            "Bulk sale deletion complete"
        );
        Ok(sale_ids.len() as u64)
    }
}

/// Resolves the optional actor, failing closed when identity verification
/// did not happen.
fn require_actor(actor: Option<&Identity>) -> LedgerResult<&Identity> {
    actor.ok_or_else(|| {
        LedgerError::Core(CoreError::unauthorized("identity verification required"))
    })
}

/// Funding-source consistency: credit payments carry no account, everything
/// else requires one.
pub(crate) fn validate_funding(
    is_credit: bool,
    account_id: Option<&str>,
) -> Result<(), ValidationError> {
    match (is_credit, account_id) {
        (true, Some(_)) => Err(ValidationError::Inconsistent {
            field: "account_id".to_string(),
            reason: "credit-funded payments carry no account".to_string(),
        }),
        (false, None) => Err(ValidationError::Required {
            field: "account_id".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Disposes or releases every serialized unit left in `prev.serials`.
async fn remove_serials(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    prev: &mut OldLine,
    dispositions: &HashMap<&str, &SerialDisposition>,
    actor_name: &str,
) -> LedgerResult<()> {
    for (serial, instance_id) in prev.serials.drain() {
        match dispositions.get(serial.as_str()) {
            Some(d) => {
                debug!(serial = %serial, kind = ?d.kind, "Warranty disposition");
                instance::dispose(
                    &mut *conn,
                    ctx,
                    &instance_id,
                    d.kind,
                    d.note.as_deref(),
                    actor_name,
                )
                .await?;
            }
            None => instance::release(&mut *conn, ctx, &[instance_id]).await?,
        }
    }
    Ok(())
}

/// Unwinds one sale inside an already-open transaction. Returns the invoice
/// number for logging.
async fn delete_sale_inner(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    sale_id: &str,
) -> LedgerResult<String> {
    let sale_row = sale::fetch_sale(&mut *conn, ctx, sale_id).await?;

    let instances = instance::fetch_all_for_sale(&mut *conn, ctx, sale_id).await?;
    let instance_ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
    instance::release(&mut *conn, ctx, &instance_ids).await?;

    let payments = payment::fetch_payments_for_sale(&mut *conn, ctx, sale_id).await?;
    for p in &payments {
        if p.method.is_credit() {
            customer::adjust_credit(&mut *conn, ctx, &sale_row.customer_id, p.amount_cents)
                .await?;
        } else if let Some(account_id) = &p.account_id {
            account::adjust_balance(&mut *conn, ctx, account_id, -p.amount_cents).await?;
            account::delete_transactions_for_payment(&mut *conn, ctx, &p.id).await?;
        }
    }

    payment::delete_payments_for_sale(&mut *conn, ctx, sale_id).await?;
    audit::delete_for_sale(&mut *conn, ctx, sale_id).await?;
    sale::delete_sale_row(&mut *conn, ctx, sale_id).await?;

    Ok(sale_row.invoice_number)
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::testutil;
    use hilal_core::{InstanceStatus, PaymentMethod, WarrantyKind};

    fn update_req(lines: Vec<hilal_core::SaleLineInput>) -> UpdateSaleRequest {
        UpdateSaleRequest {
            customer_id: None,
            lines,
            dispositions: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_sale_reserves_stock_and_records_initial_payment() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 3).await;
        let account_id = testutil::seed_account(&db, &ctx, "Till").await;

        let actor = testutil::staff();
        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &actor,
                CreateSaleRequest {
                    customer_id: customer_id.clone(),
                    lines: vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                    payment_method: PaymentMethod::Cash,
                    amount_paid_cents: 3_000,
                    account_id: Some(account_id.clone()),
                    reference: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(sale.total_cents, 3_000);
        assert_eq!(sale.amount_paid_cents, 3_000);
        assert!(sale.invoice_number.starts_with('H'));
        assert!(sale.invoice_number.ends_with("00001"));

        let sold = db.instances().list_for_sale(&ctx, &sale.id).await.unwrap();
        assert_eq!(sold.len(), 2);
        assert!(sold.iter().all(|i| i.status == InstanceStatus::Sold));
        assert!(sold.iter().all(|i| i.sold_price_cents == Some(1_500)));

        let payments = db.payments().list_for_sale(&ctx, &sale.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount_cents, 3_000);

        let account = db
            .accounts()
            .get_by_id(&ctx, &account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance_cents, 3_000);
    }

    #[tokio::test]
    async fn test_generic_allocation_is_fifo() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        let stock = testutil::seed_generic_stock(&db, &ctx, &product_id, 3).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                ),
            )
            .await
            .unwrap();

        let sold = db.instances().list_for_sale(&ctx, &sale.id).await.unwrap();
        let sold_ids: Vec<&str> = sold.iter().map(|i| i.id.as_str()).collect();
        // The two oldest units, in intake order.
        assert_eq!(sold_ids, vec![stock[0].as_str(), stock[1].as_str()]);
    }

    #[tokio::test]
    async fn test_serial_request_relabels_generic_placeholder() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "NOVA-X2", "Nova X2").await;
        // One generic placeholder, no exact serial in stock.
        let stock = testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::serialized_line(
                        &product_id,
                        "Nova X2",
                        45_000,
                        &["IMEI-354881"],
                    )],
                ),
            )
            .await
            .unwrap();

        let inst = db
            .instances()
            .get_by_id(&ctx, &stock[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inst.serial_number.as_deref(), Some("IMEI-354881"));
        assert_eq!(inst.status, InstanceStatus::Sold);
        assert_eq!(inst.sale_id.as_deref(), Some(sale.id.as_str()));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_whole_sale() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let chargers = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        let cables = testutil::seed_product(&db, &ctx, "CBL-01", "Cable").await;
        testutil::seed_generic_stock(&db, &ctx, &chargers, 2).await;
        // No cables in stock.

        let err = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![
                        testutil::generic_line(&chargers, "Charger", 2, 1_500),
                        testutil::generic_line(&cables, "Cable", 1, 500),
                    ],
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));

        // First line's reservation rolled back with the rest.
        assert_eq!(db.instances().count_in_stock(&ctx, &chargers).await.unwrap(), 2);
        // The drawn sequence value rolled back too: the next sale is 00001.
        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&chargers, "Charger", 1, 1_500)],
                ),
            )
            .await
            .unwrap();
        assert!(sale.invoice_number.ends_with("00001"));
    }

    #[tokio::test]
    async fn test_last_unit_goes_to_exactly_one_sale() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let winner = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                ),
            )
            .await
            .unwrap();
        assert_eq!(winner.total_cents, 1_500);

        let loser = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            loser,
            LedgerError::Core(CoreError::InsufficientStock { .. })
        ));
        assert_eq!(db.instances().count_in_stock(&ctx, &product_id).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sales_race_for_last_unit() {
        // A file-backed pool so the two tasks hold genuinely separate
        // connections; the shared in-memory fixture serializes everything
        // on its single connection.
        let path = std::env::temp_dir().join(format!("hilal-race-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let db = db.clone();
            let ctx = ctx.clone();
            let customer_id = customer_id.clone();
            let product_id = product_id.clone();
            tasks.push(tokio::spawn(async move {
                db.ledger()
                    .create_sale(
                        &ctx,
                        &testutil::staff(),
                        testutil::unpaid_sale(
                            &customer_id,
                            vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                        ),
                    )
                    .await
            }));
        }

        let mut sold = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => sold += 1,
                Err(LedgerError::Core(CoreError::InsufficientStock { .. })) => {}
                Err(ref err) if err.is_conflict() => {}
                Err(err) => panic!("unexpected error from losing task: {err}"),
            }
        }
        assert_eq!(sold, 1, "exactly one task may take the last unit");
        assert_eq!(db.instances().count_in_stock(&ctx, &product_id).await.unwrap(), 0);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }

    #[tokio::test]
    async fn test_invoice_numbers_are_sequential() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;

        let mut invoices = Vec::new();
        for _ in 0..2 {
            let sale = db
                .ledger()
                .create_sale(
                    &ctx,
                    &testutil::staff(),
                    testutil::unpaid_sale(
                        &customer_id,
                        vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                    ),
                )
                .await
                .unwrap();
            invoices.push(sale.invoice_number);
        }
        assert!(invoices[0].ends_with("00001"));
        assert!(invoices[1].ends_with("00002"));
    }

    #[tokio::test]
    async fn test_update_price_only_yields_single_modified_entry() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                ),
            )
            .await
            .unwrap();

        let updated = db
            .ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "price correction",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 2, 1_800)]),
            )
            .await
            .unwrap();
        assert_eq!(updated.total_cents, 3_600);
        assert_eq!(updated.last_modified_by.as_deref(), Some("Olga Operator"));

        let audits = db.audits().list_for_sale(&ctx, &sale.id).await.unwrap();
        assert_eq!(audits.len(), 1);
        let changes = audits[0].parsed_changes().unwrap();
        assert_eq!(changes.old_total_cents, 3_000);
        assert_eq!(changes.new_total_cents, 3_600);
        assert_eq!(changes.item_changes.len(), 1);
        match &changes.item_changes[0] {
            ItemChange::Modified {
                old_qty,
                new_qty,
                old_price_cents,
                new_price_cents,
                ..
            } => {
                assert_eq!(*old_qty, 2);
                assert_eq!(*new_qty, 2);
                assert_eq!(*old_price_cents, 1_500);
                assert_eq!(*new_price_cents, 1_800);
            }
            other => panic!("expected Modified, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_cannot_shrink_total_below_amount_paid() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;
        let account_id = testutil::seed_account(&db, &ctx, "Till").await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                CreateSaleRequest {
                    customer_id: customer_id.clone(),
                    lines: vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                    payment_method: PaymentMethod::Cash,
                    amount_paid_cents: 3_000,
                    account_id: Some(account_id.clone()),
                    reference: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        // Fully paid at 3000; shrinking to one unit would leave the invoice
        // 1500 below its recorded payments.
        let err = db
            .ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "customer kept only one",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::Inconsistent { .. }))
        ));

        // Nothing moved: totals, stock and audit trail are untouched.
        let unchanged = db.sales().get_by_id(&ctx, &sale.id).await.unwrap().unwrap();
        assert_eq!(unchanged.total_cents, 3_000);
        assert_eq!(unchanged.amount_paid_cents, 3_000);
        assert_eq!(
            db.instances().list_for_sale(&ctx, &sale.id).await.unwrap().len(),
            2
        );
        assert!(db.audits().list_for_sale(&ctx, &sale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejected_before_mutation_without_reason() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                ),
            )
            .await
            .unwrap();

        let err = db
            .ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "  ",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));

        // Nothing changed, no audit row.
        let unchanged = db.sales().get_by_id(&ctx, &sale.id).await.unwrap().unwrap();
        assert_eq!(unchanged.total_cents, 3_000);
        assert!(db.audits().list_for_sale(&ctx, &sale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_operator_role() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                ),
            )
            .await
            .unwrap();

        let staff_err = db
            .ledger()
            .update_sale(
                &ctx,
                Some(&testutil::staff()),
                &sale.id,
                "should not matter",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 1, 1_800)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            staff_err,
            LedgerError::Core(CoreError::Unauthorized { .. })
        ));

        let anon_err = db
            .ledger()
            .update_sale(
                &ctx,
                None,
                &sale.id,
                "should not matter",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 1, 1_800)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            anon_err,
            LedgerError::Core(CoreError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_quantity_shrink_releases_oldest_units() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        let stock = testutil::seed_generic_stock(&db, &ctx, &product_id, 3).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 3, 1_500)],
                ),
            )
            .await
            .unwrap();

        db.ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "customer returned two at the counter",
                update_req(vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)]),
            )
            .await
            .unwrap();

        // The two oldest allocations went back to stock; the newest stayed.
        let first = db.instances().get_by_id(&ctx, &stock[0]).await.unwrap().unwrap();
        let last = db.instances().get_by_id(&ctx, &stock[2]).await.unwrap().unwrap();
        assert_eq!(first.status, InstanceStatus::InStock);
        assert!(first.sale_id.is_none());
        assert_eq!(last.status, InstanceStatus::Sold);
    }

    #[tokio::test]
    async fn test_update_serial_removal_with_disposition() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "NOVA-X2", "Nova X2").await;
        testutil::seed_serialized_stock(&db, &ctx, &product_id, &["IMEI-1", "IMEI-2"]).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::serialized_line(
                        &product_id,
                        "Nova X2",
                        45_000,
                        &["IMEI-1", "IMEI-2"],
                    )],
                ),
            )
            .await
            .unwrap();

        db.ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "one unit came back dead",
                UpdateSaleRequest {
                    customer_id: None,
                    lines: vec![testutil::serialized_line(
                        &product_id,
                        "Nova X2",
                        45_000,
                        &["IMEI-1"],
                    )],
                    dispositions: vec![SerialDisposition {
                        serial: "IMEI-2".to_string(),
                        kind: WarrantyKind::Defective,
                        note: Some("no power".to_string()),
                    }],
                },
            )
            .await
            .unwrap();

        let sold = db.instances().list_for_sale(&ctx, &sale.id).await.unwrap();
        let disposed = sold
            .iter()
            .find(|i| i.serial_number.as_deref() == Some("IMEI-2"))
            .unwrap();
        // Keeps its sale link for traceability, but is out of the sold set.
        assert_eq!(disposed.status, InstanceStatus::Defective);
        assert_eq!(disposed.warranty_note.as_deref(), Some("no power"));
        assert_eq!(disposed.warranty_decided_by.as_deref(), Some("Olga Operator"));

        let kept = sold
            .iter()
            .find(|i| i.serial_number.as_deref() == Some("IMEI-1"))
            .unwrap();
        assert_eq!(kept.status, InstanceStatus::Sold);
    }

    #[tokio::test]
    async fn test_update_added_serial_must_exist_exactly() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "NOVA-X2", "Nova X2").await;
        testutil::seed_serialized_stock(&db, &ctx, &product_id, &["IMEI-1"]).await;
        // A generic placeholder exists but edits must not relabel it.
        testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::serialized_line(&product_id, "Nova X2", 45_000, &["IMEI-1"])],
                ),
            )
            .await
            .unwrap();

        let err = db
            .ledger()
            .update_sale(
                &ctx,
                Some(&testutil::operator()),
                &sale.id,
                "adding a phantom unit",
                update_req(vec![testutil::serialized_line(
                    &product_id,
                    "Nova X2",
                    45_000,
                    &["IMEI-1", "IMEI-GHOST"],
                )]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::SerialUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_sale_unwinds_everything() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;
        let account_id = testutil::seed_account(&db, &ctx, "Till").await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                CreateSaleRequest {
                    customer_id: customer_id.clone(),
                    lines: vec![testutil::generic_line(&product_id, "Charger", 2, 1_500)],
                    payment_method: PaymentMethod::Cash,
                    amount_paid_cents: 3_000,
                    account_id: Some(account_id.clone()),
                    reference: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        db.ledger()
            .delete_sale(&ctx, Some(&testutil::operator()), &sale.id, "duplicate entry")
            .await
            .unwrap();

        assert!(db.sales().get_by_id(&ctx, &sale.id).await.unwrap().is_none());
        assert_eq!(db.instances().count_in_stock(&ctx, &product_id).await.unwrap(), 2);
        assert!(db.payments().list_for_sale(&ctx, &sale.id).await.unwrap().is_empty());

        let account = db
            .accounts()
            .get_by_id(&ctx, &account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance_cents, 0);
    }

    #[tokio::test]
    async fn test_bulk_delete_requires_admin() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 2).await;

        let mut ids = Vec::new();
        for _ in 0..2 {
            let sale = db
                .ledger()
                .create_sale(
                    &ctx,
                    &testutil::staff(),
                    testutil::unpaid_sale(
                        &customer_id,
                        vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                    ),
                )
                .await
                .unwrap();
            ids.push(sale.id);
        }

        let err = db
            .ledger()
            .bulk_delete_sales(&ctx, Some(&testutil::operator()), &ids, "spring cleanup")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::Unauthorized { .. })
        ));

        let deleted = db
            .ledger()
            .bulk_delete_sales(&ctx, Some(&testutil::admin()), &ids, "spring cleanup")
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.instances().count_in_stock(&ctx, &product_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cross_tenant_sale_fails_closed() {
        let db = testutil::test_db().await;
        let ctx = testutil::seed_org(&db).await;
        let customer_id = testutil::seed_customer(&db, &ctx, "Akbar", 0).await;
        let product_id = testutil::seed_product(&db, &ctx, "CHG-01", "Charger").await;
        testutil::seed_generic_stock(&db, &ctx, &product_id, 1).await;

        let sale = db
            .ledger()
            .create_sale(
                &ctx,
                &testutil::staff(),
                testutil::unpaid_sale(
                    &customer_id,
                    vec![testutil::generic_line(&product_id, "Charger", 1, 1_500)],
                ),
            )
            .await
            .unwrap();

        let foreign = TenantContext::new("some-other-org");
        let err = db
            .ledger()
            .delete_sale(&foreign, Some(&testutil::operator()), &sale.id, "not ours")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::NotFound { .. })
        ));
    }
}
