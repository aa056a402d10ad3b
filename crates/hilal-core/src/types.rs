//! # Domain Types
//!
//! Core domain types used throughout the Hilal back-office.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Instance     │   │      Sale       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  serial_number  │   │  invoice_number │   │  sale_id (FK)   │       │
//! │  │  status         │   │  total_cents    │   │  method         │       │
//! │  │  sale_id        │   │  amount_paid    │   │  account_id?    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ InstanceStatus  │   │ PaymentMethod   │   │  TenantContext  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  InStock        │   │  Cash           │   │  org_id         │       │
//! │  │  Sold           │   │  Card           │   │  (explicit on   │       │
//! │  │  Returned       │   │  BankTransfer   │   │   every call)   │       │
//! │  │  Defective      │   │  Credit         │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (invoice_number, serial_number, sku)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::GENERIC_SERIAL;

// =============================================================================
// Tenant Context
// =============================================================================

/// Explicit tenant scope threaded through every core operation.
///
/// ## Why Explicit?
/// Resolving the tenant from ambient session state makes the core impossible
/// to call or test without a web-session harness. Callers resolve the tenant
/// once (the Tenant Resolver collaborator) and pass this down; every query is
/// filtered by it, and ids from other tenants fail closed with `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenantContext {
    pub org_id: String,
}

impl TenantContext {
    pub fn new(org_id: impl Into<String>) -> Self {
        TenantContext {
            org_id: org_id.into(),
        }
    }
}

// =============================================================================
// Organization
// =============================================================================

/// The tenant boundary. Every other entity is scoped to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// Days between sale date and due date for credit sales.
    pub grace_period_days: i64,
    /// Outstanding balances at or below this count as fully settled.
    pub settlement_tolerance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer buying on cash or credit terms.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub tax_id: Option<String>,
    /// Prepaid/overpayment pool, usable as a funding source for invoices.
    pub credit_balance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Returns the credit balance as Money.
    #[inline]
    pub fn credit_balance(&self) -> Money {
        Money::from_cents(self.credit_balance_cents)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A catalog entry. Never mutated by the ledger core.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub org_id: String,
    pub sku: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Instance
// =============================================================================

/// The lifecycle state of one physical stock unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// On the shelf, available for allocation.
    InStock,
    /// Allocated to a sale.
    Sold,
    /// Warranty decision: taken back into the shop's hands.
    Returned,
    /// Warranty decision: unit is faulty.
    Defective,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        InstanceStatus::InStock
    }
}

/// One physical stock unit, individually serialized or generic.
///
/// ## Invariant
/// `status == Sold ⇔ sale_id.is_some()`. The allocator is the only writer
/// of these fields and maintains the invariant inside each transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Instance {
    pub id: String,
    pub org_id: String,
    pub product_id: String,
    /// `None` (or the literal `"N/A"`) marks generic, interchangeable stock.
    pub serial_number: Option<String>,
    pub status: InstanceStatus,
    pub sale_id: Option<String>,
    pub sold_price_cents: Option<i64>,
    pub cost_cents: Option<i64>,
    /// Free-form note stamped on explicit warranty decisions.
    pub warranty_note: Option<String>,
    pub warranty_decided_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub warranty_decided_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// Whether this unit is generic (no distinguishing serial).
    pub fn is_generic(&self) -> bool {
        match self.serial_number.as_deref() {
            None => true,
            Some(s) => s.is_empty() || s == GENERIC_SERIAL,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale header: one invoice, many instances, zero or more payments.
///
/// ## Invariants
/// - `total_cents - amount_paid_cents ≥ -tolerance`
/// - `Σ payments.amount_cents == amount_paid_cents`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub org_id: String,
    pub customer_id: String,
    /// Human-readable, unique per organization: `H{YY}{00000}`.
    pub invoice_number: String,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    #[ts(as = "String")]
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub operator_id: String,
    pub operator_name: String,
    pub last_modified_by: Option<String>,
    pub modification_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Unpaid remainder of the invoice.
    #[inline]
    pub fn outstanding(&self) -> Money {
        Money::from_cents(self.total_cents - self.amount_paid_cents)
    }

    /// Whether the invoice counts as fully paid under the given rounding
    /// tolerance. This is the only comparison site for the tolerance.
    #[inline]
    pub fn is_settled(&self, tolerance_cents: i64) -> bool {
        self.total_cents - self.amount_paid_cents <= tolerance_cents
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash into a till account.
    Cash,
    /// Card terminal settlement into a bank account.
    Card,
    /// Direct bank transfer.
    BankTransfer,
    /// Funded from the customer's prepaid credit pool (no account).
    Credit,
}

impl PaymentMethod {
    /// Credit-funded payments carry no account and no account transaction.
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self, PaymentMethod::Credit)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment applied to one sale by the allocation engine.
///
/// `account_id` is `None` exactly when `method == Credit`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub org_id: String,
    pub sale_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub account_id: Option<String>,
    /// External reference (transfer slip, card auth code, etc.).
    pub reference: Option<String>,
    pub operator_id: String,
    pub operator_name: String,
    pub last_modified_by: Option<String>,
    pub modification_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Account & Transaction
// =============================================================================

/// A real-money account (till, bank, wallet) with a running balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Account {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub balance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Ledger entry paired 1:1 with each non-credit payment, recording the
/// delta applied to an account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AccountTransaction {
    pub id: String,
    pub org_id: String,
    pub account_id: String,
    pub payment_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Warranty
// =============================================================================

/// Explicit warranty decision for a serial being removed from a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyKind {
    Returned,
    Defective,
}

impl WarrantyKind {
    /// The instance status a disposition transitions the unit into.
    pub fn status(&self) -> InstanceStatus {
        match self {
            WarrantyKind::Returned => InstanceStatus::Returned,
            WarrantyKind::Defective => InstanceStatus::Defective,
        }
    }
}

/// A warranty decision attached to a serial removed during a sale edit.
/// Serials removed without a disposition are simply released back to stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SerialDisposition {
    pub serial: String,
    pub kind: WarrantyKind,
    pub note: Option<String>,
}

// =============================================================================
// Request / Response DTOs
// =============================================================================

/// One line of a sale request. If `serials` is non-empty the line is
/// serialized and `quantity` must equal `serials.len()`; otherwise the line
/// is generic and the allocator picks the oldest in-stock units.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineInput {
    pub product_id: String,
    /// Display name snapshotted into the audit diff.
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub serials: Vec<String>,
    /// Warranty note applied to kept serials during edits, if supplied.
    pub warranty_note: Option<String>,
}

impl SaleLineInput {
    /// Whether this line carries explicit serials.
    #[inline]
    pub fn is_serialized(&self) -> bool {
        !self.serials.is_empty()
    }

    /// Line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Request payload for `SaleLedger::create_sale`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateSaleRequest {
    pub customer_id: String,
    pub lines: Vec<SaleLineInput>,
    pub payment_method: PaymentMethod,
    /// Amount settled at the counter; the remainder becomes credit terms.
    pub amount_paid_cents: i64,
    /// Funding account for a non-credit initial payment.
    pub account_id: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Request payload for `SaleLedger::update_sale`. `lines` is the complete
/// new state of the sale; anything absent is removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateSaleRequest {
    /// New customer, when the invoice is being reassigned.
    pub customer_id: Option<String>,
    pub lines: Vec<SaleLineInput>,
    /// Warranty decisions for serials absent from `lines`.
    pub dispositions: Vec<SerialDisposition>,
}

/// Request payload for `PaymentEngine::register_payment`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RegisterPaymentRequest {
    /// Invoices to settle; the engine orders them oldest-first itself.
    pub sale_ids: Vec<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub account_id: Option<String>,
    pub reference: Option<String>,
    /// Over-payment becomes prepaid customer credit instead of being
    /// handed back.
    pub save_excess_as_credit: bool,
}

/// Replacement state for `PaymentEngine::update_payment`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdatePaymentRequest {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub account_id: Option<String>,
    pub reference: Option<String>,
}

/// Result of a payment registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentOutcome {
    /// Total applied across the named invoices.
    pub distributed_cents: i64,
    /// Unapplied remainder (zero when fully consumed).
    pub excess_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
