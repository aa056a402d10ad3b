//! # hilal-core: Pure Business Logic for the Hilal Back-Office
//!
//! This crate is the **heart** of the sales ledger. It contains all business
//! logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Hilal Back-Office Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Callers (UI, CSV importer, receipt renderer)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hilal-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   audit   │  │allocation │  │   │
//! │  │   │ Instance  │  │   Money   │  │ItemChange │  │ FIFO plan │  │   │
//! │  │   │   Sale    │  │           │  │  diffing  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    hilal-db (Database Layer)                    │   │
//! │  │        SQLite repositories, sale ledger, payment engine         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Instance, Sale, Payment, requests, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`audit`] - Structured before/after diff model for sale edits
//! - [`allocation`] - Pure FIFO payment distribution planner
//! - [`invoice`] - Invoice number formatting
//! - [`auth`] - Operator identity and role model
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation rules

pub mod allocation;
pub mod audit;
pub mod auth;
pub mod error;
pub mod invoice;
pub mod money;
pub mod types;
pub mod validation;

pub use allocation::{plan_distribution, Allocation, DistributionPlan};
pub use audit::{AuditChanges, ItemChange, LineSnapshot, SaleAudit};
pub use auth::{Identity, IdentityVerifier, Role};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Serial number placeholder meaning "generic, interchangeable stock".
///
/// Legacy intake rows use the literal `N/A` instead of NULL; the allocator
/// treats both identically.
pub const GENERIC_SERIAL: &str = "N/A";

/// Days added to the sale date to produce the due date when an organization
/// has no explicit grace period configured.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 15;

/// Rounding tolerance, in cents, below which an outstanding balance counts
/// as fully settled.
///
/// The per-organization `settlement_tolerance_cents` column overrides this;
/// the constant is only the schema default and the fallback for callers that
/// have no organization row at hand.
pub const DEFAULT_SETTLEMENT_TOLERANCE_CENTS: i64 = 100;

/// Minimum length of the mandatory modification reason on sale and payment
/// edits (after trimming).
pub const MIN_REASON_LEN: usize = 3;

/// Sequence kind used for invoice numbering.
pub const SEQUENCE_KIND_INVOICE: &str = "invoice";
