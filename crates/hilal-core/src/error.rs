//! # Error Types
//!
//! Domain-specific error taxonomy for the ledger core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hilal-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  hilal-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - Core | Db, returned by the engines             │
//! │                                                                         │
//! │  Any error raised inside a transaction aborts that whole transaction.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (serial, id, amounts)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the allocator, ledger and payment
/// engine. These abort the surrounding transaction and surface to the caller
/// as-is; retry policy is a caller concern.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input validation failed before any row was touched.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The actor could not be resolved to a verified identity, or the
    /// identity lacks the required role.
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Stock allocation cannot be satisfied.
    ///
    /// For serialized requests `serial` names the unit that could not be
    /// found; for generic requests it is `None` and the counts tell the
    /// story.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        serial: Option<String>,
        available: i64,
        requested: i64,
    },

    /// A specific serial requested during a sale edit is not in stock.
    #[error("Serial not available: {serial}")]
    SerialUnavailable { serial: String },

    /// Credit-funded payment exceeds the customer's prepaid pool.
    #[error("Insufficient credit: available {available_cents}, requested {requested_cents}")]
    InsufficientCredit {
        available_cents: i64,
        requested_cents: i64,
    },

    /// Missing id, or an id that belongs to another tenant. Cross-tenant
    /// access fails closed with this variant, never with data.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Lost a stock or sequence race to a concurrent transaction.
    #[error("Concurrency conflict: {detail}")]
    ConcurrencyConflict { detail: String },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an Unauthorized error.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        CoreError::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Creates a ConcurrencyConflict error.
    pub fn conflict(detail: impl Into<String>) -> Self {
        CoreError::ConcurrencyConflict {
            detail: detail.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller input doesn't meet requirements and are always
/// raised before any mutation begins.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Two fields that must agree do not.
    #[error("{field}: {reason}")]
    Inconsistent { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
