//! # Validation Module
//!
//! Input validation rules for ledger operations. Validation always runs
//! before any row is touched, so a rejected request has zero side effects.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Caller (UI / importer)    - format checks, user feedback     │
//! │  Layer 2: THIS MODULE               - business rule validation         │
//! │  Layer 3: Database (SQLite)         - NOT NULL / UNIQUE / FK           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::SaleLineInput;
use crate::{GENERIC_SERIAL, MIN_REASON_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates the mandatory modification reason on sale and payment edits.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at least [`MIN_REASON_LEN`] characters
pub fn validate_reason(reason: &str) -> ValidationResult<&str> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }
    if trimmed.chars().count() < MIN_REASON_LEN {
        return Err(ValidationError::TooShort {
            field: "reason".to_string(),
            min: MIN_REASON_LEN,
        });
    }
    Ok(trimmed)
}

/// Validates a monetary amount that must be strictly positive.
pub fn validate_positive_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a serial number supplied on a sale line.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 64 characters
/// - Must not be the generic placeholder (`N/A` is not a real serial)
pub fn validate_serial(serial: &str) -> ValidationResult<()> {
    let trimmed = serial.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "serial".to_string(),
        });
    }
    if trimmed.chars().count() > 64 {
        return Err(ValidationError::TooLong {
            field: "serial".to_string(),
            max: 64,
        });
    }
    if trimmed == GENERIC_SERIAL {
        return Err(ValidationError::InvalidFormat {
            field: "serial".to_string(),
            reason: format!("'{GENERIC_SERIAL}' is the generic placeholder"),
        });
    }
    Ok(())
}

/// Validates one sale line.
///
/// Serialized lines must carry exactly `quantity` serials; generic lines a
/// positive quantity. Unit prices may be zero (giveaways) but not negative.
pub fn validate_line(line: &SaleLineInput) -> ValidationResult<()> {
    if line.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }
    if line.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if line.unit_price_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_price_cents".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    if line.is_serialized() {
        if line.serials.len() as i64 != line.quantity {
            return Err(ValidationError::Inconsistent {
                field: "serials".to_string(),
                reason: format!(
                    "{} serials supplied for quantity {}",
                    line.serials.len(),
                    line.quantity
                ),
            });
        }
        for serial in &line.serials {
            validate_serial(serial)?;
        }
    }
    Ok(())
}

/// Validates the line set of a sale request.
///
/// The cart must not be empty, and a product may appear on only one line;
/// quantities for the same product belong on that line.
pub fn validate_lines(lines: &[SaleLineInput]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }
    let mut seen = HashSet::new();
    for line in lines {
        validate_line(line)?;
        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Inconsistent {
                field: "lines".to_string(),
                reason: format!("product {} appears on more than one line", line.product_id),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
