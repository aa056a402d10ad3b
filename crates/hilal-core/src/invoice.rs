//! # Invoice Numbering
//!
//! Human-readable invoice numbers in the format `H{YY}{00000}`:
//! the `H` prefix, the last two digits of the year, then the per-year
//! counter zero-padded to five digits.
//!
//! The counter itself comes from the Sequence Generator in `hilal-db`,
//! which performs an atomic upsert-increment per (org, kind, year); only
//! the rendering lives here.

/// Renders an invoice number from a year and a sequence counter.
///
/// ## Example
/// ```rust
/// use hilal_core::invoice::format_invoice_number;
///
/// assert_eq!(format_invoice_number(2026, 1), "H2600001");
/// assert_eq!(format_invoice_number(2026, 12345), "H2612345");
/// ```
pub fn format_invoice_number(year: i32, counter: i64) -> String {
    format!("H{:02}{:05}", year.rem_euclid(100), counter)
}
