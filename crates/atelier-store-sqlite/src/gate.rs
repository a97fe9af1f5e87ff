//! Read-path integrity gate. Violations are descriptions, not errors: a
//! corrupt legacy row is filtered out of results with a warning, never
//! thrown at the caller.

use std::fmt::{Display, Formatter};

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::StoreError;

/// Ways a stored listing can fail the hard invariant (exactly one resolvable
/// template, at least one resolvable pattern).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityViolation {
    /// No resolvable pattern link in `listing_patterns`.
    NoPatterns,
    /// `product_template_id` is NULL.
    MissingTemplate,
    /// `product_template_id` points at a template that no longer exists.
    DanglingTemplate,
}

impl Display for IntegrityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPatterns => write!(f, "no resolvable patterns"),
            Self::MissingTemplate => write!(f, "missing product template reference"),
            Self::DanglingTemplate => write!(f, "dangling product template reference"),
        }
    }
}

/// Check one listing row against the hard invariant. Pure read; never
/// mutates, never repairs.
///
/// # Errors
/// Returns an error only when the check queries themselves fail.
pub fn violations_for(
    conn: &Connection,
    listing_id: &str,
    product_template_id: Option<&str>,
) -> Result<Vec<IntegrityViolation>, StoreError> {
    let mut violations = Vec::new();

    let patterns: i64 = conn.query_row(
        "SELECT COUNT(*) FROM listing_patterns lp
         JOIN patterns pa ON pa.id = lp.pattern_id
         WHERE lp.listing_id = ?1",
        params![listing_id],
        |row| row.get(0),
    )?;
    if patterns == 0 {
        violations.push(IntegrityViolation::NoPatterns);
    }

    match product_template_id {
        None => violations.push(IntegrityViolation::MissingTemplate),
        Some(template_id) => {
            let resolves: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM product_templates WHERE id = ?1)",
                params![template_id],
                |row| row.get(0),
            )?;
            if resolves == 0 {
                violations.push(IntegrityViolation::DanglingTemplate);
            }
        }
    }

    Ok(violations)
}

/// Log the standard exclusion warning for a gated-out listing.
pub fn warn_excluded(listing_id: &str, violations: &[IntegrityViolation]) {
    let reasons = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
    tracing::warn!(listing_id, reasons, "excluding listing that fails integrity invariants");
}
