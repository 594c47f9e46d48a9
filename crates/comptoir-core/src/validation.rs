//! # Validation Module
//!
//! Input validation utilities for Comptoir.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (back office / storefront)                            │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine operation (Rust)                                      │
//! │  ├── Type validation (typed refs, Money, DiscountPercentage)           │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── Partial UNIQUE index (one active cart per user)                   │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every validator runs before any state mutation, so a failure never leaves
//! a half-applied change behind.
//!
//! ## Usage
//! ```rust
//! use comptoir_core::validation::{validate_quantity, validate_reference};
//!
//! validate_reference("owner_ref", "user-42").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::ProductRef;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of any typed reference.
pub const MAX_REFERENCE_LEN: usize = 100;

/// Maximum length of a promotion name.
pub const MAX_PROMOTION_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier reference (user, product, company, ...).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 100 characters
///
/// ## Example
/// ```rust
/// use comptoir_core::validation::validate_reference;
///
/// assert!(validate_reference("owner_ref", "alice").is_ok());
/// assert!(validate_reference("owner_ref", "  ").is_err());
/// ```
pub fn validate_reference(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    Ok(())
}

/// Validates a promotion name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_promotion_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_PROMOTION_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_PROMOTION_NAME_LEN,
        });
    }

    Ok(())
}

/// Normalizes optional free text (notes, references).
///
/// ## Returns
/// The trimmed text, or `None` when absent or blank.
pub fn normalize_optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity coming from a caller.
///
/// ## Rules
/// - Must be positive (> 0)
///
/// The upper bound is configurable and enforced by the cart aggregate.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Edit Items                                                       │
/// │                                                                         │
/// │  User enters quantity: 5                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       └── OK → Cart::replace_items checks the configured maximum       │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Rejects a request that names the same product twice.
pub fn validate_distinct_products<'a>(
    refs: impl IntoIterator<Item = &'a ProductRef>,
) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for product_ref in refs {
        if !seen.insert(product_ref) {
            return Err(ValidationError::Duplicate {
                field: "product_ref".to_string(),
                value: product_ref.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates a promotion validity window.
///
/// ## Rules
/// - `end`, when set, must not precede `start`
pub fn validate_date_range(
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    if let Some(end) = end {
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "end_date".to_string(),
                reason: "must not precede start_date".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("owner_ref", "alice").is_ok());
        assert!(validate_reference("owner_ref", "").is_err());
        assert!(validate_reference("owner_ref", "   ").is_err());
        assert!(validate_reference("owner_ref", &"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_promotion_name() {
        assert!(validate_promotion_name("Summer sale").is_ok());
        assert!(validate_promotion_name("").is_err());
        assert!(validate_promotion_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_normalize_optional_text() {
        assert_eq!(normalize_optional_text("notes", None, 10).unwrap(), None);
        assert_eq!(normalize_optional_text("notes", Some("  "), 10).unwrap(), None);
        assert_eq!(
            normalize_optional_text("notes", Some(" urgent "), 10).unwrap(),
            Some("urgent".to_string())
        );
        assert!(normalize_optional_text("notes", Some("much too long"), 5).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_distinct_products() {
        let a = ProductRef::from("a");
        let b = ProductRef::from("b");
        assert!(validate_distinct_products([&a, &b]).is_ok());

        let err = validate_distinct_products([&a, &b, &a]).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { ref value, .. } if value == "a"));
    }

    #[test]
    fn test_validate_date_range() {
        let start = Utc::now();
        assert!(validate_date_range(start, None).is_ok());
        assert!(validate_date_range(start, Some(start)).is_ok());
        assert!(validate_date_range(start, Some(start + Duration::days(1))).is_ok());
        assert!(validate_date_range(start, Some(start - Duration::days(1))).is_err());
    }
}
