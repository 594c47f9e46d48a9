//! # Error Types
//!
//! Domain-specific error types for comptoir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  comptoir-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  comptoir-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  comptoir-engine errors                                                │
//! │  └── EngineError      - What callers see (five kinds + storage)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::guard::ActiveCartSummary;
use crate::types::{ActorKind, CartStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input validation failed before any state mutation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Status change (or item mutation) not permitted by the state machine.
    ///
    /// ## When This Occurs
    /// - Any change from `cancelled` or `finished`
    /// - An owner trying to process/finish/cancel a submitted cart
    /// - Skipping a state (`building → processed`)
    ///
    /// Surfaced verbatim, never coerced to a "closest legal" state.
    #[error("Invalid transition from {from} to {to} by {actor}: {reason}")]
    InvalidTransition {
        from: CartStatus,
        to: CartStatus,
        actor: ActorKind,
        reason: String,
    },

    /// The user already owns an active cart and replacement was not requested.
    ///
    /// ## User Workflow
    /// ```text
    /// Admin: "create cart for Alice"
    ///      │
    ///      ▼
    /// Alice has a submitted cart (3 items, 120.00)
    ///      │
    ///      ▼
    /// ConflictActiveCart { summary }
    ///      │
    ///      ▼
    /// UI: "Alice already has an order of 3 items (120.00). Replace it?"
    /// ```
    #[error("User {} already has an active cart {} ({} items)", .0.owner_ref, .0.cart_id, .0.item_count)]
    ConflictActiveCart(ActiveCartSummary),

    /// Cart has exceeded maximum allowed distinct products.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Product is not part of the cart.
    #[error("Product {0} is not in the cart")]
    ProductNotInCart(String),

    /// A new line names a product with no catalog price.
    #[error("Product {0} does not exist in the catalog")]
    UnknownProduct(String),
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        from: CartStatus,
        to: CartStatus,
        actor: ActorKind,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            from,
            to,
            actor,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// They are fully recoverable by correcting the input.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
    },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unknown period token, bad decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A cart cannot leave `building` without items.
    #[error("cart must contain at least one item")]
    EmptyCart,

    /// Duplicate value (e.g., the same product twice in one request).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    /// Creates an OutOfRange error from any displayable bounds.
    pub fn out_of_range(
        field: impl Into<String>,
        min: impl ToString,
        max: impl ToString,
    ) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
