//! # Engine Error Type
//!
//! What callers of [`CartEngine`](crate::CartEngine) see when an operation
//! fails.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Comptoir                               │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► EngineError ──► ErrorResponse     │
//! │  sqlx::Error ──────► DbError ────┘         │            { code,         │
//! │                                            │              message }     │
//! │                                            ▼                            │
//! │                                   EngineError::code()                   │
//! │                                   "CONFLICT_ACTIVE_CART", ...           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage failures keep their [`DbError`] as the source; the message sent to
//! callers stays generic.

use serde::Serialize;
use thiserror::Error;

use comptoir_core::{ActiveCartSummary, ActorKind, CartStatus, CoreError, ValidationError};
use comptoir_db::DbError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any state changed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status change or edit not allowed from the cart's current status.
    #[error("Invalid transition from {from} to {to} by {actor}: {reason}")]
    InvalidTransition {
        from: CartStatus,
        to: CartStatus,
        actor: ActorKind,
        reason: String,
    },

    /// The user already has an active cart.
    #[error("User {} already has an active cart {}", .0.owner_ref, .0.cart_id)]
    ConflictActiveCart(ActiveCartSummary),

    /// Entity does not exist (or is not visible to the actor).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Someone else wrote the cart since it was read.
    #[error("Cart {cart_id} was modified concurrently")]
    ConcurrencyConflict { cart_id: String },

    /// The operation is reserved to administrators.
    #[error("Only an administrator may {action}")]
    Forbidden { action: String },

    /// Non-recoverable storage failure.
    #[error("Storage error: {0}")]
    Storage(#[source] DbError),
}

impl EngineError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Forbidden error.
    pub fn forbidden(action: impl Into<String>) -> Self {
        EngineError::Forbidden {
            action: action.into(),
        }
    }

    /// Machine-readable code for transport layers.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::ConflictActiveCart(_) => ErrorCode::ConflictActiveCart,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            EngineError::Forbidden { .. } => ErrorCode::Forbidden,
            EngineError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

/// Error codes for API responses.
///
/// ## Usage in a client
/// ```text
/// switch (e.code) {
///   case 'CONFLICT_ACTIVE_CART':  askToReplace(e.message); break;
///   case 'CONCURRENCY_CONFLICT':  reloadCart(); break;
///   case 'VALIDATION_ERROR':      showForm(e.message); break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidTransition,
    ConflictActiveCart,
    NotFound,
    ConcurrencyConflict,
    Forbidden,
    StorageError,
}

/// Serializable error body.
///
/// ```json
/// { "code": "CONFLICT_ACTIVE_CART", "message": "User alice already has an active cart ..." }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    /// The blocking cart, for the "replace it?" prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_cart: Option<ActiveCartSummary>,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let message = match err {
            EngineError::Storage(_) => "Storage operation failed".to_string(),
            other => other.to_string(),
        };
        let active_cart = match err {
            EngineError::ConflictActiveCart(summary) => Some(summary.clone()),
            _ => None,
        };
        ErrorResponse {
            code: err.code(),
            message,
            active_cart,
        }
    }
}

/// Converts core errors to engine errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => EngineError::Validation(e.to_string()),
            CoreError::InvalidTransition {
                from,
                to,
                actor,
                reason,
            } => EngineError::InvalidTransition {
                from,
                to,
                actor,
                reason,
            },
            CoreError::ConflictActiveCart(summary) => EngineError::ConflictActiveCart(summary),
            e @ (CoreError::CartTooLarge { .. } | CoreError::QuantityTooLarge { .. }) => {
                EngineError::Validation(e.to_string())
            }
            CoreError::ProductNotInCart(id) => EngineError::not_found("Cart item", id),
            CoreError::UnknownProduct(id) => EngineError::not_found("Product", id),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::VersionConflict { id, .. } => EngineError::ConcurrencyConflict { cart_id: id },
            other => {
                tracing::error!(error = %other, "Storage failure");
                EngineError::Storage(other)
            }
        }
    }
}
