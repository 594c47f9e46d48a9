//! # Active-Cart Singularity Rules
//!
//! A user owns at most one cart in an active status (`building` or
//! `submitted`). This module holds the decision rules; the database enforces
//! them atomically with a partial unique index.
//!
//! ## Creation Decision
//! ```text
//! create_cart(owner, replace)
//!      │
//!      ▼
//! existing active cart? ── no ──► CreateFresh
//!      │ yes
//!      ▼
//! replace requested? ── no ──► ConflictActiveCart(summary)
//!      │ yes
//!      ▼
//! may actor cancel it? ── no ──► InvalidTransition
//!      │ yes
//!      ▼
//! ReplaceExisting { cart_id, expected_version }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::status::check_transition;
use crate::types::{ActorKind, CartId, CartStatus, UserRef};

/// Short description of a user's active cart, shown before replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCartSummary {
    pub cart_id: CartId,
    pub owner_ref: UserRef,
    pub status: CartStatus,
    pub item_count: usize,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

impl ActiveCartSummary {
    /// Summarizes a cart.
    pub fn of(cart: &Cart) -> Self {
        ActiveCartSummary {
            cart_id: cart.id.clone(),
            owner_ref: cart.owner_ref.clone(),
            status: cart.status,
            item_count: cart.item_count(),
            total: cart.total,
            created_at: cart.created_at,
        }
    }
}

/// What `create_cart` should do about the user's current active cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationPlan {
    /// No active cart: insert the new one.
    CreateFresh,
    /// Cancel the existing cart, then insert the new one, in one transaction.
    ReplaceExisting {
        cart_id: CartId,
        expected_version: i64,
    },
}

/// Decides how a new cart can be created for the owner of `existing`.
///
/// `existing` is the owner's current active cart, if any. A non-active cart
/// passed by mistake is ignored.
pub fn plan_creation(
    existing: Option<&Cart>,
    replace: bool,
    actor: ActorKind,
) -> CoreResult<CreationPlan> {
    let Some(existing) = existing.filter(|c| c.status.is_active()) else {
        return Ok(CreationPlan::CreateFresh);
    };

    if !replace {
        return Err(CoreError::ConflictActiveCart(ActiveCartSummary::of(existing)));
    }

    check_transition(existing.status, CartStatus::Cancelled, actor)?;

    Ok(CreationPlan::ReplaceExisting {
        cart_id: existing.id.clone(),
        expected_version: existing.version,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
