//! # Cart Status State Machine
//!
//! Legal status transitions and who may perform them.
//!
//! ## Transition Graph
//! ```text
//!                 owner | admin               admin                admin
//!   ┌──────────┐ ─────────────► ┌───────────┐ ─────► ┌───────────┐ ─────► ┌──────────┐
//!   │ building │                │ submitted │        │ processed │        │ finished │■
//!   └────┬─────┘                └─────┬─────┘        └─────┬─────┘        └──────────┘
//!        │ owner | admin              │ admin              │ admin
//!        ▼                            ▼                    ▼
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │                        cancelled ■                          │
//!   └─────────────────────────────────────────────────────────────┘
//!
//!   ■ terminal: no status change, no item edit
//! ```
//!
//! There is no edge back to `building` and no self-edge. A rejected change is
//! reported as [`CoreError::InvalidTransition`] and never coerced to the
//! "closest legal" state.

use crate::error::{CoreError, CoreResult};
use crate::types::{ActorKind, CartStatus};

use ActorKind::{Administrator, Owner};
use CartStatus::{Building, Cancelled, Finished, Processed, Submitted};

/// Every edge of the graph with the actors allowed to take it.
const EDGES: &[(CartStatus, CartStatus, &[ActorKind])] = &[
    (Building, Submitted, &[Owner, Administrator]),
    (Building, Cancelled, &[Owner, Administrator]),
    (Submitted, Processed, &[Administrator]),
    (Submitted, Cancelled, &[Administrator]),
    (Processed, Finished, &[Administrator]),
    (Processed, Cancelled, &[Administrator]),
];

fn edge(from: CartStatus, to: CartStatus) -> Option<&'static [ActorKind]> {
    EDGES
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, actors)| *actors)
}

impl CartStatus {
    /// Whether the graph has an edge `self → target` for any actor.
    pub fn can_transition_to(&self, target: CartStatus) -> bool {
        edge(*self, target).is_some()
    }
}

/// Validates a status change.
///
/// ## Example
/// ```rust
/// use comptoir_core::status::check_transition;
/// use comptoir_core::{ActorKind, CartStatus};
///
/// assert!(check_transition(CartStatus::Building, CartStatus::Submitted, ActorKind::Owner).is_ok());
/// assert!(check_transition(CartStatus::Submitted, CartStatus::Processed, ActorKind::Owner).is_err());
/// ```
pub fn check_transition(from: CartStatus, to: CartStatus, actor: ActorKind) -> CoreResult<()> {
    if from.is_terminal() {
        return Err(CoreError::invalid_transition(
            from,
            to,
            actor,
            "cart is in a terminal state",
        ));
    }

    if from == to {
        return Err(CoreError::invalid_transition(
            from,
            to,
            actor,
            format!("cart is already {}", from),
        ));
    }

    match edge(from, to) {
        None => Err(CoreError::invalid_transition(
            from,
            to,
            actor,
            "no such transition",
        )),
        Some(actors) if !actors.contains(&actor) => Err(CoreError::invalid_transition(
            from,
            to,
            actor,
            "only an administrator may perform this transition",
        )),
        Some(_) => Ok(()),
    }
}

/// Targets `actor` may move a cart to from `from`.
pub fn allowed_targets(from: CartStatus, actor: ActorKind) -> Vec<CartStatus> {
    EDGES
        .iter()
        .filter(|(f, _, actors)| *f == from && actors.contains(&actor))
        .map(|(_, to, _)| *to)
        .collect()
}

/// Validates an item edit (add, remove, quantity, notes).
///
/// Owners edit only while `building`; administrators edit any live cart.
/// Editing never changes the status, so the error reports `status → status`.
pub fn check_item_mutation(status: CartStatus, actor: ActorKind) -> CoreResult<()> {
    if status.is_terminal() {
        return Err(CoreError::invalid_transition(
            status,
            status,
            actor,
            "cart is in a terminal state",
        ));
    }

    match actor {
        Administrator => Ok(()),
        Owner if status == Building => Ok(()),
        Owner => Err(CoreError::invalid_transition(
            status,
            status,
            actor,
            "owners can only edit carts that are being built",
        )),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
