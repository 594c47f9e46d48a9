//! # comptoir-core: Pure Business Logic for Comptoir
//!
//! This crate is the **heart** of the cart/order engine. It contains all
//! business rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comptoir Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 comptoir-engine (operations)                    │   │
//! │  │    create_cart, update_cart, change_status, get_stats, ...      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ comptoir-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │  │  money   │ │ promotion │ │   cart   │ │     status       │  │   │
//! │  │  │  Money   │ │ resolver  │ │ CartItem │ │  state machine   │  │   │
//! │  │  └──────────┘ └───────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │  ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │  │  guard   │ │settlement │ │  usage   │ │      stats       │  │   │
//! │  │  │ one live │ │  totals   │ │  ledger  │ │    buckets       │  │   │
//! │  │  └──────────┘ └───────────┘ └──────────┘ └──────────────────┘  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  comptoir-db (SQLite)                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - References, actors, statuses, collaborator read models
//! - [`money`] - Decimal money and discount percentages (no floating point!)
//! - [`promotion`] - Promotion model and resolver
//! - [`cart`] - Cart aggregate
//! - [`status`] - Cart status state machine
//! - [`guard`] - Active-cart singularity rules
//! - [`settlement`] - Totals calculator
//! - [`usage`] - Promotion usage records
//! - [`stats`] - Period bucketing and rankings
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: the clock is always an argument, never read here
//! 2. **No I/O**: database and network access are FORBIDDEN here
//! 3. **Decimal Money**: all amounts are `rust_decimal::Decimal`, rounded only for display
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use comptoir_core::money::{DiscountPercentage, Money};
//!
//! let gross = Money::from_cents(2500).times(1); // 25.00
//! let pct = DiscountPercentage::from_whole(20).unwrap();
//! let discount = gross.percentage_of(pct);
//!
//! assert_eq!(discount, Money::from_cents(500));
//! assert_eq!((gross - discount).to_string(), "20.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod guard;
pub mod money;
pub mod promotion;
pub mod settlement;
pub mod stats;
pub mod status;
pub mod types;
pub mod usage;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem, CartItemInput, CartLimits};
pub use error::{CoreError, CoreResult, ValidationError};
pub use guard::{ActiveCartSummary, CreationPlan};
pub use money::{DiscountPercentage, Money};
pub use promotion::{
    Promotion, PromotionDraft, PromotionMatch, PromotionScope, PromotionTemporalState,
};
pub use settlement::{LineSettlement, Settlement, SettlementLine};
pub use stats::{StatsPeriod, StatsReport, StatsRow, StatusFilter};
pub use types::*;
pub use usage::{PromotionUsageRecord, PromotionUsageSummary};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct products allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and keeps orders reviewable by a human.
/// Overridable through the engine configuration.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single product in a cart.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of cart notes.
pub const MAX_NOTES_LEN: usize = 2000;

/// Maximum length of the client's order reference.
pub const MAX_ORDER_REFERENCE_LEN: usize = 100;

/// Maximum length of a line reference.
pub const MAX_LINE_REFERENCE_LEN: usize = 200;
