//! # Repository Module
//!
//! Database repository implementations for Comptoir.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Engine operation                                                      │
//! │       │                                                                 │
//! │       │  db.carts().update(&cart, expected_version, &usages)           │
//! │       ▼                                                                 │
//! │  CartRepository                                                        │
//! │  ├── get / active_for_owner / list_for_owner                           │
//! │  ├── insert / replace_active / update / delete                         │
//! │       │                                                                 │
//! │       │  SQL (one transaction per write)                                │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CartRepository`](cart::CartRepository) - Carts, items, optimistic versioning
//! - [`PromotionRepository`](promotion::PromotionRepository) - Promotions and applicability sets
//! - [`UsageRepository`](usage::UsageRepository) - Append-only promotion usage ledger
//! - [`CatalogRepository`](catalog::CatalogRepository) - Product read API
//! - [`DirectoryRepository`](directory::DirectoryRepository) - Users and companies
//! - [`StatsRepository`](stats::StatsRepository) - Rows for cart statistics
//!
//! ## Decimal Columns
//! Money and percentages are stored as TEXT and parsed back through the core
//! types, so a malformed value surfaces as [`DbError::CorruptValue`] instead
//! of a silently wrong amount.

pub mod cart;
pub mod catalog;
pub mod directory;
pub mod promotion;
pub mod stats;
pub mod usage;

use comptoir_core::{DiscountPercentage, Money};

use crate::error::{DbError, DbResult};

/// Parses a TEXT money column.
pub(crate) fn parse_money(column: &str, value: &str) -> DbResult<Money> {
    value.parse().map_err(|e: comptoir_core::ValidationError| DbError::CorruptValue {
        column: column.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a TEXT column holding a computed total, which may exceed the
/// price bound.
pub(crate) fn parse_total(column: &str, value: &str) -> DbResult<Money> {
    Money::parse_total(value).map_err(|e| DbError::CorruptValue {
        column: column.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a TEXT percentage column.
pub(crate) fn parse_percentage(column: &str, value: &str) -> DbResult<DiscountPercentage> {
    value.parse().map_err(|e: comptoir_core::ValidationError| DbError::CorruptValue {
        column: column.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Encodes money for a TEXT column, keeping full precision.
pub(crate) fn money_text(money: Money) -> String {
    money.amount().to_string()
}
