//! # comptoir-db: Database Layer for Comptoir
//!
//! This crate provides database access for the cart and promotion engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comptoir Data Flow                               │
//! │                                                                         │
//! │  CartEngine::update_cart(...)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   comptoir-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ CartRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ PromotionRepo │    │ 001_initial_ │  │   │
//! │  │   │ Connection    │    │ UsageRepo     │    │   schema.sql │  │   │
//! │  │   │ Management    │    │ Catalog/Stats │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (cart, promotion, usage, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comptoir_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/comptoir.db")).await?;
//!
//! let active = db.carts().active_for_owner(&owner).await?;
//! let promotions = db.promotions().applicable(company.as_ref()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::catalog::CatalogRepository;
pub use repository::directory::DirectoryRepository;
pub use repository::promotion::PromotionRepository;
pub use repository::stats::StatsRepository;
pub use repository::usage::UsageRepository;
