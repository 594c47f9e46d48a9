//! # comptoir-engine: Cart and Promotion Operations
//!
//! The operation surface of Comptoir. Every call names its [`Actor`], runs
//! the pure rules of `comptoir-core` and persists through `comptoir-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transport (HTTP, IPC, CLI...)                                          │
//! │       │  EngineConfig::from_env()  +  init_tracing()                    │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 comptoir-engine (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │  CartEngine ── carts ── promotions ── stats                     │   │
//! │  │       │                                                         │   │
//! │  │       ├──► EngineError ──► ErrorResponse { code, message }     │   │
//! │  │       └──► SettledCart ──► CartView (PriceVisibility)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                               │                                 │
//! │       ▼                               ▼                                 │
//! │  comptoir-core (rules, settlement)   comptoir-db (SQLite)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comptoir_engine::{init_tracing, CartEngine, CreateCartRequest, EngineConfig};
//!
//! init_tracing();
//! let engine = CartEngine::connect(EngineConfig::from_env()?).await?;
//!
//! let alice = UserRef::from("alice");
//! let settled = engine
//!     .create_cart(&Actor::Owner(alice.clone()), CreateCartRequest::new(alice))
//!     .await?;
//! ```
//!
//! [`Actor`]: comptoir_core::Actor

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod presentation;
pub mod promotions;
pub mod stats;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use engine::{CartEngine, CreateCartRequest, SettledCart, UpdateCartRequest};
pub use error::{EngineError, EngineResult, ErrorCode, ErrorResponse};
pub use presentation::{CartView, LineView, PriceVisibility};
pub use promotions::{PromotionListing, PromotionUsageReport};
pub use telemetry::init_tracing;
