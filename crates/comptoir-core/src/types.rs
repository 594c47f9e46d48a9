//! # Domain Types
//!
//! Core domain types used throughout Comptoir.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Typed refs     │   │   CartStatus    │   │     Actor       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  ProductRef     │   │  Building       │   │  Owner(user)    │       │
//! │  │  CategoryRef    │   │  Submitted      │   │  Administrator  │       │
//! │  │  CompanyRef     │   │  Processed      │   │     (user)      │       │
//! │  │  UserRef        │   │  Cancelled  ■   │   └─────────────────┘       │
//! │  │  CartId         │   │  Finished   ■   │                              │
//! │  │  PromotionId    │   │  (■ terminal)   │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ProductInfo    │   │   UserInfo      │   │  CompanyInfo    │       │
//! │  │  (catalog read) │   │  (directory)    │   │  (directory)    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Reference Shape
//! A product is always referenced by a [`ProductRef`]. Catalog data is
//! fetched in a separate resolution step ([`ProductInfo`]) and never embedded
//! in the reference itself, so the settlement input has a single shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Typed References
// =============================================================================

macro_rules! string_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wraps an identifier.
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

string_ref!(
    /// Reference to a catalog product.
    ProductRef
);
string_ref!(
    /// Reference to a product category.
    CategoryRef
);
string_ref!(
    /// Reference to a client company.
    CompanyRef
);
string_ref!(
    /// Reference to a user (cart owner or administrator).
    UserRef
);
string_ref!(
    /// Cart identifier (UUID v4).
    CartId
);
string_ref!(
    /// Promotion identifier (UUID v4).
    PromotionId
);

impl CartId {
    /// Generates a fresh cart id.
    pub fn generate() -> Self {
        CartId(Uuid::new_v4().to_string())
    }
}

impl PromotionId {
    /// Generates a fresh promotion id.
    pub fn generate() -> Self {
        PromotionId(Uuid::new_v4().to_string())
    }
}

// =============================================================================
// Actors
// =============================================================================

/// Who is performing an operation, without the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// The user the cart belongs to.
    Owner,
    /// A back-office administrator acting on any user's cart.
    Administrator,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKind::Owner => f.write_str("owner"),
            ActorKind::Administrator => f.write_str("administrator"),
        }
    }
}

/// The caller of an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user", rename_all = "snake_case")]
pub enum Actor {
    /// A client acting on their own carts.
    Owner(UserRef),
    /// An administrator; may act on behalf of any user.
    Administrator(UserRef),
}

impl Actor {
    /// Returns the actor kind.
    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Owner(_) => ActorKind::Owner,
            Actor::Administrator(_) => ActorKind::Administrator,
        }
    }

    /// Returns the acting user.
    pub fn user_ref(&self) -> &UserRef {
        match self {
            Actor::Owner(user) | Actor::Administrator(user) => user,
        }
    }

    /// Checks if the actor is an administrator.
    #[inline]
    pub fn is_administrator(&self) -> bool {
        matches!(self, Actor::Administrator(_))
    }

    /// Checks if the actor may act on a cart owned by `owner`.
    ///
    /// Administrators may act on any cart; owners only on their own.
    pub fn may_act_for(&self, owner: &UserRef) -> bool {
        match self {
            Actor::Administrator(_) => true,
            Actor::Owner(user) => user == owner,
        }
    }
}

// =============================================================================
// Cart Status
// =============================================================================

/// Lifecycle state of a cart.
///
/// The five-value set is canonical. The French labels used by the original
/// back office (`en_cours`, `demande`, `traité`, `annulé`, `fini`) are accepted
/// as aliases when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Items being edited ("en_cours").
    #[serde(alias = "en_cours")]
    Building,
    /// Checked out, waiting for the back office ("demande").
    #[serde(alias = "demande")]
    Submitted,
    /// Handled by the back office ("traité").
    #[serde(alias = "traité", alias = "traite")]
    Processed,
    /// Voided ("annulé"). Terminal.
    #[serde(alias = "annulé", alias = "annule")]
    Cancelled,
    /// Delivered/closed ("fini"). Terminal.
    #[serde(alias = "fini")]
    Finished,
}

impl CartStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [CartStatus; 5] = [
        CartStatus::Building,
        CartStatus::Submitted,
        CartStatus::Processed,
        CartStatus::Cancelled,
        CartStatus::Finished,
    ];

    /// Canonical storage/wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Building => "building",
            CartStatus::Submitted => "submitted",
            CartStatus::Processed => "processed",
            CartStatus::Cancelled => "cancelled",
            CartStatus::Finished => "finished",
        }
    }

    /// French back-office label.
    pub const fn label_fr(&self) -> &'static str {
        match self {
            CartStatus::Building => "en_cours",
            CartStatus::Submitted => "demande",
            CartStatus::Processed => "traité",
            CartStatus::Cancelled => "annulé",
            CartStatus::Finished => "fini",
        }
    }

    /// Terminal states accept no further mutation.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, CartStatus::Cancelled | CartStatus::Finished)
    }

    /// Non-terminal states.
    #[inline]
    pub const fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// States counted by the one-active-cart-per-user rule.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, CartStatus::Building | CartStatus::Submitted)
    }
}

impl Default for CartStatus {
    fn default() -> Self {
        CartStatus::Building
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "building" | "en_cours" => Ok(CartStatus::Building),
            "submitted" | "demande" => Ok(CartStatus::Submitted),
            "processed" | "traité" | "traite" => Ok(CartStatus::Processed),
            "cancelled" | "annulé" | "annule" => Ok(CartStatus::Cancelled),
            "finished" | "fini" => Ok(CartStatus::Finished),
            other => Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown cart status '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Collaborator Read Models
// =============================================================================

/// A catalog product, as exposed by the product read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: ProductRef,
    pub name: String,
    /// Current list price; snapshotted into cart items when added.
    pub price: Money,
    pub category_ref: Option<CategoryRef>,
    pub brand_ref: Option<String>,
}

/// A user, as exposed by the directory read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserRef,
    pub name: String,
    /// Company the user's purchases are attributed to.
    pub company_ref: Option<CompanyRef>,
}

/// A client company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub id: CompanyRef,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
