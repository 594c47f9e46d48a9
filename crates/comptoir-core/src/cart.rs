//! # Cart Aggregate
//!
//! A mutable collection of line items belonging to exactly one owner.
//!
//! ## Cart Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart 3f2a…  owner: alice   status: building   version: 4              │
//! │                                                                         │
//! │  ┌──────────────┬─────┬────────────┬──────────────────────────────┐    │
//! │  │ product_ref  │ qty │ unit_price │ line_reference               │    │
//! │  ├──────────────┼─────┼────────────┼──────────────────────────────┤    │
//! │  │ SKU-PAPER-A4 │   2 │      10.00 │ "for the accounting office"  │    │
//! │  │ SKU-TONER-K  │   1 │      25.00 │ -                            │    │
//! │  └──────────────┴─────┴────────────┴──────────────────────────────┘    │
//! │                                                                         │
//! │  notes, order_reference, total (settlement snapshot), discount_total   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - At most one line per `product_ref`
//! - Every line has `quantity >= 1`; setting a quantity to 0 removes the line
//! - `unit_price` is snapshotted from the catalog when the line is created
//!   and kept across later edits
//!
//! Who may edit a cart is decided by [`crate::status::check_item_mutation`];
//! this module only enforces the shape of the data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::settlement::Settlement;
use crate::types::{ActorKind, CartId, CartStatus, ProductRef, UserRef};
use crate::validation::{
    normalize_optional_text, validate_distinct_products, validate_quantity, validate_reference,
};
use crate::{
    MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_LINE_REFERENCE_LEN, MAX_NOTES_LEN,
    MAX_ORDER_REFERENCE_LEN,
};

// =============================================================================
// Limits
// =============================================================================

/// Size limits applied to every cart edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLimits {
    /// Maximum distinct products per cart.
    pub max_items: usize,
    /// Maximum quantity per line.
    pub max_item_quantity: i64,
}

impl Default for CartLimits {
    fn default() -> Self {
        CartLimits {
            max_items: MAX_CART_ITEMS,
            max_item_quantity: MAX_ITEM_QUANTITY,
        }
    }
}

impl CartLimits {
    fn check_quantity(&self, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;
        if quantity > self.max_item_quantity {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: self.max_item_quantity,
            });
        }
        Ok(())
    }

    fn check_size(&self, items: usize) -> CoreResult<()> {
        if items > self.max_items {
            return Err(CoreError::CartTooLarge {
                max: self.max_items,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_ref: ProductRef,
    /// Always >= 1.
    pub quantity: i64,
    /// Catalog price when the line was created.
    pub unit_price: Money,
    /// Free-text line reference (e.g. the client's internal code).
    pub line_reference: Option<String>,
}

impl CartItem {
    /// Unit price × quantity, before discounts.
    #[inline]
    pub fn gross(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// One requested line of a create/update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemInput {
    pub product_ref: ProductRef,
    pub quantity: i64,
    #[serde(default)]
    pub line_reference: Option<String>,
}

impl CartItemInput {
    /// Convenience constructor without a line reference.
    pub fn new(product_ref: impl Into<ProductRef>, quantity: i64) -> Self {
        CartItemInput {
            product_ref: product_ref.into(),
            quantity,
            line_reference: None,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A cart (or, once submitted, an order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner_ref: UserRef,
    /// Who created the cart: the owner, or an administrator on their behalf.
    pub created_by: ActorKind,
    pub items: Vec<CartItem>,
    pub notes: Option<String>,
    pub order_reference: Option<String>,
    pub status: CartStatus,
    /// Grand total of the last persisted settlement.
    pub total: Money,
    /// Discount total of the last persisted settlement.
    pub discount_total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Incremented by every persisted write.
    pub version: i64,
}

impl Cart {
    /// Creates an empty cart in `building`.
    pub fn new(owner_ref: UserRef, created_by: ActorKind, now: DateTime<Utc>) -> Self {
        Cart {
            id: CartId::generate(),
            owner_ref,
            created_by,
            items: Vec::new(),
            notes: None,
            order_reference: None,
            status: CartStatus::Building,
            total: Money::zero(),
            discount_total: Money::zero(),
            created_at: now,
            updated_at: now,
            submitted_at: None,
            version: 0,
        }
    }

    /// Number of distinct products.
    #[inline]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all line quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Finds the line for a product.
    pub fn item(&self, product_ref: &ProductRef) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_ref == product_ref)
    }

    /// Products of every line, in line order.
    pub fn product_refs(&self) -> Vec<ProductRef> {
        self.items.iter().map(|i| i.product_ref.clone()).collect()
    }

    /// Products named by `inputs` that have no line yet and so need a catalog price.
    pub fn new_products<'a>(&self, inputs: &'a [CartItemInput]) -> Vec<&'a ProductRef> {
        inputs
            .iter()
            .filter(|input| self.item(&input.product_ref).is_none())
            .map(|input| &input.product_ref)
            .collect()
    }

    /// Replaces every line with `inputs`.
    ///
    /// Existing products keep their snapshotted unit price; new products take
    /// theirs from `catalog_prices`. The whole request is validated before the
    /// cart is touched.
    ///
    /// ## Errors
    /// - `Validation` for blank or oversized product references, non-positive
    ///   quantities, duplicate products or oversized line references
    /// - `QuantityTooLarge` / `CartTooLarge` past the limits
    /// - `UnknownProduct` when a new product has no catalog price
    pub fn replace_items(
        &mut self,
        inputs: &[CartItemInput],
        catalog_prices: &HashMap<ProductRef, Money>,
        limits: &CartLimits,
    ) -> CoreResult<()> {
        for input in inputs {
            validate_reference("product_ref", input.product_ref.as_str())?;
        }
        validate_distinct_products(inputs.iter().map(|i| &i.product_ref))?;
        limits.check_size(inputs.len())?;

        let mut items = Vec::with_capacity(inputs.len());
        for input in inputs {
            limits.check_quantity(input.quantity)?;
            let line_reference = normalize_optional_text(
                "line_reference",
                input.line_reference.as_deref(),
                MAX_LINE_REFERENCE_LEN,
            )?;

            let unit_price = match self.item(&input.product_ref) {
                Some(existing) => existing.unit_price,
                None => *catalog_prices
                    .get(&input.product_ref)
                    .ok_or_else(|| CoreError::UnknownProduct(input.product_ref.to_string()))?,
            };

            items.push(CartItem {
                product_ref: input.product_ref.clone(),
                quantity: input.quantity,
                unit_price,
                line_reference,
            });
        }

        self.items = items;
        Ok(())
    }

    /// Sets the quantity of one line.
    ///
    /// - `0` removes the line (`ProductNotInCart` if there is none)
    /// - an existing line keeps its unit price
    /// - a new line needs `catalog_price`
    pub fn set_quantity(
        &mut self,
        product_ref: &ProductRef,
        quantity: i64,
        catalog_price: Option<Money>,
        limits: &CartLimits,
    ) -> CoreResult<()> {
        validate_reference("product_ref", product_ref.as_str())?;

        if quantity == 0 {
            let before = self.items.len();
            self.items.retain(|i| &i.product_ref != product_ref);
            if self.items.len() == before {
                return Err(CoreError::ProductNotInCart(product_ref.to_string()));
            }
            return Ok(());
        }

        limits.check_quantity(quantity)?;

        if let Some(line) = self.items.iter_mut().find(|i| &i.product_ref == product_ref) {
            line.quantity = quantity;
            return Ok(());
        }

        let unit_price =
            catalog_price.ok_or_else(|| CoreError::UnknownProduct(product_ref.to_string()))?;
        limits.check_size(self.items.len() + 1)?;
        self.items.push(CartItem {
            product_ref: product_ref.clone(),
            quantity,
            unit_price,
            line_reference: None,
        });
        Ok(())
    }

    /// Sets (or clears) the notes.
    pub fn set_notes(&mut self, notes: Option<&str>) -> CoreResult<()> {
        self.notes = normalize_optional_text("notes", notes, MAX_NOTES_LEN)?;
        Ok(())
    }

    /// Sets (or clears) the client's order reference.
    pub fn set_order_reference(&mut self, reference: Option<&str>) -> CoreResult<()> {
        self.order_reference =
            normalize_optional_text("order_reference", reference, MAX_ORDER_REFERENCE_LEN)?;
        Ok(())
    }

    /// Copies the settlement totals into the persisted snapshot.
    pub fn apply_settlement(&mut self, settlement: &Settlement) {
        self.total = settlement.grand_total;
        self.discount_total = settlement.discount_total;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
